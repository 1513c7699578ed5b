use std::fmt;
use std::time::Duration;
use serde::Deserialize;
use serde_json::Value;
use crate::error::{MigrateError, Result};

/// 范围查询上界的哨兵字符，排序在所有合法键字符之后。
pub const SENTINEL: char = '~';

/// 每打印一个文档后的默认等待时间。
pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

/// 内置的数据库地址（不含凭据）。
pub const DEFAULT_STORE_URL: &str = "http://localhost:5984/trackingcode";

/// 内置的 basic-auth 凭据，格式为 `user:password`。
pub const DEFAULT_CREDENTIAL: &str = "trackingcode-backend:trackingcode-backend";

/// 需要迁移的站点列表，按处理顺序排列。
pub const BUILTIN_SITES: &[&str] = &[
    "l4mkc824", "qvjlfnlo", "l984a9px", "qv2oun8n", "xjkytrxz",
    "9ykvs7rk", "ql59s6ky", "xo68uqz1", "kmv6tp0n", "qq26croo",
    "8xl5i644", "91f94p", "8xolamo6", "3x3mb94v", "6xf9no",
    "vv1rh3x4", "y3flv3", "ppzqsrrr", "kofm77", "pp2lt6lp",
    "l42ru9po", "pm1ntxrn", "0p58tr48", "yvrka3r5", "2vyxan66",
    "2w81ikl5", "nrf4rr", "xjkytv3y", "mzfzx9", "3vfpw1",
    "p9fq25", "z6m0h296", "yklzb7m1", "mzxqavpw", "yklzbk2m",
    "pm1ntlom", "lrfp90", "5x5obk18", "91o2i47k", "zlwxtxyw",
    "5wk2h8vr",
];

/// 站点标识：一个站点在文档库中键空间的前缀。
///
/// 只允许小写 ASCII 字母和数字，因此一定排序在 [`SENTINEL`] 之前。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SiteId(String);

impl SiteId {
    /// 校验并创建站点标识。
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let valid = !raw.is_empty()
            && raw.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit());
        if !valid {
            return Err(MigrateError::InvalidSite(raw));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 范围查询的起始键，即标识本身。
    pub fn start_key(&self) -> &str {
        &self.0
    }

    /// 范围查询的结束键：标识后追加哨兵字符。
    pub fn end_key(&self) -> String {
        let mut key = String::with_capacity(self.0.len() + 1);
        key.push_str(&self.0);
        key.push(SENTINEL);
        key
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// HTTP basic-auth 凭据。
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// 从 `user:password` 形式解析。密码可以为空，用户名不行。
    pub fn parse(raw: &str) -> Result<Self> {
        let (user, pass) = raw.split_once(':').unwrap_or((raw, ""));
        if user.is_empty() {
            return Err(MigrateError::ConfigError("credential is missing a username".into()));
        }
        Ok(Self::new(user, pass))
    }
}

// 不输出密码
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// 单个站点查询失败后的处理方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultPolicy {
    /// 立即终止整个运行，后续站点不再处理。
    #[default]
    Abort,
    /// 记录失败并继续下一个站点。
    Continue,
}

/// 迁移配置。
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// 按顺序处理的站点。
    pub sites: Vec<SiteId>,
    /// 数据库基础地址，例如 `http://host:5984/db`。
    pub store_url: String,
    /// basic-auth 凭据。为空时使用地址中的 userinfo（如果有）。
    pub credential: Option<Credential>,
    /// 每个文档打印后的等待时间。
    pub delay: Duration,
    /// 失败处理策略。
    pub fault_policy: FaultPolicy,
}

impl MigrationConfig {
    /// 创建指向 `store_url` 的配置，站点列表为空，其余取默认值。
    pub fn new(store_url: impl Into<String>) -> Self {
        Self {
            sites: Vec::new(),
            store_url: store_url.into(),
            credential: None,
            delay: DEFAULT_DELAY,
            fault_policy: FaultPolicy::default(),
        }
    }

    /// 编译进程序的配置：内置站点列表、数据库地址和凭据。
    pub fn builtin() -> Result<Self> {
        let sites = BUILTIN_SITES
            .iter()
            .map(|s| SiteId::new(*s))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(DEFAULT_STORE_URL)
            .with_sites(sites)
            .with_credential(Credential::parse(DEFAULT_CREDENTIAL)?))
    }

    /// 设置站点列表。
    pub fn with_sites(mut self, sites: Vec<SiteId>) -> Self {
        self.sites = sites;
        self
    }

    /// 设置凭据。
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// 设置每个文档之后的等待时间。
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// 设置失败处理策略。
    pub fn with_fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }

    /// 运行前的基本检查。地址本身由 `CouchStore::new` 解析校验。
    pub fn validate(&self) -> Result<()> {
        if self.sites.is_empty() {
            return Err(MigrateError::ConfigError("no sites configured".into()));
        }
        if self.store_url.trim().is_empty() {
            return Err(MigrateError::ConfigError("store_url is empty".into()));
        }
        Ok(())
    }
}

/// `_all_docs` 响应中的一行。`id`、`key`、`value` 等字段忽略。
#[derive(Debug, Deserialize)]
pub struct Row {
    pub doc: Value,
}

/// `_all_docs?include_docs=true` 的响应体。
#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<Row>,
}
