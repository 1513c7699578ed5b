use base64::Engine;
use log::debug;
use percent_encoding::percent_decode_str;
use serde_json::Value;
use url::Url;
use crate::error::{MigrateError, Result};
use crate::models::{AllDocsResponse, Credential};

/// 文档库的只读访问接口。
///
/// 迁移器只依赖这个 trait，测试中可以换成内存实现。
pub trait DocumentStore {
    /// 取回键落在 `[start_key, end_key]` 中的全部文档，保持返回顺序。
    fn fetch_range(&mut self, start_key: &str, end_key: &str) -> Result<Vec<Value>>;
}

/// 通过 HTTP `_all_docs` 接口访问 CouchDB 风格的文档库。
///
/// 请求是阻塞的。只有 ureq 默认的 30 秒连接超时，没有读超时：
/// 连接建立后服务端不响应，整个进程一起挂起。
pub struct CouchStore {
    agent: ureq::Agent,
    base_url: Url,
    auth_header: Option<String>,
}

impl CouchStore {
    /// 解析数据库地址。
    ///
    /// 地址中的 userinfo 会被移出 URL，在没有显式 `credential` 时作为凭据使用。
    pub fn new(store_url: &str, credential: Option<&Credential>) -> Result<Self> {
        let mut base_url = Url::parse(store_url)?;
        let scheme = base_url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(MigrateError::ConfigError(format!(
                "store url must use http or https, got {}",
                scheme
            )));
        }
        if base_url.cannot_be_a_base() {
            return Err(MigrateError::ConfigError("store url cannot be a base".into()));
        }

        let embedded = if base_url.username().is_empty() {
            None
        } else {
            let user = percent_decode(base_url.username());
            let pass = base_url.password().map(percent_decode).unwrap_or_default();
            Some(Credential::new(user, pass))
        };
        base_url
            .set_username("")
            .map_err(|_| MigrateError::ConfigError("cannot strip username from store url".into()))?;
        base_url
            .set_password(None)
            .map_err(|_| MigrateError::ConfigError("cannot strip password from store url".into()))?;
        base_url.set_query(None);
        base_url.set_fragment(None);

        let auth_header = credential.cloned().or(embedded).map(|c| basic_auth(&c));

        Ok(Self {
            agent: ureq::AgentBuilder::new().build(),
            base_url,
            auth_header,
        })
    }

    /// 不带凭据的数据库地址，可以安全地写进日志。
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// 构造范围查询地址：`<base>/_all_docs?start_key=..&end_key=..&include_docs=true`。
    pub fn all_docs_url(&self, start_key: &str, end_key: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| MigrateError::ConfigError("store url cannot be a base".into()))?;
            path.pop_if_empty();
            path.push("_all_docs");
        }
        url.query_pairs_mut()
            .append_pair("start_key", start_key)
            .append_pair("end_key", end_key)
            .append_pair("include_docs", "true");
        Ok(url)
    }
}

impl DocumentStore for CouchStore {
    fn fetch_range(&mut self, start_key: &str, end_key: &str) -> Result<Vec<Value>> {
        let url = self.all_docs_url(start_key, end_key)?;
        debug!("GET {}", url);

        let mut request = self.agent.get(url.as_str()).set("Accept", "application/json");
        if let Some(header) = &self.auth_header {
            request = request.set("Authorization", header);
        }

        let response = match request.call() {
            Ok(resp) => resp,
            Err(ureq::Error::Status(status, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                return Err(MigrateError::Http { status, body });
            }
            Err(ureq::Error::Transport(err)) => return Err(err.into()),
        };

        let body = response.into_string()?;
        let parsed: AllDocsResponse = serde_json::from_str(&body)?;
        Ok(parsed.rows.into_iter().map(|row| row.doc).collect())
    }
}

fn basic_auth(credential: &Credential) -> String {
    let raw = format!("{}:{}", credential.username, credential.password);
    format!("Basic {}", base64::engine::general_purpose::STANDARD.encode(raw))
}

fn percent_decode(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}
