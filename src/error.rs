use thiserror::Error;
use std::io;

/// 迁移过程中的错误类型。
#[derive(Error, Debug)]
pub enum MigrateError {
    /// IO 错误包装（写标准输出、读取响应体）。
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// 响应 JSON 不符合 `_all_docs` 的结构。
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 数据库地址无法解析。
    #[error("Invalid store URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// 网络层失败（连接被拒、DNS、TLS 等）。
    #[error("Transport error: {0}")]
    Transport(String),

    /// 数据库返回了非 2xx 状态码。
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// 非法的站点标识。
    #[error("Invalid site identifier: {0:?}")]
    InvalidSite(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<ureq::Transport> for MigrateError {
    fn from(err: ureq::Transport) -> Self {
        MigrateError::Transport(err.to_string())
    }
}

/// MigrateError 的 Result 类型别名。
pub type Result<T> = std::result::Result<T, MigrateError>;
