/// 站点标识、配置和 `_all_docs` 响应结构。
pub mod models;

/// 文档库访问（HTTP 范围查询）。
pub mod store;

/// 迁移主循环：查询、打印、等待。
pub mod migrator;

/// 错误类型。
pub mod error;
