//! # 网络模块
//!
//! 这个模块包含所有与网络通信相关的功能：
//!
//! - 带外 HTTP 资源获取
//! - 广告/追踪域名黑名单的加载与缓存
//!
//! # 模块组织
//!
//! - `fetcher` - `Fetcher` 特性与基于 reqwest 的实现
//! - `blocklist` - hosts 格式黑名单解析、缓存与查询

pub mod blocklist;
pub mod fetcher;

// Re-export commonly used items for convenience
pub use blocklist::{Blocklist, DEFAULT_BLOCKLIST_SOURCE};
pub use fetcher::{FetchRequest, FetchResponse, Fetcher, HttpFetcher};
