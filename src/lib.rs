//! # Pagedump Library
//!
//! 将正在运行的网页捕获为可在本地离线回放的快照：页面加载期间的每个请求都被拦截并保存，
//! 文档中的引用被重写为本地路径，样式表被内联。
//!
//! ## 模块组织
//!
//! - `core` - 捕获会话的主流程
//! - `browser` - 浏览器抽象与 Chromium 后端（可选）
//! - `capture` - 请求拦截、路径分配与资源存储
//! - `parsers` - 资源解析与重写（HTML、CSS）
//! - `network` - 带外请求与屏蔽列表
//! - `builders` - 离线文档外壳与运行时脚本
//! - `config` / `env` - 配置文件与环境变量
//! - `utils` - URL 工具函数

pub mod browser;
pub mod builders;
pub mod capture;
pub mod config;
pub mod core;
pub mod env;
pub mod error;
pub mod network;
pub mod parsers;
pub mod utils;

// Re-export commonly used items for convenience
pub use crate::core::{DumpOptions, DumpResults, Dumper};
pub use capture::{CapturedResource, NamingPolicy};
pub use config::DumperConfig;
pub use error::{DumpError, DumpResult};
pub use network::{Blocklist, Fetcher, HttpFetcher};
