//! # 工具模块
//!
//! 这个模块包含各种工具函数和实用程序：
//!
//! - URL处理和解析工具
//! - 规范身份与基准URI计算
//!
//! # 模块组织
//!
//! - `url` - URL解析、基准URI、规范身份、扩展名、data URL 解码等工具函数

pub mod url;

// Re-export commonly used items for convenience
pub use url::{
    base_uri, canonical_identity, get_origin, is_http_scheme, is_passthrough_scheme,
    is_same_origin, parse_data_url, path_extension, resolve_url, Url,
};
