//! # 构建器模块
//!
//! 离线文档的输出部分：
//!
//! - `shim` - 由 IdentityMap 生成的运行时 fetch 重定向脚本
//! - `document` - 最终文档外壳

pub mod document;
pub mod shim;

// Re-export commonly used items for convenience
pub use document::{build_document, create_metadata_comment};
pub use shim::{build_shim, SHIM_SCRIPT_ID};
