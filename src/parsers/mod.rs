//! # 解析器模块
//!
//! 把页面加载结束时的 HTML 与样式表转换为离线形式：
//!
//! - `html` - HTML文档解析、DOM操作、文档重写
//! - `css` - CSS规则树解析、序列化、`@import` 内联与 `url()` 重写
//! - `references` - HTML 与 CSS 共用的引用到本地路径的映射
//! - `stylesheets` - 重写前异步取回所需的样式表

pub mod css;
pub mod html;
pub mod references;
pub mod stylesheets;

// Re-export commonly used items for convenience
pub use css::{parse_stylesheet, serialize_rules, CssRewriter, CssRule};
pub use html::{collect_stylesheets, DocumentRewriter, RewrittenDocument, StylesheetDemand};
pub use references::{LocalReference, ReferenceMapper};
pub use stylesheets::{decode_text, StylesheetBundle, StylesheetSource};
