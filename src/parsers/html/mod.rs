//! HTML解析和处理模块
//!
//! - `parser`: 链接类型与 srcset 解析
//! - `dom`: 基础DOM操作
//! - `rewriter`: 文档重写（元素处理器与 DOM 遍历）

pub mod dom;
pub mod parser;
pub mod rewriter;

// 重新导出主要的公共 API
pub use dom::{
    find_nodes, get_child_node_by_name, get_node_attr, get_node_name, html_to_dom,
    serialize_children, set_node_attr,
};
pub use parser::{first_srcset_candidate, parse_link_type, parse_srcset, LinkType, SrcSetItem};
pub use rewriter::{
    collect_stylesheets, marked_title, DocumentRewriter, ElementHandler, ElementHandlerRegistry,
    RewrittenDocument, StylesheetDemand, DEFAULT_TITLE, TITLE_MARKER,
};
