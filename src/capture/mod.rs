//! # 捕获模块
//!
//! 页面加载期间的请求拦截与资源持久化：
//!
//! - `resolver` - 根据命名策略把资源 URL 映射为输出路径
//! - `store` - 并发安全的 IdentityMap / ResourceMap
//! - `interceptor` - 拦截请求、带外获取并决定是否捕获

pub mod interceptor;
pub mod resolver;
pub mod store;

pub use interceptor::CaptureInterceptor;
pub use resolver::{NamingPolicy, PathResolver};
pub use store::{
    CaptureOutcome, CaptureStore, CapturedResource, IdentityMap, ResourceMap, ENTRY_DOCUMENT_PATH,
};
