//! 统一错误处理
//!
//! 所有会话级别的失败都汇总到 [`DumpError`]。导航失败与样式表获取失败会中止整个会话，
//! 单个资源的获取失败和拦截超时只在拦截器内部被吸收，不会传播给调用方。

use thiserror::Error;

/// Errors produced while capturing a page.
#[derive(Error, Debug)]
pub enum DumpError {
    /// Unsupported scheme on the target or on an intercepted request.
    #[error("unsupported URL protocol: {0}")]
    Protocol(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The page load produced no response or a non-success status.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// Out-of-band fetch of a single resource failed; the resource is simply not captured.
    #[error("failed to fetch resource {url}: {reason}")]
    CaptureFetch { url: String, reason: String },

    /// A stylesheet needed for inlining could not be retrieved. Fatal to the whole dump.
    #[error("failed to fetch stylesheet {url}: {reason}")]
    StylesheetFetch { url: String, reason: String },

    /// An intercepted request was neither completed nor aborted in time.
    #[error("interception of {0} timed out")]
    InterceptionTimeout(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Coarse classification used for the single terminal outcome shown to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The requested page itself could not be loaded.
    PageLoad,
    /// The page loaded but the capture pipeline failed.
    Capture,
    /// Bad configuration or a broken environment.
    Environment,
}

impl DumpError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            DumpError::Protocol(_) | DumpError::InvalidUrl(_) | DumpError::Navigation(_) => {
                ErrorCategory::PageLoad
            }
            DumpError::CaptureFetch { .. }
            | DumpError::StylesheetFetch { .. }
            | DumpError::InterceptionTimeout(_) => ErrorCategory::Capture,
            DumpError::Browser(_) | DumpError::Config(_) | DumpError::Io(_) => {
                ErrorCategory::Environment
            }
        }
    }

    /// Whether the failure happened while loading the target page, as opposed to
    /// somewhere inside the capture pipeline.
    pub fn is_page_load_failure(&self) -> bool {
        self.category() == ErrorCategory::PageLoad
    }

    /// Whether this error must abort the session. Per-resource failures are absorbed.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            DumpError::CaptureFetch { .. } | DumpError::InterceptionTimeout(_)
        )
    }

    pub fn stylesheet(url: impl Into<String>, reason: impl Into<String>) -> Self {
        DumpError::StylesheetFetch {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn capture_fetch(url: impl Into<String>, reason: impl Into<String>) -> Self {
        DumpError::CaptureFetch {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

pub type DumpResult<T> = Result<T, DumpError>;
