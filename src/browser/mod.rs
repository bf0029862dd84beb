//! Browser collaborator abstraction.
//!
//! Defines the `Browser` and `Page` traits the navigation controller drives,
//! and the interception stream contract (`RequestHandler` -> `Verdict`).
//! The Chromium backend lives in [`chromium`] behind the `chromium` feature.

#[cfg(feature = "chromium")]
pub mod chromium;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DumpResult;
use crate::utils::url::Url;

/// User agent presented by every captured page.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 ( ; ; rv:121.0) Gecko/20100101 Firefox/121.0";

/// A request issued by the page, paused until its handler returns a verdict.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub url: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    /// Whether this is a top-level document request.
    pub is_navigation: bool,
}

impl InterceptedRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            headers: Vec::new(),
            is_navigation: false,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Network error reported to the page when a request is aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    AccessDenied,
    BlockedByClient,
    TimedOut,
    Failed,
}

/// A synthetic response handed to the page in place of the network.
#[derive(Debug, Clone, PartialEq)]
pub struct Fulfillment {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub content_type: String,
    pub body: Vec<u8>,
}

/// How an intercepted request is resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Let the browser perform the request itself.
    Continue,
    Abort(AbortReason),
    Respond(Fulfillment),
}

/// Decides the fate of each intercepted request. Called concurrently.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: InterceptedRequest) -> Verdict;
}

/// When a navigation counts as loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadCondition {
    #[default]
    DomContentLoaded,
    Load,
}

/// Response of the top-level document request.
#[derive(Debug, Clone)]
pub struct NavigationResponse {
    pub url: String,
    pub status: u16,
    pub content_type: String,
    /// Raw response body, before any script ran.
    pub body: Vec<u8>,
}

impl NavigationResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geolocation {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
}

/// Fingerprint-neutral execution profile applied to every page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageProfile {
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub device_scale_factor: f64,
    pub geolocation: Geolocation,
    pub disable_cache: bool,
    pub bypass_service_worker: bool,
    pub bypass_csp: bool,
}

impl Default for PageProfile {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            viewport_width: 1280,
            viewport_height: 720,
            device_scale_factor: 1.0,
            geolocation: Geolocation {
                latitude: 0.0,
                longitude: 0.0,
                accuracy: 0.0,
            },
            disable_cache: true,
            bypass_service_worker: true,
            bypass_csp: true,
        }
    }
}

/// A browser engine able to open isolated pages.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn open_page(&self, profile: &PageProfile) -> DumpResult<Box<dyn Page>>;
}

/// One page execution context.
#[async_trait]
pub trait Page: Send + Sync {
    /// Route every subsequent request of this page through `handler`.
    async fn intercept(&self, handler: Arc<dyn RequestHandler>) -> DumpResult<()>;

    /// Navigate and wait for `condition`. `Ok(None)` means the load produced no response.
    async fn navigate(
        &self,
        url: &Url,
        timeout: Duration,
        condition: LoadCondition,
    ) -> DumpResult<Option<NavigationResponse>>;

    /// Evaluate a script in the page and return its JSON-converted result.
    async fn evaluate(&self, script: &str) -> DumpResult<serde_json::Value>;

    async fn close(&self) -> DumpResult<()>;
}
