//! Out-of-band HTTP fetching.
//!
//! The interceptor replays each eligible page request through a [`Fetcher`] so the
//! response bytes can be both captured and handed back to the page.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, REFERER};
use tracing::debug;

use crate::core::{detect_media_type, parse_content_type};
use crate::error::{DumpError, DumpResult};
use crate::utils::url::Url;

/// Request headers never forwarded to the origin.
const SKIPPED_REQUEST_HEADERS: &[&str] = &[
    "accept-encoding",
    "connection",
    "content-length",
    "host",
    "if-match",
    "if-modified-since",
    "if-none-match",
    "if-range",
    "if-unmodified-since",
    "keep-alive",
    "proxy-authorization",
    "te",
    "transfer-encoding",
    "upgrade",
];

/// Request replayed outside the page.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: Url,
    pub method: String,
    pub headers: Vec<(String, String)>,
    /// Sent as `Referer` when the headers carry none.
    pub referrer: Option<String>,
}

impl FetchRequest {
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: "GET".to_string(),
            headers: Vec::new(),
            referrer: None,
        }
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }
}

/// Fully buffered response of an out-of-band fetch.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Final URL after redirects.
    pub url: Url,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Content type as reported by the server, or sniffed from the body.
    pub content_type: String,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Lowercased media type without parameters.
    pub fn media_type(&self) -> String {
        parse_content_type(&self.content_type).0
    }
}

/// Performs out-of-band fetches.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> DumpResult<FetchResponse>;
}

/// [`Fetcher`] backed by a shared `reqwest` client.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> DumpResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(user_agent)
            .build()
            .map_err(|e| DumpError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

fn forwarded_headers(request: &FetchRequest) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for (name, value) in &request.headers {
        if SKIPPED_REQUEST_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
            continue;
        }
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) else {
            continue;
        };
        headers.insert(name, value);
    }

    if !headers.contains_key(REFERER) {
        if let Some(value) = request
            .referrer
            .as_deref()
            .and_then(|referrer| HeaderValue::from_str(referrer).ok())
        {
            headers.insert(REFERER, value);
        }
    }

    headers
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: FetchRequest) -> DumpResult<FetchResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| DumpError::capture_fetch(request.url.as_str(), "invalid method"))?;

        let response = self
            .client
            .request(method, request.url.clone())
            .headers(forwarded_headers(&request))
            .send()
            .await
            .map_err(|e| DumpError::capture_fetch(request.url.as_str(), e.to_string()))?;

        let status = response.status().as_u16();
        let url = response.url().clone();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let reported_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let body = response
            .bytes()
            .await
            .map_err(|e| DumpError::capture_fetch(request.url.as_str(), e.to_string()))?
            .to_vec();

        let content_type = match reported_type {
            Some(value) if !value.trim().is_empty() => value,
            _ => detect_media_type(&body, &url),
        };

        debug!(url = %url, status, content_type = %content_type, "fetched");

        Ok(FetchResponse {
            url,
            status,
            headers,
            content_type,
            body,
        })
    }
}
