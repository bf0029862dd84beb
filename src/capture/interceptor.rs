//! Request gatekeeping for the loading page.
//!
//! Every request passes the scheme, blocklist and method filters in that order.
//! Eligible GET requests are replayed out-of-band; the page always receives the
//! fetched bytes while the store decides separately whether to keep them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::browser::{AbortReason, Fulfillment, InterceptedRequest, RequestHandler, Verdict};
use crate::capture::store::{CaptureOutcome, CaptureStore};
use crate::error::DumpError;
use crate::network::blocklist::Blocklist;
use crate::network::fetcher::{FetchRequest, FetchResponse, Fetcher};
use crate::utils::url::{get_origin, is_http_scheme, is_passthrough_scheme, is_same_origin, Url};

/// Response headers that no longer describe the buffered, decoded body.
const STRIPPED_RESPONSE_HEADERS: &[&str] = &[
    "connection",
    "content-encoding",
    "content-length",
    "keep-alive",
    "transfer-encoding",
];

pub struct CaptureInterceptor {
    store: Arc<CaptureStore>,
    fetcher: Arc<dyn Fetcher>,
    blocklist: Arc<Blocklist>,
    target: Url,
    cross_origin: bool,
    request_timeout: Duration,
}

impl CaptureInterceptor {
    pub fn new(
        store: Arc<CaptureStore>,
        fetcher: Arc<dyn Fetcher>,
        blocklist: Arc<Blocklist>,
        target: Url,
        cross_origin: bool,
        request_timeout: Duration,
    ) -> Self {
        Self {
            store,
            fetcher,
            blocklist,
            target,
            cross_origin,
            request_timeout,
        }
    }

    async fn decide(&self, request: InterceptedRequest) -> Verdict {
        let url = match Url::parse(&request.url) {
            Ok(url) => url,
            Err(e) => {
                debug!(url = %request.url, error = %e, "unparseable request denied");
                return Verdict::Abort(AbortReason::AccessDenied);
            }
        };

        if is_passthrough_scheme(&url) {
            return Verdict::Continue;
        }
        if !is_http_scheme(&url) {
            debug!(url = %url, "{}", DumpError::Protocol(url.scheme().to_string()));
            return Verdict::Abort(AbortReason::AccessDenied);
        }

        if url
            .host_str()
            .is_some_and(|host| self.blocklist.contains(host))
        {
            debug!(url = %url, "blocked by blocklist");
            return Verdict::Abort(AbortReason::BlockedByClient);
        }

        if !request.method.eq_ignore_ascii_case("GET") {
            debug!(url = %url, method = %request.method, "non-GET request passed through");
            return Verdict::Continue;
        }

        let fetch_request = FetchRequest::get(url.clone())
            .with_headers(request.headers)
            .with_referrer(get_origin(&self.target));

        let response = match self.fetcher.fetch(fetch_request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "out-of-band fetch failed, page loads it directly");
                return Verdict::Continue;
            }
        };

        if response.is_success() && (self.cross_origin || is_same_origin(&url, &self.target)) {
            match self
                .store
                .capture(&url, &response.content_type, response.body.clone())
            {
                CaptureOutcome::Captured(_) | CaptureOutcome::Duplicate(_) => {}
                CaptureOutcome::PathTaken => debug!(url = %url, "output path taken"),
                CaptureOutcome::Frozen => debug!(url = %url, "late response not captured"),
            }
        }

        Verdict::Respond(fulfillment(response))
    }
}

fn fulfillment(response: FetchResponse) -> Fulfillment {
    let mut headers: Vec<(String, String)> = response
        .headers
        .into_iter()
        .filter(|(name, _)| {
            let name = name.to_ascii_lowercase();
            name != "content-type" && !STRIPPED_RESPONSE_HEADERS.contains(&name.as_str())
        })
        .collect();
    headers.push(("content-type".to_string(), response.content_type.clone()));

    Fulfillment {
        status: response.status,
        headers,
        content_type: response.content_type,
        body: response.body,
    }
}

#[async_trait]
impl RequestHandler for CaptureInterceptor {
    async fn handle(&self, request: InterceptedRequest) -> Verdict {
        let url = request.url.clone();

        match tokio::time::timeout(self.request_timeout, self.decide(request)).await {
            Ok(verdict) => verdict,
            Err(_) => {
                warn!("{}", DumpError::InterceptionTimeout(url));
                Verdict::Abort(AbortReason::TimedOut)
            }
        }
    }
}
