//! Chromium backend over CDP, built on chromiumoxide.
//!
//! Requests are paused in the Fetch domain; each paused request is resolved on
//! its own task so a slow handler never holds up the rest of the page. The
//! top-level document's status and bytes are taken from the fulfilment the
//! handler returned for it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::*;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetGeolocationOverrideParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, FailRequestParams,
    FulfillRequestParams, HeaderEntry, RequestPattern, RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ErrorReason, ResourceType, SetBypassServiceWorkerParams, SetCacheDisabledParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    EventDomContentEventFired, EventLoadEventFired, NavigateParams, SetBypassCspParams,
};
use chromiumoxide::page::Page as CdpPage;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{
    AbortReason, Browser, InterceptedRequest, LoadCondition, NavigationResponse, Page,
    PageProfile, RequestHandler, Verdict,
};
use crate::config::BrowserSettings;
use crate::error::{DumpError, DumpResult};
use crate::utils::url::Url;

/// Flags the capture browser is always started with.
const LAUNCH_ARGS: &[&str] = &[
    "--no-first-run",
    "--disable-sync",
    "--disable-logging",
    "--disable-infobars",
    "--disable-translate",
    "--disable-extensions",
    "--disable-default-apps",
    "--disable-notifications",
    "--disable-dev-shm-usage",
    "--disable-background-networking",
];

fn browser_error(e: impl std::fmt::Display) -> DumpError {
    DumpError::Browser(e.to_string())
}

/// A launched Chromium process.
pub struct ChromiumBrowser {
    browser: Mutex<CdpBrowser>,
    handler: JoinHandle<()>,
}

impl ChromiumBrowser {
    pub async fn launch(settings: &BrowserSettings, profile: &PageProfile) -> DumpResult<Self> {
        let mut builder = BrowserConfig::builder()
            .enable_request_intercept()
            .window_size(profile.viewport_width, profile.viewport_height)
            .args(LAUNCH_ARGS.iter().copied());

        if let Some(executable) = &settings.executable {
            builder = builder.chrome_executable(shellexpand::tilde(executable).into_owned());
        }
        if let Some(data_dir) = &settings.data_dir {
            builder = builder.user_data_dir(shellexpand::tilde(data_dir).into_owned());
        }
        if !settings.headless {
            builder = builder.with_head();
        }

        let config = builder.build().map_err(DumpError::Browser)?;
        let (browser, mut handler) = CdpBrowser::launch(config).await.map_err(browser_error)?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "CDP handler error");
                }
            }
        });

        Ok(Self {
            browser: Mutex::new(browser),
            handler,
        })
    }

    /// Closes the browser process.
    pub async fn close(&self) -> DumpResult<()> {
        let mut browser = self.browser.lock().await;
        browser.close().await.map_err(browser_error)?;
        browser.wait().await?;
        Ok(())
    }
}

impl Drop for ChromiumBrowser {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[async_trait]
impl Browser for ChromiumBrowser {
    async fn open_page(&self, profile: &PageProfile) -> DumpResult<Box<dyn Page>> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .map_err(browser_error)?;

        apply_profile(&page, profile).await?;

        Ok(Box::new(ChromiumPage {
            page,
            navigation: Arc::new(Mutex::new(NavigationSlot::default())),
            listener: Mutex::new(None),
        }))
    }
}

async fn apply_profile(page: &CdpPage, profile: &PageProfile) -> DumpResult<()> {
    page.execute(SetUserAgentOverrideParams::new(profile.user_agent.clone()))
        .await
        .map_err(browser_error)?;
    page.execute(SetDeviceMetricsOverrideParams::new(
        profile.viewport_width,
        profile.viewport_height,
        profile.device_scale_factor,
        false,
    ))
    .await
    .map_err(browser_error)?;
    page.execute(
        SetGeolocationOverrideParams::builder()
            .latitude(profile.geolocation.latitude)
            .longitude(profile.geolocation.longitude)
            .accuracy(profile.geolocation.accuracy)
            .build(),
    )
    .await
    .map_err(browser_error)?;

    if profile.bypass_csp {
        page.execute(SetBypassCspParams::new(true))
            .await
            .map_err(browser_error)?;
    }
    if profile.disable_cache {
        page.execute(SetCacheDisabledParams::new(true))
            .await
            .map_err(browser_error)?;
    }
    if profile.bypass_service_worker {
        page.execute(SetBypassServiceWorkerParams::new(true))
            .await
            .map_err(browser_error)?;
    }

    Ok(())
}

/// The document response recorded for the current navigation.
#[derive(Default)]
struct NavigationSlot {
    target: Option<String>,
    response: Option<NavigationResponse>,
}

fn document_key(url: &str) -> String {
    url.split('#').next().unwrap_or(url).to_string()
}

pub struct ChromiumPage {
    page: CdpPage,
    navigation: Arc<Mutex<NavigationSlot>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl Page for ChromiumPage {
    async fn intercept(&self, handler: Arc<dyn RequestHandler>) -> DumpResult<()> {
        let mut paused = self
            .page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(browser_error)?;

        self.page
            .execute(
                EnableParams::builder()
                    .pattern(
                        RequestPattern::builder()
                            .url_pattern("*")
                            .request_stage(RequestStage::Request)
                            .build(),
                    )
                    .build(),
            )
            .await
            .map_err(browser_error)?;

        let page = self.page.clone();
        let navigation = Arc::clone(&self.navigation);
        let listener = tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let page = page.clone();
                let handler = Arc::clone(&handler);
                let navigation = Arc::clone(&navigation);
                tokio::spawn(async move {
                    resolve_paused(&page, handler.as_ref(), &navigation, &event).await;
                });
            }
        });

        if let Some(previous) = self.listener.lock().await.replace(listener) {
            previous.abort();
        }
        Ok(())
    }

    async fn navigate(
        &self,
        url: &Url,
        timeout: Duration,
        condition: LoadCondition,
    ) -> DumpResult<Option<NavigationResponse>> {
        *self.navigation.lock().await = NavigationSlot {
            target: Some(document_key(url.as_str())),
            response: None,
        };

        let navigation = async {
            let mut dom_ready = self
                .page
                .event_listener::<EventDomContentEventFired>()
                .await
                .map_err(browser_error)?;
            let mut loaded = self
                .page
                .event_listener::<EventLoadEventFired>()
                .await
                .map_err(browser_error)?;

            let params = NavigateParams::builder()
                .url(url.as_str())
                .referrer("")
                .build()
                .map_err(DumpError::Browser)?;
            let returns = self.page.execute(params).await.map_err(browser_error)?;
            if let Some(error) = &returns.result.error_text {
                return Err(DumpError::Navigation(error.clone()));
            }

            match condition {
                LoadCondition::DomContentLoaded => dom_ready.next().await.map(|_| ()),
                LoadCondition::Load => loaded.next().await.map(|_| ()),
            };
            Ok::<(), DumpError>(())
        };

        tokio::time::timeout(timeout, navigation)
            .await
            .map_err(|_| {
                DumpError::Navigation(format!(
                    "navigation timed out after {}ms",
                    timeout.as_millis()
                ))
            })??;

        Ok(self.navigation.lock().await.response.take())
    }

    async fn evaluate(&self, script: &str) -> DumpResult<serde_json::Value> {
        self.page
            .evaluate(script)
            .await
            .map_err(browser_error)?
            .into_value()
            .map_err(browser_error)
    }

    async fn close(&self) -> DumpResult<()> {
        if let Some(listener) = self.listener.lock().await.take() {
            listener.abort();
        }
        self.page.clone().close().await.map_err(browser_error)
    }
}

async fn resolve_paused(
    page: &CdpPage,
    handler: &dyn RequestHandler,
    navigation: &Mutex<NavigationSlot>,
    event: &EventRequestPaused,
) {
    let request = InterceptedRequest {
        url: event.request.url.clone(),
        method: event.request.method.clone(),
        headers: header_pairs(event.request.headers.inner()),
        is_navigation: event.resource_type == ResourceType::Document,
    };
    let is_navigation = request.is_navigation;
    let url = request.url.clone();

    let result = match handler.handle(request).await {
        Verdict::Continue => page
            .execute(ContinueRequestParams::new(event.request_id.clone()))
            .await
            .map(|_| ())
            .map_err(browser_error),
        Verdict::Abort(reason) => page
            .execute(FailRequestParams::new(
                event.request_id.clone(),
                error_reason(reason),
            ))
            .await
            .map(|_| ())
            .map_err(browser_error),
        Verdict::Respond(fulfillment) => {
            if is_navigation {
                let mut slot = navigation.lock().await;
                if slot.response.is_none() && slot.target.as_deref() == Some(&document_key(&url)) {
                    slot.response = Some(NavigationResponse {
                        url: url.clone(),
                        status: fulfillment.status,
                        content_type: fulfillment.content_type.clone(),
                        body: fulfillment.body.clone(),
                    });
                }
            }

            let params = FulfillRequestParams::builder()
                .request_id(event.request_id.clone())
                .response_code(i64::from(fulfillment.status))
                .response_headers(
                    fulfillment
                        .headers
                        .iter()
                        .map(|(name, value)| HeaderEntry::new(name.clone(), value.clone())),
                )
                .body(BASE64_STANDARD.encode(&fulfillment.body))
                .build()
                .map_err(DumpError::Browser);

            match params {
                Ok(params) => page.execute(params).await.map(|_| ()).map_err(browser_error),
                Err(e) => Err(e),
            }
        }
    };

    if let Err(e) = result {
        warn!(url = %url, error = %e, "failed to resolve paused request");
    }
}

fn header_pairs(headers: &serde_json::Value) -> Vec<(String, String)> {
    headers
        .as_object()
        .map(|headers| {
            headers
                .iter()
                .filter_map(|(name, value)| Some((name.clone(), value.as_str()?.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

fn error_reason(reason: AbortReason) -> ErrorReason {
    match reason {
        AbortReason::AccessDenied => ErrorReason::AccessDenied,
        AbortReason::BlockedByClient => ErrorReason::BlockedByClient,
        AbortReason::TimedOut => ErrorReason::TimedOut,
        AbortReason::Failed => ErrorReason::Failed,
    }
}
