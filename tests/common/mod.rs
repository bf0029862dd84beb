// 集成测试公共模块
//
// 提供脚本化的假浏览器与内存中的 Fetcher，用于驱动完整的捕获流程

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use pagedump::browser::{
    Browser, InterceptedRequest, LoadCondition, NavigationResponse, Page, PageProfile,
    RequestHandler, Verdict,
};
use pagedump::network::{FetchRequest, FetchResponse, Fetcher};
use pagedump::utils::Url;
use pagedump::{Blocklist, DumpOptions, Dumper, DumperConfig};

pub const TARGET: &str = "https://example.com/game/index.html";

/// 内存中的站点：URL（不含查询串）-> (状态码, 内容类型, 正文)
#[derive(Default)]
pub struct MemoryFetcher {
    responses: Mutex<HashMap<String, (u16, String, Vec<u8>)>>,
    calls: Mutex<HashMap<String, usize>>,
    broken: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn serve(self, url: &str, status: u16, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        self.responses.lock().unwrap().insert(
            url.to_string(),
            (status, content_type.to_string(), body.into()),
        );
        self
    }

    /// 对 `url` 的请求返回网络错误
    pub fn break_url(self, url: &str) -> Self {
        self.broken.lock().unwrap().push(url.to_string());
        self
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Fetcher for MemoryFetcher {
    async fn fetch(&self, request: FetchRequest) -> pagedump::DumpResult<FetchResponse> {
        let mut url = request.url.clone();
        url.set_query(None);
        url.set_fragment(None);
        *self
            .calls
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default() += 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.broken.lock().unwrap().iter().any(|broken| broken == url.as_str()) {
            return Err(pagedump::DumpError::capture_fetch(url.as_str(), "connection reset"));
        }

        let found = self.responses.lock().unwrap().get(url.as_str()).cloned();
        let (status, content_type, body) = match found {
            Some(response) => response,
            None => (404, "text/plain".to_string(), b"not found".to_vec()),
        };

        Ok(FetchResponse {
            url,
            status,
            headers: vec![("content-type".to_string(), content_type.clone())],
            content_type,
            body,
        })
    }
}

/// 假浏览器：导航时先把文档请求交给拦截器，再并发发出脚本化的子资源请求
pub struct FakeBrowser {
    /// 文档加载后页面发出的请求
    pub subresources: Vec<String>,
    /// `window.location.href` 的返回值；未设置时返回导航地址
    pub location: Option<String>,
    pub verdicts: Arc<Mutex<Vec<(String, Verdict)>>>,
    pub pages_opened: AtomicUsize,
    pub pages_closed: Arc<AtomicUsize>,
}

impl FakeBrowser {
    pub fn new(subresources: &[&str]) -> Self {
        Self {
            subresources: subresources.iter().map(|url| url.to_string()).collect(),
            location: None,
            verdicts: Arc::new(Mutex::new(Vec::new())),
            pages_opened: AtomicUsize::new(0),
            pages_closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn verdict_for(&self, url: &str) -> Option<Verdict> {
        self.verdicts
            .lock()
            .unwrap()
            .iter()
            .find(|(requested, _)| requested == url)
            .map(|(_, verdict)| verdict.clone())
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn open_page(&self, _profile: &PageProfile) -> pagedump::DumpResult<Box<dyn Page>> {
        self.pages_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakePage {
            subresources: self.subresources.clone(),
            location: self.location.clone(),
            handler: Mutex::new(None),
            verdicts: Arc::clone(&self.verdicts),
            closed: Arc::clone(&self.pages_closed),
        }))
    }
}

pub struct FakePage {
    subresources: Vec<String>,
    location: Option<String>,
    handler: Mutex<Option<Arc<dyn RequestHandler>>>,
    verdicts: Arc<Mutex<Vec<(String, Verdict)>>>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl Page for FakePage {
    async fn intercept(&self, handler: Arc<dyn RequestHandler>) -> pagedump::DumpResult<()> {
        *self.handler.lock().unwrap() = Some(handler);
        Ok(())
    }

    async fn navigate(
        &self,
        url: &Url,
        _timeout: Duration,
        _condition: LoadCondition,
    ) -> pagedump::DumpResult<Option<NavigationResponse>> {
        let handler = self
            .handler
            .lock()
            .unwrap()
            .clone()
            .expect("navigate called before intercept");

        let mut document = InterceptedRequest::get(url.as_str());
        document.is_navigation = true;
        let response = match handler.handle(document).await {
            Verdict::Respond(fulfillment) => Some(NavigationResponse {
                url: url.to_string(),
                status: fulfillment.status,
                content_type: fulfillment.content_type,
                body: fulfillment.body,
            }),
            _ => None,
        };

        let tasks: Vec<_> = self
            .subresources
            .iter()
            .cloned()
            .map(|requested| {
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    let verdict = handler.handle(InterceptedRequest::get(requested.clone())).await;
                    (requested, verdict)
                })
            })
            .collect();

        for task in tasks {
            let resolved = task.await.expect("request task panicked");
            self.verdicts.lock().unwrap().push(resolved);
        }

        Ok(response)
    }

    async fn evaluate(&self, script: &str) -> pagedump::DumpResult<serde_json::Value> {
        assert!(script.contains("location"));
        Ok(self
            .location
            .clone()
            .map(serde_json::Value::String)
            .unwrap_or(serde_json::Value::Null))
    }

    async fn close(&self) -> pagedump::DumpResult<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn dumper(browser: Arc<FakeBrowser>, fetcher: Arc<MemoryFetcher>) -> Dumper {
    dumper_with_blocklist(browser, fetcher, Blocklist::empty())
}

pub fn dumper_with_blocklist(
    browser: Arc<FakeBrowser>,
    fetcher: Arc<MemoryFetcher>,
    blocklist: Blocklist,
) -> Dumper {
    Dumper::new(browser, fetcher, Arc::new(blocklist), DumperConfig::default())
}

/// 使用最短的 settle 窗口
pub fn fast_options() -> DumpOptions {
    DumpOptions {
        settle_time: Some(Duration::from_millis(2000)),
        ..DumpOptions::default()
    }
}

pub fn entry_html(results: &pagedump::DumpResults) -> String {
    let entry = results.entry_document().expect("entry document missing");
    String::from_utf8(entry.data.clone()).expect("entry document is not UTF-8")
}
