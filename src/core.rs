use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use percent_encoding::percent_decode_str;
use tracing::{debug, info, warn};

use crate::browser::{Browser, Page};
use crate::builders::document::build_document;
use crate::capture::interceptor::CaptureInterceptor;
use crate::capture::resolver::{NamingPolicy, PathResolver};
use crate::capture::store::{
    CaptureStore, CapturedResource, IdentityMap, ResourceMap, ENTRY_DOCUMENT_PATH,
};
use crate::config::DumperConfig;
use crate::error::{DumpError, DumpResult};
use crate::network::blocklist::Blocklist;
use crate::network::fetcher::Fetcher;
use crate::parsers::css::CssRewriter;
use crate::parsers::html::{collect_stylesheets, DocumentRewriter, RewrittenDocument};
use crate::parsers::references::ReferenceMapper;
use crate::parsers::stylesheets::{decode_text, StylesheetBundle, StylesheetSource};
use crate::utils::url::{base_uri, is_http_scheme, Url};

/// Settle window used when none is requested.
pub const DEFAULT_SETTLE_TIME: Duration = Duration::from_millis(2500);
pub const MIN_SETTLE_TIME: Duration = Duration::from_millis(2000);
pub const MAX_SETTLE_TIME: Duration = Duration::from_millis(60000);

/// Media type of the generated entry document.
pub const ENTRY_DOCUMENT_CONTENT_TYPE: &str = "text/html; charset=utf-8";

const ANSI_COLOR_RED: &str = "\x1b[31m";
const ANSI_COLOR_RESET: &str = "\x1b[0m";
// '.' matches any byte
const FILE_SIGNATURES: [[&[u8]; 2]; 18] = [
    // Image
    [b"GIF87a", b"image/gif"],
    [b"GIF89a", b"image/gif"],
    [b"\xFF\xD8\xFF", b"image/jpeg"],
    [b"\x89PNG\x0D\x0A\x1A\x0A", b"image/png"],
    [b"<svg ", b"image/svg+xml"],
    [b"RIFF....WEBPVP8", b"image/webp"],
    [b"\x00\x00\x01\x00", b"image/x-icon"],
    // Audio
    [b"ID3", b"audio/mpeg"],
    [b"\xFF\xFB", b"audio/mpeg"],
    [b"\xFF\xF3", b"audio/mpeg"],
    [b"OggS", b"audio/ogg"],
    [b"RIFF....WAVEfmt ", b"audio/wav"],
    [b"fLaC", b"audio/x-flac"],
    // Video
    [b"RIFF....AVI LIST", b"video/avi"],
    [b"....ftyp", b"video/mp4"],
    [b"\x00\x00\x01\xBA", b"video/mpeg"],
    [b"....moov", b"video/quicktime"],
    [b"\x1A\x45\xDF\xA3", b"video/webm"],
];

/// Per-capture options
///
/// This struct carries the knobs a caller may change for a single capture;
/// everything session-independent lives in [`DumperConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpOptions {
    /// Time the page is held open after the initial load. Zero or `None`
    /// selects [`DEFAULT_SETTLE_TIME`].
    pub settle_time: Option<Duration>,
    pub naming: NamingPolicy,
    /// Capture resources from origins other than the target's.
    pub cross_origin: bool,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            settle_time: None,
            naming: NamingPolicy::Preserve,
            cross_origin: true,
        }
    }
}

impl DumpOptions {
    /// Settle window clamped into [`MIN_SETTLE_TIME`, `MAX_SETTLE_TIME`]
    pub fn settle_window(&self) -> Duration {
        match self.settle_time {
            Some(time) if !time.is_zero() => time.clamp(MIN_SETTLE_TIME, MAX_SETTLE_TIME),
            _ => DEFAULT_SETTLE_TIME,
        }
    }
}

/// Output of one capture
#[derive(Debug, Clone)]
pub struct DumpResults {
    /// Output path to payload. Always holds the entry document.
    pub resources: ResourceMap,
    /// Canonical identity to output path, frozen at the end of the settle window.
    pub identities: IdentityMap,
    /// Title of the generated document.
    pub title: String,
}

impl DumpResults {
    pub fn entry_document(&self) -> Option<&CapturedResource> {
        self.resources.get(ENTRY_DOCUMENT_PATH)
    }

    pub fn get(&self, path: &str) -> Option<&CapturedResource> {
        self.resources.get(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Total payload size in bytes
    pub fn total_size(&self) -> usize {
        self.resources.values().map(|resource| resource.size).sum()
    }
}

/// Caller-owned capture session factory
///
/// Every [`Dumper::capture`] call opens its own page and capture maps. Calls
/// may run concurrently; they share only the read-only blocklist.
pub struct Dumper {
    browser: Arc<dyn Browser>,
    fetcher: Arc<dyn Fetcher>,
    blocklist: Arc<Blocklist>,
    config: DumperConfig,
}

impl Dumper {
    pub fn new(
        browser: Arc<dyn Browser>,
        fetcher: Arc<dyn Fetcher>,
        blocklist: Arc<Blocklist>,
        config: DumperConfig,
    ) -> Self {
        Self {
            browser,
            fetcher,
            blocklist,
            config,
        }
    }

    pub fn config(&self) -> &DumperConfig {
        &self.config
    }

    /// Captures `url` into a self-contained snapshot
    ///
    /// # Errors
    ///
    /// Fails with `InvalidUrl`/`Protocol` before any browser work, with
    /// `Navigation` when the page load produced no or a non-success response,
    /// and with `StylesheetFetch` when a stylesheet needed for inlining cannot be
    /// retrieved. No partial results are returned.
    pub async fn capture(&self, url: &str, options: &DumpOptions) -> DumpResult<DumpResults> {
        let target = parse_target(url)?;
        let page = self.browser.open_page(&self.config.profile).await?;

        let result = self.run(page.as_ref(), &target, options).await;

        if let Err(e) = page.close().await {
            warn!(error = %e, "failed to close page");
        }

        match &result {
            Ok(results) => info!(
                url = %target,
                resources = results.len(),
                bytes = results.total_size(),
                "capture finished"
            ),
            Err(e) => warn!(url = %target, error = %e, "capture failed"),
        }

        result
    }

    async fn run(
        &self,
        page: &dyn Page,
        target: &Url,
        options: &DumpOptions,
    ) -> DumpResult<DumpResults> {
        let base = base_uri(target);
        let store = Arc::new(CaptureStore::new(
            PathResolver::new(&base, options.naming),
            target,
        ));

        let interceptor = CaptureInterceptor::new(
            Arc::clone(&store),
            Arc::clone(&self.fetcher),
            Arc::clone(&self.blocklist),
            target.clone(),
            options.cross_origin,
            self.config.request_timeout,
        );
        page.intercept(Arc::new(interceptor)).await?;

        info!(url = %target, "navigating");
        let response = page
            .navigate(
                target,
                self.config.navigation_timeout,
                self.config.load_condition,
            )
            .await?
            .ok_or_else(|| DumpError::Navigation("failed to load requested page".to_string()))?;

        if !response.is_success() {
            store.freeze();
            return Err(DumpError::Navigation(format!(
                "response returned error status code {}",
                response.status
            )));
        }

        let settle = options.settle_window();
        debug!(millis = settle.as_millis() as u64, "settling");
        tokio::time::sleep(settle).await;

        let (identities, mut resources) = store.snapshot();
        info!(resources = resources.len(), "capture maps frozen");

        let source_url = final_location(page, target).await;
        let (_, charset, _) = parse_content_type(&response.content_type);
        let html = decode_text(&response.body, &charset);

        let demand = collect_stylesheets(&html, &base);
        let stylesheets = StylesheetBundle::load(
            demand.linked,
            &demand.inline,
            &identities,
            &resources,
            self.fetcher.as_ref(),
            target,
        )
        .await?;

        let rewritten = rewrite_document(
            &html,
            &identities,
            target,
            &base,
            options.cross_origin,
            &stylesheets,
        )?;
        let document = build_document(&rewritten, &identities, &source_url);

        resources.insert(
            ENTRY_DOCUMENT_PATH.to_string(),
            CapturedResource::new(document.into_bytes(), ENTRY_DOCUMENT_CONTENT_TYPE),
        );

        Ok(DumpResults {
            resources,
            identities,
            title: rewritten.title,
        })
    }
}

/// Rewrites `html` against frozen capture maps
///
/// Synchronous: every stylesheet the document needs must already be in `stylesheets`.
pub fn rewrite_document(
    html: &str,
    identities: &IdentityMap,
    target: &Url,
    base: &Url,
    cross_origin: bool,
    stylesheets: &dyn StylesheetSource,
) -> DumpResult<RewrittenDocument> {
    let references = ReferenceMapper::new(identities, target, cross_origin);
    let css = CssRewriter::new(&references, stylesheets);
    DocumentRewriter::new(&references, &css, base).rewrite(html)
}

/// Parses and checks a capture target
pub fn parse_target(url: &str) -> DumpResult<Url> {
    let target = Url::parse(url.trim()).map_err(|e| DumpError::InvalidUrl(format!("{url}: {e}")))?;
    if !is_http_scheme(&target) {
        return Err(DumpError::Protocol(format!("{}:", target.scheme())));
    }
    Ok(target)
}

async fn final_location(page: &dyn Page, target: &Url) -> Url {
    match page.evaluate("window.location.href").await {
        Ok(serde_json::Value::String(href)) => Url::parse(&href).unwrap_or_else(|_| target.clone()),
        Ok(other) => {
            debug!(value = %other, "unexpected location value");
            target.clone()
        }
        Err(e) => {
            warn!(error = %e, "could not read final page location");
            target.clone()
        }
    }
}

/// Determines the media type of data based on its content signature
pub fn detect_media_type(data: &[u8], url: &Url) -> String {
    for signature in &FILE_SIGNATURES {
        if matches_signature(data, signature[0]) {
            return String::from_utf8_lossy(signature[1]).to_string();
        }
    }

    detect_media_type_by_file_name(url.path())
}

fn matches_signature(data: &[u8], signature: &[u8]) -> bool {
    data.len() >= signature.len()
        && signature
            .iter()
            .zip(data)
            .all(|(expected, actual)| *expected == b'.' || expected == actual)
}

/// Determines the media type based on file extension
pub fn detect_media_type_by_file_name(filename: &str) -> String {
    let filename_lowercased = filename.to_lowercase();

    let media_type = match filename_lowercased.rsplit_once('.').map(|(_, ext)| ext) {
        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("js") | Some("mjs") => "application/javascript",
        Some("json") => "application/json",
        Some("wasm") => "application/wasm",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("mp3") => "audio/mpeg",
        Some("ogg") => "audio/ogg",
        Some("wav") => "audio/wav",
        Some("flac") => "audio/x-flac",
        Some("mp4") => "video/mp4",
        Some("avi") => "video/avi",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("mpeg") | Some("mpg") => "video/mpeg",
        _ => "application/octet-stream",
    };

    media_type.to_string()
}

/// Parses Content-Type header value into (media type, charset, is base64)
pub fn parse_content_type(content_type: &str) -> (String, String, bool) {
    let mut parts = content_type.split(';');
    let media_type = parts.next().unwrap_or_default().trim().to_lowercase();
    let mut charset = String::new();
    let mut is_base64 = false;

    for part in parts {
        let part = part.trim();
        if let Some((name, value)) = part.split_once('=') {
            if name.trim().eq_ignore_ascii_case("charset") {
                charset = value.trim().trim_matches('"').to_string();
            }
        } else if part.eq_ignore_ascii_case("base64") {
            is_base64 = true;
        }
    }

    (media_type, charset, is_base64)
}

/// Maps a result path to a file beneath `root`
///
/// Each path segment is percent-decoded. Returns `None` for paths that would
/// escape `root` or that contain empty segments.
pub fn output_file_path(root: &Path, resource_path: &str) -> Option<PathBuf> {
    let mut file_path = root.to_path_buf();

    for segment in resource_path.split('/') {
        let segment = percent_decode_str(segment).decode_utf8_lossy();
        if segment.is_empty()
            || segment == "."
            || segment == ".."
            || segment.contains(['/', '\\', '\0'])
        {
            return None;
        }
        file_path.push(segment.as_ref());
    }

    Some(file_path)
}

/// Prints an error message to stderr
pub fn print_error_message(msg: &str, colored: bool) {
    if colored {
        eprintln!("{ANSI_COLOR_RED}{msg}{ANSI_COLOR_RESET}");
    } else {
        eprintln!("{msg}");
    }
}
