//! 样式表获取
//!
//! 文档重写是同步的（DOM 基于 `Rc`），而样式表获取是异步的。因此重写前先把文档
//! 与样式表中需要的全部样式表（包括递归的 `@import`）取回到 [`StylesheetBundle`]，
//! 重写时通过 [`StylesheetSource`] 同步读取。任何一张样式表获取失败都会中止整个会话。

use std::collections::{HashMap, HashSet, VecDeque};

use encoding_rs::{Encoding, UTF_8};
use tracing::debug;

use crate::capture::store::{IdentityMap, ResourceMap};
use crate::core::parse_content_type;
use crate::error::{DumpError, DumpResult};
use crate::network::fetcher::{FetchRequest, Fetcher};
use crate::parsers::css::{collect_imports, parse_stylesheet, sheet_key};
use crate::utils::url::{canonical_identity, get_origin, is_http_scheme, parse_data_url, Url};

const STYLESHEET_MEDIA_TYPE: &str = "text/css";

/// 同步的样式表来源
pub trait StylesheetSource {
    /// 返回 `url` 处样式表的文本
    fn stylesheet(&self, url: &Url) -> DumpResult<&str>;
}

/// 已取回的样式表集合，键为去掉片段的 URL
#[derive(Debug, Default)]
pub struct StylesheetBundle {
    sheets: HashMap<String, String>,
}

impl StylesheetSource for StylesheetBundle {
    fn stylesheet(&self, url: &Url) -> DumpResult<&str> {
        self.sheets
            .get(&sheet_key(url))
            .map(String::as_str)
            .ok_or_else(|| DumpError::stylesheet(url.as_str(), "stylesheet was not retrieved"))
    }
}

/// 按字符集解码文本，未知字符集按 UTF-8 处理（识别 BOM）
pub fn decode_text(data: &[u8], charset: &str) -> String {
    let encoding = Encoding::for_label(charset.trim().as_bytes()).unwrap_or(UTF_8);
    let (text, _, _) = encoding.decode(data);
    text.into_owned()
}

impl StylesheetBundle {
    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    /// 取回 `linked` 中的样式表，以及它们和 `inline` 中样式（连同其基准 URL）
    /// 递归导入的全部样式表。
    ///
    /// 会话中已捕获的 `text/css` 资源直接复用，其余通过 `fetcher` 获取。
    pub async fn load(
        linked: Vec<Url>,
        inline: &[(String, Url)],
        identities: &IdentityMap,
        resources: &ResourceMap,
        fetcher: &dyn Fetcher,
        target: &Url,
    ) -> DumpResult<Self> {
        let mut bundle = Self::default();
        let mut queued = HashSet::new();
        let mut queue = VecDeque::new();

        let imported_inline = inline
            .iter()
            .flat_map(|(css, base)| collect_imports(&parse_stylesheet(css), base));
        for url in linked.into_iter().chain(imported_inline) {
            if queued.insert(sheet_key(&url)) {
                queue.push_back(url);
            }
        }

        while let Some(url) = queue.pop_front() {
            let css = retrieve(&url, identities, resources, fetcher, target).await?;

            for import in collect_imports(&parse_stylesheet(&css), &url) {
                if queued.insert(sheet_key(&import)) {
                    queue.push_back(import);
                }
            }

            bundle.sheets.insert(sheet_key(&url), css);
        }

        Ok(bundle)
    }
}

async fn retrieve(
    url: &Url,
    identities: &IdentityMap,
    resources: &ResourceMap,
    fetcher: &dyn Fetcher,
    target: &Url,
) -> DumpResult<String> {
    if url.scheme() == "data" {
        let (media_type, charset, data) = parse_data_url(url);
        if media_type != STYLESHEET_MEDIA_TYPE {
            return Err(DumpError::stylesheet(
                url.as_str(),
                format!("unexpected content type {}", media_type),
            ));
        }
        return Ok(decode_text(&data, &charset));
    }

    if !is_http_scheme(url) {
        return Err(DumpError::stylesheet(url.as_str(), "unsupported URL protocol"));
    }

    let captured = identities
        .get(&canonical_identity(url))
        .and_then(|path| resources.get(path))
        .filter(|resource| parse_content_type(&resource.content_type).0 == STYLESHEET_MEDIA_TYPE);

    if let Some(resource) = captured {
        debug!(url = %url, "stylesheet reused from capture");
        let (_, charset, _) = parse_content_type(&resource.content_type);
        return Ok(decode_text(&resource.data, &charset));
    }

    let request = FetchRequest::get(url.clone())
        .with_headers(vec![("Accept".to_string(), STYLESHEET_MEDIA_TYPE.to_string())])
        .with_referrer(get_origin(target));

    let response = fetcher
        .fetch(request)
        .await
        .map_err(|e| DumpError::stylesheet(url.as_str(), e.to_string()))?;

    if !response.is_success() {
        return Err(DumpError::stylesheet(
            url.as_str(),
            format!("status {}", response.status),
        ));
    }
    if response.media_type() != STYLESHEET_MEDIA_TYPE {
        return Err(DumpError::stylesheet(
            url.as_str(),
            format!("unexpected content type {}", response.content_type),
        ));
    }

    debug!(url = %url, "stylesheet fetched");
    let (_, charset, _) = parse_content_type(&response.content_type);
    Ok(decode_text(&response.body, &charset))
}
