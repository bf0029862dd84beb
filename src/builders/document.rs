//! 离线文档外壳
//!
//! 固定的编码、引用策略、视口和相对 base 声明，运行时脚本放在 `<head>` 的最前面，
//! 之后是重写后的 head 与 body 内容。

use chrono::{SecondsFormat, Utc};

use crate::capture::store::IdentityMap;
use crate::parsers::html::RewrittenDocument;
use crate::utils::url::{is_http_scheme, Url};

use super::shim::{build_shim, SHIM_SCRIPT_ID};

/// 生成记录来源与时间的注释
///
/// URL 中的凭据被去掉，`--` 被转义以免提前结束注释。
pub fn create_metadata_comment(source_url: &Url) -> String {
    let datetime = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let mut clean_url = source_url.clone();
    clean_url.set_fragment(None);

    if is_http_scheme(&clean_url) {
        let _ = clean_url.set_username("");
        let _ = clean_url.set_password(None);
    }

    format!(
        "<!-- Captured from {} at {} using {} v{} -->",
        clean_url.as_str().replace("--", "-%2D"),
        datetime,
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
    )
}

/// 组装最终的离线文档
///
/// # 参数
///
/// * `document` - 重写后的 head 与 body
/// * `identities` - 冻结后的 IdentityMap，用于生成运行时脚本
/// * `source_url` - 页面最终所在的地址，只写入注释
pub fn build_document(document: &RewrittenDocument, identities: &IdentityMap, source_url: &Url) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
{comment}
<head>
<meta charset="utf-8">
<meta http-equiv="Referrer-Policy" content="no-referrer">
<meta name="referrer" content="no-referrer">
<meta name="viewport" content="width=device-width,initial-scale=1">
<base href="." target="_blank">
<script id="{shim_id}" type="text/javascript">
{shim}
</script>
{head}
</head>
<body>
{body}
</body>
</html>
"#,
        comment = create_metadata_comment(source_url),
        shim_id = SHIM_SCRIPT_ID,
        shim = build_shim(identities),
        head = document.head,
        body = document.body,
    )
}
