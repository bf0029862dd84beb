//! URL 工具函数
//!
//! 处理捕获会话中用到的各种 URL 计算：基准 URI、规范身份（origin + path）、
//! 相对引用解析以及扩展名提取。

use base64::prelude::*;
use percent_encoding::percent_decode_str;

use crate::core::parse_content_type;

pub use url::Url;

/// Schemes that go through the capture pipeline.
pub const CAPTURE_SCHEMES: &[&str] = &["http", "https"];

/// Schemes that are passed through untouched.
pub const PASSTHROUGH_SCHEMES: &[&str] = &["data", "blob"];

pub fn is_http_scheme(url: &Url) -> bool {
    CAPTURE_SCHEMES.contains(&url.scheme())
}

pub fn is_passthrough_scheme(url: &Url) -> bool {
    PASSTHROUGH_SCHEMES.contains(&url.scheme())
}

/// Resolves `reference` against `base`, returning `None` for unparseable references.
pub fn resolve_url(base: &Url, reference: &str) -> Option<Url> {
    base.join(reference.trim()).ok()
}

/// Serialized origin of a URL, e.g. `https://example.com:8443`.
pub fn get_origin(url: &Url) -> String {
    url.origin().ascii_serialization()
}

pub fn is_same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}

/// Directory-equivalent prefix of `url`: everything up to and including the last `/`
/// of its path, with query and fragment dropped.
pub fn base_uri(url: &Url) -> Url {
    let mut base = url.clone();
    base.set_query(None);
    base.set_fragment(None);

    let path = base.path().to_string();
    if !path.ends_with('/') {
        let directory = match path.rfind('/') {
            Some(index) => &path[..=index],
            None => "/",
        };
        base.set_path(directory);
    }

    base
}

/// Canonical identity of a resource: origin followed by path, query and fragment stripped.
/// This is the dedup key of a capture session.
pub fn canonical_identity(url: &Url) -> String {
    format!("{}{}", get_origin(url), url.path())
}

/// Extension of the last path segment including the leading dot, or an empty string.
///
/// Dot-files such as `/.htaccess` have no extension.
pub fn path_extension(path: &str) -> &str {
    let file_name = path.rsplit('/').next().unwrap_or_default();

    match file_name.rfind('.') {
        Some(0) | None => "",
        Some(index) => &file_name[index..],
    }
}

/// Splits a `data:` URL into media type, charset and decoded payload.
pub fn parse_data_url(url: &Url) -> (String, String, Vec<u8>) {
    let path: &str = url.path();
    let comma_loc: usize = path.find(',').unwrap_or(path.len());

    let (media_type, charset, is_base64) = parse_content_type(&path[..comma_loc]);
    let data: &str = path.get(comma_loc + 1..).unwrap_or_default();
    let bytes: Vec<u8> = percent_decode_str(data).collect();

    let blob = if is_base64 {
        let text: String = String::from_utf8_lossy(&bytes)
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        BASE64_STANDARD.decode(text).unwrap_or_default()
    } else {
        bytes
    };

    let media_type = if media_type.is_empty() {
        "text/plain".to_string()
    } else {
        media_type
    };

    (media_type, charset, blob)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_uri_of_file() {
        let url = Url::parse("https://example.com/game/index.html?v=1#top").unwrap();
        assert_eq!(base_uri(&url).as_str(), "https://example.com/game/");
    }

    #[test]
    fn test_base_uri_of_directory() {
        let url = Url::parse("https://example.com/game/").unwrap();
        assert_eq!(base_uri(&url).as_str(), "https://example.com/game/");
    }

    #[test]
    fn test_base_uri_of_root() {
        let url = Url::parse("https://example.com").unwrap();
        assert_eq!(base_uri(&url).as_str(), "https://example.com/");
    }

    #[test]
    fn test_canonical_identity_strips_query_and_fragment() {
        let url = Url::parse("https://example.com:443/game/img.png?cache=123#frag").unwrap();
        assert_eq!(canonical_identity(&url), "https://example.com/game/img.png");
    }

    #[test]
    fn test_canonical_identity_keeps_explicit_port() {
        let url = Url::parse("http://localhost:8080/a.js").unwrap();
        assert_eq!(canonical_identity(&url), "http://localhost:8080/a.js");
    }

    #[test]
    fn test_resolve_url_relative_to_base() {
        let base = Url::parse("https://example.com/game/").unwrap();
        assert_eq!(
            resolve_url(&base, "img/a.png").unwrap().as_str(),
            "https://example.com/game/img/a.png"
        );
        assert_eq!(
            resolve_url(&base, "/root.css").unwrap().as_str(),
            "https://example.com/root.css"
        );
    }

    #[test]
    fn test_path_extension() {
        assert_eq!(path_extension("/a/b/c.png"), ".png");
        assert_eq!(path_extension("/a/b/archive.tar.gz"), ".gz");
        assert_eq!(path_extension("/a/b/noext"), "");
        assert_eq!(path_extension("/a.dir/noext"), "");
        assert_eq!(path_extension("/.htaccess"), "");
        assert_eq!(path_extension("/"), "");
    }

    #[test]
    fn test_parse_data_url_plain() {
        let url = Url::parse("data:text/css;charset=utf-8,body%20%7B%20color%3A%20red%20%7D").unwrap();
        let (media_type, charset, data) = parse_data_url(&url);
        assert_eq!(media_type, "text/css");
        assert_eq!(charset, "utf-8");
        assert_eq!(data, b"body { color: red }");
    }

    #[test]
    fn test_parse_data_url_base64() {
        let url = Url::parse("data:image/png;base64,iVBORw0KGgo=").unwrap();
        let (media_type, _, data) = parse_data_url(&url);
        assert_eq!(media_type, "image/png");
        assert_eq!(data, b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_parse_data_url_defaults_to_text_plain() {
        let url = Url::parse("data:,hello").unwrap();
        assert_eq!(parse_data_url(&url).0, "text/plain");
    }

    #[test]
    fn test_schemes() {
        assert!(is_http_scheme(&Url::parse("https://a.com").unwrap()));
        assert!(is_passthrough_scheme(&Url::parse("data:text/plain,hi").unwrap()));
        assert!(is_passthrough_scheme(&Url::parse("blob:https://a.com/uuid").unwrap()));
        assert!(!is_http_scheme(&Url::parse("ftp://a.com/x").unwrap()));
    }
}
