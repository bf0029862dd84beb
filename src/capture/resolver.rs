//! Output path resolution for captured resources.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::utils::url::{canonical_identity, path_extension, Url};

/// Namespace for resources outside the base URI.
pub const CROSS_ORIGIN_NAMESPACE: &str = "ext/";
/// Namespace for anonymized resources.
pub const ANONYMIZED_NAMESPACE: &str = "r/";
/// File name appended to directory-like output paths.
pub const DIRECTORY_INDEX: &str = "index.html";

/// Exclusive upper bound of anonymized resource ids.
const ANONYMIZED_ID_SPACE: u64 = 1_000_000_000_000_000;

/// How output paths are derived from resource identities.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingPolicy {
    /// Keep the source hierarchy so sibling relative references stay valid.
    #[default]
    Preserve,
    /// Replace every path with a random numeric id, keeping only the extension.
    Anonymize,
}

/// Maps resource URLs to output paths under one session's base URI.
#[derive(Clone, Debug)]
pub struct PathResolver {
    base_uri: String,
    policy: NamingPolicy,
}

impl PathResolver {
    pub fn new(base_uri: &Url, policy: NamingPolicy) -> Self {
        Self {
            base_uri: base_uri.to_string(),
            policy,
        }
    }

    pub fn policy(&self) -> NamingPolicy {
        self.policy
    }

    /// Output path for `url`.
    ///
    /// Anonymized ids are random; two calls for the same URL give different paths.
    /// Ids are drawn from a 10^15 space and uniqueness is not guaranteed.
    pub fn resolve(&self, url: &Url) -> String {
        let path = match self.policy {
            NamingPolicy::Preserve => self.preserved_path(url),
            NamingPolicy::Anonymize => anonymized_path(url),
        };

        if path.is_empty() || path.ends_with('/') {
            format!("{path}{DIRECTORY_INDEX}")
        } else {
            path
        }
    }

    fn preserved_path(&self, url: &Url) -> String {
        let identity = canonical_identity(url);

        match identity.strip_prefix(&self.base_uri) {
            Some(relative) => relative.to_string(),
            None => format!(
                "{}{}{}",
                CROSS_ORIGIN_NAMESPACE,
                url.host_str().unwrap_or_default(),
                url.path()
            ),
        }
    }
}

fn anonymized_path(url: &Url) -> String {
    let id: u64 = rand::thread_rng().gen_range(0..ANONYMIZED_ID_SPACE);
    format!("{}{}{}", ANONYMIZED_NAMESPACE, id, path_extension(url.path()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::url::base_uri;

    fn resolver(policy: NamingPolicy) -> PathResolver {
        let target = Url::parse("https://example.com/game/index.html").unwrap();
        PathResolver::new(&base_uri(&target), policy)
    }

    #[test]
    fn test_preserve_same_directory() {
        let url = Url::parse("https://example.com/game/img.png?v=2").unwrap();
        assert_eq!(resolver(NamingPolicy::Preserve).resolve(&url), "img.png");
    }

    #[test]
    fn test_preserve_nested_directory() {
        let url = Url::parse("https://example.com/game/assets/sprites/a.png").unwrap();
        assert_eq!(
            resolver(NamingPolicy::Preserve).resolve(&url),
            "assets/sprites/a.png"
        );
    }

    #[test]
    fn test_preserve_outside_base_uses_namespace() {
        let url = Url::parse("https://cdn.other.com/lib/a.js").unwrap();
        assert_eq!(
            resolver(NamingPolicy::Preserve).resolve(&url),
            "ext/cdn.other.com/lib/a.js"
        );

        let same_origin = Url::parse("https://example.com/shared/b.css").unwrap();
        assert_eq!(
            resolver(NamingPolicy::Preserve).resolve(&same_origin),
            "ext/example.com/shared/b.css"
        );
    }

    #[test]
    fn test_preserve_directory_gets_index() {
        let url = Url::parse("https://example.com/game/").unwrap();
        assert_eq!(resolver(NamingPolicy::Preserve).resolve(&url), "index.html");

        let nested = Url::parse("https://example.com/game/levels/").unwrap();
        assert_eq!(
            resolver(NamingPolicy::Preserve).resolve(&nested),
            "levels/index.html"
        );
    }

    #[test]
    fn test_anonymize_shape() {
        let url = Url::parse("https://example.com/game/img.png").unwrap();
        let path = resolver(NamingPolicy::Anonymize).resolve(&url);

        let id = path
            .strip_prefix("r/")
            .and_then(|rest| rest.strip_suffix(".png"))
            .expect("anonymized path has namespace and extension");
        assert!(!id.is_empty());
        assert!(id.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_anonymize_without_extension() {
        let url = Url::parse("https://cdn.other.com/api/data").unwrap();
        let path = resolver(NamingPolicy::Anonymize).resolve(&url);
        assert!(path.starts_with("r/"));
        assert!(path[2..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_anonymize_distinct_resources_get_distinct_ids() {
        let resolver = resolver(NamingPolicy::Anonymize);
        let a = resolver.resolve(&Url::parse("https://example.com/game/a.png").unwrap());
        let b = resolver.resolve(&Url::parse("https://example.com/game/b.png").unwrap());
        assert_ne!(a, b);
    }
}
