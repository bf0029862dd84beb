//! 资源引用映射
//!
//! HTML 与 CSS 重写共用的引用解析逻辑：把页面中的一个引用（src、url() 等）
//! 解析为捕获结果中的本地路径。

use std::collections::HashSet;

use crate::capture::store::IdentityMap;
use crate::utils::url::{
    base_uri, canonical_identity, is_http_scheme, is_same_origin, resolve_url, Url,
};

/// What a rewritten reference becomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalReference {
    /// Leave the reference as written (inline data, or already a local path).
    Keep,
    /// Replace with this output path.
    Local(String),
    /// Nothing local backs this reference.
    Missing,
}

/// Resolves page references against the frozen IdentityMap.
pub struct ReferenceMapper<'a> {
    identities: &'a IdentityMap,
    local_paths: HashSet<&'a str>,
    target: &'a Url,
    document_base: Url,
    cross_origin: bool,
}

impl<'a> ReferenceMapper<'a> {
    pub fn new(identities: &'a IdentityMap, target: &'a Url, cross_origin: bool) -> Self {
        Self {
            local_paths: identities.values().map(String::as_str).collect(),
            identities,
            target,
            document_base: base_uri(target),
            cross_origin,
        }
    }

    pub fn identities(&self) -> &'a IdentityMap {
        self.identities
    }

    /// Maps `reference`, resolved against `base`.
    ///
    /// Output paths produced by an earlier rewrite are recognised and kept, so
    /// rewriting a rewritten document changes nothing. Output paths are relative
    /// to the document, so only references resolved against the document base
    /// qualify.
    pub fn map(&self, reference: &str, base: &Url) -> LocalReference {
        let reference = reference.trim();
        if reference.is_empty() {
            return LocalReference::Missing;
        }

        let Some(url) = resolve_url(base, reference) else {
            return LocalReference::Missing;
        };

        if url.scheme() == "data" {
            return LocalReference::Keep;
        }
        if !is_http_scheme(&url) {
            return LocalReference::Missing;
        }
        if !self.cross_origin && !is_same_origin(&url, self.target) {
            return LocalReference::Missing;
        }

        if let Some(path) = self.identities.get(&canonical_identity(&url)) {
            return LocalReference::Local(path.clone());
        }

        if *base == self.document_base && self.local_paths.contains(reference) {
            LocalReference::Keep
        } else {
            LocalReference::Missing
        }
    }
}
