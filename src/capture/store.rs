//! Session capture maps.
//!
//! `CaptureStore` owns the IdentityMap (canonical identity -> output path) and the
//! ResourceMap (output path -> payload) while the page loads. Insertion is keyed
//! on the identity entry, so concurrent captures of one identity store exactly once.

use std::collections::BTreeMap;
use std::sync::RwLock;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::capture::resolver::{NamingPolicy, PathResolver, DIRECTORY_INDEX};
use crate::utils::url::{canonical_identity, Url};

/// Path of the rewritten entry document in every result set.
pub const ENTRY_DOCUMENT_PATH: &str = DIRECTORY_INDEX;

/// Attempts at drawing a free anonymized path before giving up on a resource.
const MAX_ANONYMIZED_ATTEMPTS: usize = 8;

/// Immutable captured payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedResource {
    pub data: Vec<u8>,
    pub content_type: String,
    pub size: usize,
}

impl CapturedResource {
    pub fn new(data: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            size: data.len(),
            data,
            content_type: content_type.into(),
        }
    }
}

/// Canonical identity -> output path.
pub type IdentityMap = BTreeMap<String, String>;
/// Output path -> payload.
pub type ResourceMap = BTreeMap<String, CapturedResource>;

/// Result of offering a response to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Captured(String),
    /// The identity was already mapped; nothing was stored.
    Duplicate(String),
    /// No free output path could be assigned.
    PathTaken,
    /// The session no longer accepts captures.
    Frozen,
}

pub struct CaptureStore {
    resolver: PathResolver,
    identities: DashMap<String, String>,
    resources: DashMap<String, CapturedResource>,
    /// `true` once frozen. Captures hold the read side for their whole insertion.
    gate: RwLock<bool>,
}

impl CaptureStore {
    /// Creates the store for a session targeting `target`, whose identity is bound
    /// to the entry-document path up front.
    pub fn new(resolver: PathResolver, target: &Url) -> Self {
        let identities = DashMap::new();
        identities.insert(canonical_identity(target), ENTRY_DOCUMENT_PATH.to_string());

        Self {
            resolver,
            identities,
            resources: DashMap::new(),
            gate: RwLock::new(false),
        }
    }

    pub fn policy(&self) -> NamingPolicy {
        self.resolver.policy()
    }

    /// Stores `data` for `url` unless its identity is already mapped.
    pub fn capture(&self, url: &Url, content_type: &str, data: Vec<u8>) -> CaptureOutcome {
        let frozen = self.gate.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        if *frozen {
            return CaptureOutcome::Frozen;
        }

        let identity = canonical_identity(url);
        let vacant = match self.identities.entry(identity) {
            Entry::Occupied(existing) => return CaptureOutcome::Duplicate(existing.get().clone()),
            Entry::Vacant(vacant) => vacant,
        };

        let attempts = match self.resolver.policy() {
            NamingPolicy::Preserve => 1,
            NamingPolicy::Anonymize => MAX_ANONYMIZED_ATTEMPTS,
        };

        for _ in 0..attempts {
            let path = self.resolver.resolve(url);
            if path == ENTRY_DOCUMENT_PATH {
                continue;
            }

            match self.resources.entry(path.clone()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => {
                    slot.insert(CapturedResource::new(data, content_type));
                    vacant.insert(path.clone());
                    debug!(url = %url, path = %path, "captured");
                    return CaptureOutcome::Captured(path);
                }
            }
        }

        warn!(url = %url, "no free output path, resource not captured");
        CaptureOutcome::PathTaken
    }

    /// Output path already assigned to `url`'s identity.
    pub fn path_for(&self, url: &Url) -> Option<String> {
        self.identities
            .get(&canonical_identity(url))
            .map(|path| path.value().clone())
    }

    /// Stops accepting captures. Waits for in-flight insertions to finish.
    pub fn freeze(&self) {
        let mut frozen = self.gate.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        *self.gate.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Freezes the store and returns ordered copies of both maps.
    pub fn snapshot(&self) -> (IdentityMap, ResourceMap) {
        self.freeze();

        let identities = self
            .identities
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        let resources = self
            .resources
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        (identities, resources)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
