//! Ad/tracker hostname blocklist.
//!
//! Loaded once per process from a hosts-format list and shared read-only
//! between every capture session.

use std::collections::HashSet;
use std::path::Path;

use tracing::{info, warn};

use crate::network::fetcher::{FetchRequest, Fetcher};
use crate::utils::url::Url;

/// Public hosts-file list used when no other source is configured.
pub const DEFAULT_BLOCKLIST_SOURCE: &str =
    "https://raw.githubusercontent.com/StevenBlack/hosts/master/hosts";

const BLOCKED_ADDRESS_PREFIX: &str = "0.0.0.0 ";

#[derive(Debug, Clone, Default)]
pub struct Blocklist {
    hosts: HashSet<String>,
}

impl Blocklist {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Hostnames from `0.0.0.0 <host>` lines. Comments and other addresses are ignored.
    pub fn from_hosts_file(text: &str) -> Self {
        let hosts = text
            .lines()
            .filter_map(|line| line.strip_prefix(BLOCKED_ADDRESS_PREFIX))
            .filter_map(|rest| rest.split_whitespace().next())
            .filter(|host| !host.starts_with('#') && *host != "0.0.0.0")
            .map(|host| host.to_ascii_lowercase())
            .collect();

        Self { hosts }
    }

    /// One hostname per line, as written to the cache file.
    fn from_cache(text: &str) -> Self {
        let hosts = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_ascii_lowercase)
            .collect();

        Self { hosts }
    }

    fn to_cache(&self) -> String {
        let mut hosts: Vec<&str> = self.hosts.iter().map(String::as_str).collect();
        hosts.sort_unstable();
        hosts.join("\n")
    }

    /// Loads the list from `cache_path` when present, otherwise from `source`.
    ///
    /// Only a successful `text/plain` response is accepted and then cached.
    /// Any failure yields an empty blocklist.
    pub async fn load(fetcher: &dyn Fetcher, source: &str, cache_path: Option<&Path>) -> Self {
        if let Some(path) = cache_path {
            match tokio::fs::read_to_string(path).await {
                Ok(text) => {
                    let blocklist = Self::from_cache(&text);
                    info!(hosts = blocklist.len(), path = %path.display(), "blocklist loaded from cache");
                    return blocklist;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "unreadable blocklist cache"),
            }
        }

        let Ok(url) = Url::parse(source) else {
            warn!(source, "invalid blocklist source, continuing without blocklist");
            return Self::empty();
        };

        let request = FetchRequest::get(url)
            .with_headers(vec![("Accept".to_string(), "text/plain".to_string())]);

        let response = match fetcher.fetch(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "blocklist fetch failed, continuing without blocklist");
                return Self::empty();
            }
        };

        if !response.is_success() || response.media_type() != "text/plain" {
            warn!(
                status = response.status,
                content_type = %response.content_type,
                "unexpected blocklist response, continuing without blocklist"
            );
            return Self::empty();
        }

        let blocklist = Self::from_hosts_file(&String::from_utf8_lossy(&response.body));
        info!(hosts = blocklist.len(), "blocklist fetched");

        if let Some(path) = cache_path {
            Self::write_cache(path, &blocklist).await;
        }

        blocklist
    }

    async fn write_cache(path: &Path, blocklist: &Blocklist) {
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!(path = %parent.display(), error = %e, "failed to create blocklist cache directory");
                return;
            }
        }
        if let Err(e) = tokio::fs::write(path, blocklist.to_cache()).await {
            warn!(path = %path.display(), error = %e, "failed to write blocklist cache");
        }
    }

    /// Exact hostname match.
    pub fn contains(&self, host: &str) -> bool {
        self.hosts.contains(&host.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for Blocklist {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            hosts: iter
                .into_iter()
                .map(|host| host.into().to_ascii_lowercase())
                .collect(),
        }
    }
}
