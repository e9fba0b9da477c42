//! Version descriptor parsing and update detection.
//!
//! The descriptor is a small CSV file: a header line followed by one or
//! more data lines. The last data line carries the current version in its
//! first column and a human-readable note in the rest.

use tracing::{debug, warn};

use crate::cache::CacheStorage;
use crate::fetch::{AssetFetcher, FetchMode};

/// Header plus at least one data line.
const MIN_DESCRIPTOR_LINES: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionDescriptor {
    /// Never empty.
    pub version: String,
    pub note: String,
    /// Full source text, persisted verbatim on refresh.
    pub raw_text: String,
}

impl VersionDescriptor {
    /// Parse descriptor text. Malformed or too-short text yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let lines: Vec<&str> = raw
            .split('\n')
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        if lines.len() < MIN_DESCRIPTOR_LINES {
            return None;
        }

        // A data line without a separator is not descriptor text, so a
        // single-column file such as "version\n1.0.4" never triggers an
        // update. Descriptors must carry `version,note`.
        let (version, note) = lines[lines.len() - 1].split_once(',')?;
        let (version, note) = (version.trim(), note.trim());
        if version.is_empty() {
            return None;
        }

        Some(Self {
            version: version.to_string(),
            note: note.to_string(),
            raw_text: raw.to_string(),
        })
    }
}

/// Fetch the descriptor from origin, bypassing caches. Any failure
/// (transport, status, malformed text) yields `None`.
pub async fn fetch_latest_version(fetcher: &dyn AssetFetcher, url: &str) -> Option<VersionDescriptor> {
    let response = match fetcher.fetch(url, FetchMode::NoStore).await {
        Ok(response) => response,
        Err(e) => {
            warn!(url, error = %e, "Failed to fetch version descriptor");
            return None;
        }
    };
    if !response.is_success() {
        debug!(url, status = response.status, "Version descriptor unavailable");
        return None;
    }

    let descriptor = VersionDescriptor::parse(&response.text());
    if descriptor.is_none() {
        debug!(url, "Version descriptor malformed");
    }
    descriptor
}

/// Version recorded in the stored copy of the descriptor, looked up across
/// every store like `caches.match`.
pub async fn cached_version(storage: &CacheStorage, url: &str) -> anyhow::Result<Option<String>> {
    let cached = storage.match_any(url).await?;
    Ok(cached.and_then(|response| VersionDescriptor::parse(&response.text()).map(|d| d.version)))
}

/// Plain inequality, no version ordering: a fetched version lower than the
/// cached one still triggers a refresh. Nothing fetched means no refresh.
pub fn should_update(cached: Option<&str>, fetched: Option<&str>) -> bool {
    match fetched {
        Some(fetched) => cached != Some(fetched),
        None => false,
    }
}
