//! HTTP fetcher backed by `reqwest`.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Url};
use tracing::debug;

use crate::cache::StoredResponse;

use super::FetchError;

/// Request cache behaviour, mirroring the `cache` option of `fetch()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Let intermediaries answer if they want to.
    Default,
    /// Always go to origin.
    NoStore,
}

/// Abstraction over network fetches so hooks can be driven by fakes in tests.
///
/// A non-success HTTP status is *not* an error here: like `fetch()`, the
/// response comes back with its status and callers decide. Only transport
/// failures and unusable URLs are errors.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str, mode: FetchMode) -> Result<StoredResponse, FetchError>;
}

/// Fetcher for a single web origin.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    origin: Url,
}

impl HttpFetcher {
    pub fn new(origin: &str, timeout: Duration) -> Result<Self, FetchError> {
        let origin = Self::parse_origin(origin)?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, origin })
    }

    /// Parse the origin, making sure it ends with `/` so relative paths
    /// resolve underneath it instead of replacing its last segment.
    fn parse_origin(origin: &str) -> Result<Url, FetchError> {
        let normalized = if origin.ends_with('/') {
            origin.to_string()
        } else {
            format!("{}/", origin)
        };
        Url::parse(&normalized).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", origin, e)))
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Resolve a manifest entry or request URL against the origin.
    pub fn resolve(&self, url: &str) -> Result<Url, FetchError> {
        self.origin
            .join(url)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", url, e)))
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, mode: FetchMode) -> Result<StoredResponse, FetchError> {
        let target = self.resolve(url)?;
        let mut request = self.client.get(target.clone());
        if mode == FetchMode::NoStore {
            request = request
                .header(header::CACHE_CONTROL, "no-store")
                .header(header::PRAGMA, "no-cache");
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        debug!(url = %target, status, bytes = body.len(), "Fetched");
        Ok(StoredResponse::new(status, headers, body))
    }
}
