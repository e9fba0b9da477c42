//! The cache worker and its event hooks.
//!
//! `CacheWorker` owns the cache storage and reacts to the same events a
//! browser service worker does: `install`, `activate`, `fetch` and
//! `message`. Each hook is an async method, so the host may run several
//! of them at once. Concurrent refreshes are not de-duplicated; each one
//! builds its own staging store and the last promotion wins.

pub mod lifecycle;
pub mod refresh;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheStorage, StoredResponse};
use crate::config::Config;
use crate::fetch::{AssetFetcher, FetchMode, HttpFetcher};
use crate::manifest::AssetManifest;
use crate::messages::{ClientRequest, WorkerMessage};
use crate::notify::Notifier;

pub use lifecycle::WorkerState;
pub use refresh::{UpdateOutcome, VersionCheck};

pub struct CacheWorker {
    storage: CacheStorage,
    cache_name: String,
    manifest: AssetManifest,
    fetcher: Arc<dyn AssetFetcher>,
    notifier: Arc<dyn Notifier>,
    state: RwLock<WorkerState>,
}

impl CacheWorker {
    pub fn new(
        storage: CacheStorage,
        cache_name: impl Into<String>,
        manifest: AssetManifest,
        fetcher: Arc<dyn AssetFetcher>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            storage,
            cache_name: cache_name.into(),
            manifest,
            fetcher,
            notifier,
            state: RwLock::new(WorkerState::Installing),
        }
    }

    /// Build a worker talking HTTP to the configured origin.
    pub fn from_config(config: &Config, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let fetcher = HttpFetcher::new(config.origin()?, config.request_timeout())
            .context("Failed to create HTTP fetcher")?;
        let storage = CacheStorage::new(config.cache_root()?)?;
        Ok(Self::new(
            storage,
            config.cache_name(),
            config.manifest(),
            Arc::new(fetcher),
            notifier,
        ))
    }

    pub fn storage(&self) -> &CacheStorage {
        &self.storage
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn manifest(&self) -> &AssetManifest {
        &self.manifest
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    async fn set_state(&self, state: WorkerState) {
        let mut current = self.state.write().await;
        let previous = *current;
        debug!(from = %previous, to = %state, "Worker state change");
        *current = state;
    }

    fn broadcast(&self, message: WorkerMessage) {
        self.notifier.broadcast(message);
    }

    /// Populate the current store with every manifest asset. Any asset
    /// failing makes the install fail and the worker redundant.
    pub async fn install(&self) -> Result<()> {
        info!(cache = %self.cache_name, "Install event triggered");
        self.set_state(WorkerState::Installing).await;

        let result = async {
            let store = self.storage.open(&self.cache_name).await?;
            debug!("Opened cache");
            store
                .add_all(self.fetcher.as_ref(), self.manifest.assets())
                .await
        }
        .await;

        match result {
            Ok(()) => {
                // Skip waiting: eligible to activate immediately
                self.set_state(WorkerState::Waiting).await;
                info!(assets = self.manifest.assets().len(), "Install complete");
                Ok(())
            }
            Err(e) => {
                self.set_state(WorkerState::Redundant).await;
                error!(error = %e, "Install failed");
                Err(e.context("Install failed"))
            }
        }
    }

    /// Delete every store except the current one, then take control of
    /// clients. Returns the names of the deleted stores.
    pub async fn activate(&self) -> Result<Vec<String>> {
        let state = self.state().await;
        if !state.can_activate() {
            bail!("Cannot activate a worker that is {}", state);
        }
        info!("Activate event triggered");

        let stale: Vec<String> = self
            .storage
            .keys()
            .await?
            .into_iter()
            .filter(|name| name != &self.cache_name)
            .collect();

        let results = join_all(stale.iter().map(|name| self.storage.delete(name))).await;
        let mut deleted = Vec::new();
        for (name, result) in stale.into_iter().zip(results) {
            if result.with_context(|| format!("Failed to prune cache store {}", name))? {
                deleted.push(name);
            }
        }

        self.set_state(WorkerState::Active).await;
        info!(pruned = ?deleted, "Worker active, clients claimed");
        Ok(deleted)
    }

    /// Pick up after a restart: a worker whose current store already exists
    /// was activated before and stays active.
    pub async fn resume(&self) -> Result<WorkerState> {
        // Staging stores from refreshes interrupted by the restart
        for name in self.storage.staging_keys(&self.cache_name).await? {
            info!(store = %name, "Removing leftover staging store");
            self.storage.delete(&name).await?;
        }
        if self.storage.has(&self.cache_name).await? {
            self.set_state(WorkerState::Active).await;
        }
        Ok(self.state().await)
    }

    /// Cache-first response for `url`. Hits report `CACHE_HIT`; misses go to
    /// the network, report `NETWORK_FETCH` and are not cached. A worker that
    /// does not control clients passes requests straight through.
    pub async fn handle_fetch(&self, url: &str) -> Result<StoredResponse> {
        if !self.state().await.controls_clients() {
            debug!(url, "Worker not active, passing fetch through");
            return Ok(self.fetcher.fetch(url, FetchMode::Default).await?);
        }
        debug!(url, "Fetch event");

        match self.storage.match_any(url).await {
            Ok(Some(response)) => {
                self.broadcast(WorkerMessage::CacheHit {
                    url: url.to_string(),
                });
                return Ok(response);
            }
            Ok(None) => {}
            Err(e) => warn!(url, error = %e, "Cache lookup failed, using network"),
        }

        let response = self.fetcher.fetch(url, FetchMode::Default).await?;
        self.broadcast(WorkerMessage::NetworkFetch {
            url: url.to_string(),
        });
        Ok(response)
    }

    /// Run a client request to completion. Failures are logged, never sent
    /// to clients: the protocol has no error message.
    pub async fn handle_message(&self, request: ClientRequest) {
        debug!(?request, "Message event");
        match request {
            ClientRequest::CheckForUpdate => {
                if let Err(e) = self.check_for_update().await {
                    error!(error = %e, "Update failed");
                }
            }
            ClientRequest::CheckVersion => {
                if let Err(e) = self.check_version().await {
                    error!(error = %e, "CHECKVERSION failed");
                }
            }
        }
    }

    /// Parse and run a posted JSON message. Unknown messages are ignored.
    pub async fn handle_raw_message(&self, raw: &str) {
        if let Some(request) = ClientRequest::from_json(raw) {
            self.handle_message(request).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingNotifier, ScriptedFetcher};
    use tempfile::TempDir;

    pub(crate) const CACHE: &str = "gym-cache-v1";
    pub(crate) const VERSION_URL: &str = "./updated-version.csv";

    pub(crate) fn manifest() -> AssetManifest {
        AssetManifest::new(
            vec!["./index.html".to_string(), "./js/app.js".to_string(), "./manifest.json".to_string()],
            VERSION_URL.to_string(),
        )
    }

    pub(crate) fn site() -> ScriptedFetcher {
        ScriptedFetcher::new()
            .with_text("./index.html", "<html></html>")
            .with_text("./js/app.js", "console.log('app')")
            .with_text("./manifest.json", "{}")
    }

    pub(crate) struct Harness {
        pub _dir: TempDir,
        pub fetcher: Arc<ScriptedFetcher>,
        pub notifier: Arc<RecordingNotifier>,
        pub worker: CacheWorker,
    }

    pub(crate) fn harness(fetcher: ScriptedFetcher) -> Harness {
        let dir = TempDir::new().unwrap();
        let storage = CacheStorage::new(dir.path().to_path_buf()).unwrap();
        let fetcher = Arc::new(fetcher);
        let notifier = Arc::new(RecordingNotifier::new());
        let worker = CacheWorker::new(
            storage,
            CACHE,
            manifest(),
            fetcher.clone(),
            notifier.clone(),
        );
        Harness {
            _dir: dir,
            fetcher,
            notifier,
            worker,
        }
    }

    #[tokio::test]
    async fn test_install_populates_store_and_waits() {
        let h = harness(site());
        h.worker.install().await.unwrap();

        assert_eq!(h.worker.state().await, WorkerState::Waiting);
        let store = h.worker.storage().open(CACHE).await.unwrap();
        assert_eq!(
            store.keys().await.unwrap(),
            vec!["./index.html", "./js/app.js", "./manifest.json"]
        );
        // The version resource is only cached by a refresh
        assert!(store.match_url(VERSION_URL).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_install_failure_makes_worker_redundant() {
        let h = harness(site().with_status("./js/app.js", 500));
        assert!(h.worker.install().await.is_err());
        assert_eq!(h.worker.state().await, WorkerState::Redundant);
        assert!(h.worker.activate().await.is_err());

        let store = h.worker.storage().open(CACHE).await.unwrap();
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_activate_prunes_only_other_stores() {
        let h = harness(site());
        h.worker.storage().open("gym-cache-v0").await.unwrap();
        h.worker.install().await.unwrap();

        let deleted = h.worker.activate().await.unwrap();

        assert_eq!(deleted, vec!["gym-cache-v0"]);
        assert_eq!(h.worker.storage().keys().await.unwrap(), vec![CACHE]);
        assert_eq!(h.worker.state().await, WorkerState::Active);
    }

    #[tokio::test]
    async fn test_activate_requires_waiting() {
        let h = harness(site());
        assert!(h.worker.activate().await.is_err());

        h.worker.install().await.unwrap();
        h.worker.activate().await.unwrap();
        assert!(h.worker.activate().await.is_err());
    }

    #[tokio::test]
    async fn test_resume_after_restart() {
        let h = harness(site());
        assert_eq!(h.worker.resume().await.unwrap(), WorkerState::Installing);

        h.worker.storage().open(CACHE).await.unwrap();
        assert_eq!(h.worker.resume().await.unwrap(), WorkerState::Active);
    }

    #[tokio::test]
    async fn test_resume_removes_leftover_staging_stores() {
        let h = harness(site());
        let storage = h.worker.storage();
        storage.open(CACHE).await.unwrap();
        storage.open(&CacheStorage::staging_name(CACHE, "12-0")).await.unwrap();
        storage.open(&CacheStorage::staging_name("other-cache", "12-0")).await.unwrap();

        h.worker.resume().await.unwrap();
        assert_eq!(
            storage.keys().await.unwrap(),
            vec![CACHE.to_string(), "other-cache.staging-12-0".to_string()]
        );
    }

    #[tokio::test]
    async fn test_fetch_serves_cache_first() {
        let h = harness(site().with_text("./images/chart.png", "png"));
        h.worker.install().await.unwrap();
        h.worker.activate().await.unwrap();
        let before = h.fetcher.request_count();

        let hit = h.worker.handle_fetch("./index.html").await.unwrap();
        assert_eq!(hit.text(), "<html></html>");
        assert_eq!(h.fetcher.request_count(), before);

        let miss = h.worker.handle_fetch("./images/chart.png").await.unwrap();
        assert_eq!(miss.text(), "png");
        assert_eq!(h.fetcher.request_count(), before + 1);

        assert_eq!(
            h.notifier.messages(),
            vec![
                WorkerMessage::CacheHit { url: "./index.html".to_string() },
                WorkerMessage::NetworkFetch { url: "./images/chart.png".to_string() },
            ]
        );
        // Network responses are not cached by the fetch hook
        let store = h.worker.storage().open(CACHE).await.unwrap();
        assert!(store.match_url("./images/chart.png").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_miss_returns_error_status_as_is() {
        let h = harness(site().with_status("./missing.js", 404));
        h.worker.install().await.unwrap();
        h.worker.activate().await.unwrap();

        let response = h.worker.handle_fetch("./missing.js").await.unwrap();
        assert_eq!(response.status, 404);
        assert!(h.worker.handle_fetch("./offline.js").await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_before_activation_passes_through_silently() {
        let h = harness(site());
        h.worker.install().await.unwrap();

        let response = h.worker.handle_fetch("./index.html").await.unwrap();
        assert_eq!(response.text(), "<html></html>");
        assert!(h.notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_raw_message_ignored() {
        let h = harness(site());
        h.worker.handle_raw_message(r#"{"type":"SKIP_WAITING"}"#).await;
        h.worker.handle_raw_message("not json").await;
        assert!(h.notifier.messages().is_empty());
        assert_eq!(h.fetcher.request_count(), 0);
    }
}
