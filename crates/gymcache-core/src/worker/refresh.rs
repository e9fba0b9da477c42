//! Version check and full cache refresh.
//!
//! A refresh never edits the current store in place. Files are fetched
//! into a staging store which is then promoted over the current one, so
//! an interrupted refresh leaves the previous cache intact. Every refresh
//! builds in its own staging store, so concurrent refreshes never write
//! into each other's files.

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cache::{CacheStorage, StoredResponse};
use crate::messages::WorkerMessage;
use crate::version::{cached_version, fetch_latest_version, should_update, VersionDescriptor};

use super::CacheWorker;

/// Refreshes started by this process.
static REFRESH_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Content type the version descriptor is persisted with.
const VERSION_CONTENT_TYPE: &str = "text/csv";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The cache was rebuilt for `version`. `failed` lists files that could
    /// not be fetched and are missing from the new cache.
    Updated {
        version: String,
        cached: usize,
        failed: Vec<String>,
    },
    /// Nothing fetched, or nothing changed.
    NoUpdate,
}

/// Result of a read-only version check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionCheck {
    pub fetched: Option<String>,
    pub cached: Option<String>,
}

impl VersionCheck {
    pub fn update_available(&self) -> bool {
        should_update(self.cached.as_deref(), self.fetched.as_deref())
    }
}

/// Integer percentage after finishing file `index` of `total`.
fn progress_percent(index: usize, total: usize) -> u8 {
    ((index + 1) * 100 / total.max(1)).min(100) as u8
}

impl CacheWorker {
    /// A staging store name no other refresh, in this or another process,
    /// is using.
    fn staging_name(&self) -> String {
        let n = REFRESH_COUNTER.fetch_add(1, Ordering::Relaxed);
        let id = format!("{}-{}", std::process::id(), n);
        CacheStorage::staging_name(&self.cache_name, &id)
    }

    /// Cached version, treating an unreadable cache as no cache.
    async fn cached_version_or_none(&self) -> Option<String> {
        match cached_version(&self.storage, self.manifest.version_resource()).await {
            Ok(version) => version,
            Err(e) => {
                warn!(error = %e, "Failed to read cached version descriptor");
                None
            }
        }
    }

    /// Compare the remote version with the cached one and rebuild the cache
    /// when they differ. Clients get `UPDATE_PROGRESS` per file then
    /// `UPDATE_COMPLETE`, or a single `NO_UPDATE`.
    pub async fn check_for_update(&self) -> Result<UpdateOutcome> {
        info!("Starting update process");

        let Some(latest) =
            fetch_latest_version(self.fetcher.as_ref(), self.manifest.version_resource()).await
        else {
            info!("No valid fetched version");
            self.broadcast(WorkerMessage::NoUpdate);
            return Ok(UpdateOutcome::NoUpdate);
        };

        let cached = self.cached_version_or_none().await;
        if !should_update(cached.as_deref(), Some(&latest.version)) {
            info!(version = %latest.version, "No new version detected");
            self.broadcast(WorkerMessage::NoUpdate);
            return Ok(UpdateOutcome::NoUpdate);
        }

        info!(version = %latest.version, cached = ?cached, "New version detected");
        self.refresh(&latest).await
    }

    async fn refresh(&self, latest: &VersionDescriptor) -> Result<UpdateOutcome> {
        let staging = self.staging_name();
        let result = self.build_and_promote(&staging, latest).await;
        if result.is_err() {
            if let Err(e) = self.storage.delete(&staging).await {
                warn!(store = %staging, error = %e, "Failed to remove staging store");
            }
        }
        result
    }

    async fn build_and_promote(
        &self,
        staging: &str,
        latest: &VersionDescriptor,
    ) -> Result<UpdateOutcome> {
        debug!(store = %staging, "Building cache in staging store");
        let store = self.storage.open(staging).await?;

        let files = self.manifest.refresh_files();
        let mut failed = Vec::new();
        for (index, file) in files.iter().enumerate() {
            if let Err(e) = store.add(self.fetcher.as_ref(), file).await {
                warn!(file = %file, error = %e, "Failed to cache file");
                failed.push(file.clone());
            }
            self.broadcast(WorkerMessage::UpdateProgress {
                progress: progress_percent(index, files.len()),
                file: file.clone(),
                information: latest.note.clone(),
            });
        }

        // The fetched text is authoritative even if its own fetch above failed
        store
            .put(
                self.manifest.version_resource(),
                StoredResponse::from_text(&latest.raw_text, VERSION_CONTENT_TYPE),
            )
            .await?;

        self.storage.promote(staging, &self.cache_name).await?;
        info!(version = %latest.version, failed = failed.len(), "Cache updated with new version");
        self.broadcast(WorkerMessage::UpdateComplete);

        Ok(UpdateOutcome::Updated {
            version: latest.version.clone(),
            cached: files.len() - failed.len(),
            failed,
        })
    }

    /// Read-only check: report fetched and cached versions in
    /// `CHECKVERSION_DONE` without touching the cache.
    pub async fn check_version(&self) -> Result<VersionCheck> {
        info!("CHECKVERSION event triggered");

        let fetched = fetch_latest_version(self.fetcher.as_ref(), self.manifest.version_resource())
            .await
            .map(|d| d.version);
        let cached = cached_version(&self.storage, self.manifest.version_resource()).await?;

        self.broadcast(WorkerMessage::CheckVersionDone {
            fetched_ver: fetched.clone(),
            cached_ver: cached.clone(),
        });
        Ok(VersionCheck { fetched, cached })
    }
}
