use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::{CacheStore, StoredResponse};

/// File extension of store documents
const STORE_EXTENSION: &str = "json";

/// Suffix for documents being written
const TEMP_SUFFIX: &str = ".tmp";

/// Marks a store being built by a refresh: `<cache>.staging-<id>`.
/// Staging stores are never served from.
const STAGING_MARKER: &str = ".staging-";

/// On-disk form of a single store.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct StoreDocument {
    #[serde(default)]
    pub entries: BTreeMap<String, StoredResponse>,
}

struct Inner {
    root: PathBuf,
    // Serializes read-modify-write cycles on store documents.
    lock: Mutex<()>,
}

/// All named stores under one root directory.
/// Clone is cheap - handles share the root and the write lock.
#[derive(Clone)]
pub struct CacheStorage {
    inner: Arc<Inner>,
}

impl CacheStorage {
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create cache root: {}", root.display()))?;
        Ok(Self {
            inner: Arc::new(Inner {
                root,
                lock: Mutex::new(()),
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Name of a staging store for `cache`, unique per `id`.
    pub fn staging_name(cache: &str, id: &str) -> String {
        format!("{}{}{}", cache, STAGING_MARKER, id)
    }

    pub fn is_staging(name: &str) -> bool {
        name.contains(STAGING_MARKER)
    }

    /// Staging stores left behind for `cache`.
    pub async fn staging_keys(&self, cache: &str) -> Result<Vec<String>> {
        let prefix = format!("{}{}", cache, STAGING_MARKER);
        Ok(self
            .keys()
            .await?
            .into_iter()
            .filter(|name| name.starts_with(&prefix))
            .collect())
    }

    /// Store names become file names, so only a conservative charset is allowed.
    fn validate_name(name: &str) -> Result<()> {
        let valid_chars = name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if name.is_empty() || name.starts_with('.') || name.ends_with(TEMP_SUFFIX) || !valid_chars {
            bail!("Invalid cache store name: {:?}", name);
        }
        Ok(())
    }

    fn store_path(&self, name: &str) -> Result<PathBuf> {
        Self::validate_name(name)?;
        Ok(self.inner.root.join(format!("{}.{}", name, STORE_EXTENSION)))
    }

    /// Open a store, creating an empty one if it does not exist yet.
    pub async fn open(&self, name: &str) -> Result<CacheStore> {
        let path = self.store_path(name)?;
        let _guard = self.inner.lock.lock().await;
        if !path_exists(&path).await? {
            debug!(store = name, "Creating cache store");
            self.write_document(name, &StoreDocument::default()).await?;
        }
        Ok(CacheStore::new(name.to_string(), self.clone()))
    }

    pub async fn has(&self, name: &str) -> Result<bool> {
        let path = self.store_path(name)?;
        path_exists(&path).await
    }

    /// Remove a whole store. Returns whether it existed.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        let path = self.store_path(name)?;
        let _guard = self.inner.lock.lock().await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(store = name, "Deleted cache store");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to delete cache store: {}", name)),
        }
    }

    /// Names of every store under the root, sorted.
    pub async fn keys(&self) -> Result<Vec<String>> {
        let mut dir = tokio::fs::read_dir(&self.inner.root)
            .await
            .with_context(|| format!("Failed to list cache root: {}", self.inner.root.display()))?;

        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(STORE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if Self::validate_name(stem).is_ok() {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Look `url` up in every store, in name order, like `caches.match`.
    /// Staging stores are skipped until they are promoted.
    pub async fn match_any(&self, url: &str) -> Result<Option<StoredResponse>> {
        for name in self.keys().await? {
            if Self::is_staging(&name) {
                continue;
            }
            if let Some(doc) = self.read_document(&name).await? {
                if let Some(response) = doc.entries.get(url) {
                    return Ok(Some(response.clone()));
                }
            }
        }
        Ok(None)
    }

    /// Atomically replace store `to` with the contents of store `from`.
    /// `from` no longer exists afterwards.
    pub async fn promote(&self, from: &str, to: &str) -> Result<()> {
        let from_path = self.store_path(from)?;
        let to_path = self.store_path(to)?;
        let _guard = self.inner.lock.lock().await;
        if !path_exists(&from_path).await? {
            bail!("Cannot promote missing cache store: {}", from);
        }
        tokio::fs::rename(&from_path, &to_path)
            .await
            .with_context(|| format!("Failed to promote cache store {} to {}", from, to))?;
        debug!(from, to, "Promoted cache store");
        Ok(())
    }

    pub(crate) async fn lock(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.inner.lock.lock().await
    }

    /// Read a store document. Missing stores read as `None`.
    pub(crate) async fn read_document(&self, name: &str) -> Result<Option<StoreDocument>> {
        let path = self.store_path(name)?;
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read cache store: {}", name))
            }
        };
        let doc = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cache store: {}", name))?;
        Ok(Some(doc))
    }

    /// Write a store document via a temp file so readers never see a partial write.
    /// Callers must hold the storage lock.
    pub(crate) async fn write_document(&self, name: &str, doc: &StoreDocument) -> Result<()> {
        let path = self.store_path(name)?;
        let tmp = self
            .inner
            .root
            .join(format!("{}.{}{}", name, STORE_EXTENSION, TEMP_SUFFIX));
        let contents = serde_json::to_vec(doc)?;
        tokio::fs::write(&tmp, contents)
            .await
            .with_context(|| format!("Failed to write cache store: {}", name))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to commit cache store: {}", name))?;
        Ok(())
    }
}

async fn path_exists(path: &Path) -> Result<bool> {
    tokio::fs::try_exists(path)
        .await
        .with_context(|| format!("Failed to stat {}", path.display()))
}
