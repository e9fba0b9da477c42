use anyhow::{anyhow, Context, Result};
use futures::future::try_join_all;
use tracing::debug;

use crate::fetch::{AssetFetcher, FetchError, FetchMode};

use super::{CacheStorage, StoredResponse};

/// Handle to one named store. Every call goes to disk, so handles never
/// go stale. A deleted store reads as empty and rejects writes.
#[derive(Clone)]
pub struct CacheStore {
    name: String,
    storage: CacheStorage,
}

impl CacheStore {
    pub(crate) fn new(name: String, storage: CacheStorage) -> Self {
        Self { name, storage }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Exact-URL lookup.
    pub async fn match_url(&self, url: &str) -> Result<Option<StoredResponse>> {
        let doc = self.storage.read_document(&self.name).await?;
        Ok(doc.and_then(|mut d| d.entries.remove(url)))
    }

    /// Insert or overwrite a single entry.
    pub async fn put(&self, url: &str, response: StoredResponse) -> Result<()> {
        self.put_many(vec![(url.to_string(), response)]).await
    }

    /// Writes into a store that was deleted after it was opened fail,
    /// so a half-built store is never silently recreated.
    async fn put_many(&self, entries: Vec<(String, StoredResponse)>) -> Result<()> {
        let _guard = self.storage.lock().await;
        let mut doc = self
            .storage
            .read_document(&self.name)
            .await?
            .ok_or_else(|| anyhow!("Cache store was deleted: {}", self.name))?;
        for (url, response) in entries {
            doc.entries.insert(url, response);
        }
        self.storage.write_document(&self.name, &doc).await
    }

    /// Remove one entry. Returns whether it existed.
    pub async fn delete(&self, url: &str) -> Result<bool> {
        let _guard = self.storage.lock().await;
        let Some(mut doc) = self.storage.read_document(&self.name).await? else {
            return Ok(false);
        };
        let removed = doc.entries.remove(url).is_some();
        if removed {
            self.storage.write_document(&self.name, &doc).await?;
        }
        Ok(removed)
    }

    /// Request URLs held by this store, sorted.
    pub async fn keys(&self) -> Result<Vec<String>> {
        let doc = self.storage.read_document(&self.name).await?;
        Ok(doc.map(|d| d.entries.into_keys().collect()).unwrap_or_default())
    }

    /// Fetch `url` and store the response. A non-success status is an error
    /// and leaves the store untouched.
    pub async fn add(&self, fetcher: &dyn AssetFetcher, url: &str) -> Result<()> {
        let response = fetch_ok(fetcher, url).await?;
        self.put(url, response).await
    }

    /// Fetch every URL, then store them all. Nothing is written unless every
    /// fetch succeeded.
    pub async fn add_all(&self, fetcher: &dyn AssetFetcher, urls: &[String]) -> Result<()> {
        let responses = try_join_all(urls.iter().map(|url| async move {
            fetch_ok(fetcher, url)
                .await
                .map(|response| (url.clone(), response))
        }))
        .await?;
        debug!(store = %self.name, count = responses.len(), "Storing fetched assets");
        self.put_many(responses).await
    }
}

async fn fetch_ok(fetcher: &dyn AssetFetcher, url: &str) -> Result<StoredResponse> {
    let response = fetcher
        .fetch(url, FetchMode::Default)
        .await
        .with_context(|| format!("Failed to fetch {}", url))?;
    if !response.is_success() {
        return Err(FetchError::from_status(response.status, url, &response.text()).into());
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedFetcher;
    use tempfile::TempDir;

    fn setup() -> (TempDir, CacheStorage) {
        let dir = TempDir::new().unwrap();
        let storage = CacheStorage::new(dir.path().to_path_buf()).unwrap();
        (dir, storage)
    }

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_put_overwrites_and_delete_removes() {
        let (_dir, storage) = setup();
        let store = storage.open("v1").await.unwrap();

        store.put("./a.js", StoredResponse::from_text("1", "text/javascript")).await.unwrap();
        store.put("./a.js", StoredResponse::from_text("2", "text/javascript")).await.unwrap();
        store.put("./b.js", StoredResponse::from_text("3", "text/javascript")).await.unwrap();

        assert_eq!(store.match_url("./a.js").await.unwrap().unwrap().text(), "2");
        assert_eq!(store.keys().await.unwrap(), vec!["./a.js", "./b.js"]);

        assert!(store.delete("./a.js").await.unwrap());
        assert!(!store.delete("./a.js").await.unwrap());
        assert_eq!(store.keys().await.unwrap(), vec!["./b.js"]);
    }

    #[tokio::test]
    async fn test_match_is_exact() {
        let (_dir, storage) = setup();
        let store = storage.open("v1").await.unwrap();
        store.put("./index.html", StoredResponse::from_text("x", "text/html")).await.unwrap();

        assert!(store.match_url("index.html").await.unwrap().is_none());
        assert!(store.match_url("./index.html?x=1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_rejects_error_status() {
        let (_dir, storage) = setup();
        let store = storage.open("v1").await.unwrap();
        let fetcher = ScriptedFetcher::new()
            .with_text("./ok.css", "body{}")
            .with_status("./gone.css", 404);

        store.add(&fetcher, "./ok.css").await.unwrap();
        assert!(store.add(&fetcher, "./gone.css").await.is_err());
        assert!(store.add(&fetcher, "./unknown.css").await.is_err());
        assert_eq!(store.keys().await.unwrap(), vec!["./ok.css"]);
    }

    #[tokio::test]
    async fn test_add_all_is_all_or_nothing() {
        let (_dir, storage) = setup();
        let store = storage.open("v1").await.unwrap();
        let fetcher = ScriptedFetcher::new()
            .with_text("./a.js", "a")
            .with_text("./b.js", "b");

        assert!(store.add_all(&fetcher, &urls(&["./a.js", "./missing.js"])).await.is_err());
        assert!(store.keys().await.unwrap().is_empty());

        store.add_all(&fetcher, &urls(&["./a.js", "./b.js"])).await.unwrap();
        assert_eq!(store.keys().await.unwrap(), vec!["./a.js", "./b.js"]);
    }

    #[tokio::test]
    async fn test_deleted_store_reads_empty_and_rejects_writes() {
        let (_dir, storage) = setup();
        let store = storage.open("v1").await.unwrap();
        store.put("./a.js", StoredResponse::from_text("a", "text/javascript")).await.unwrap();
        storage.delete("v1").await.unwrap();

        assert!(store.match_url("./a.js").await.unwrap().is_none());
        assert!(store.keys().await.unwrap().is_empty());

        assert!(store.put("./b.js", StoredResponse::from_text("b", "text/javascript")).await.is_err());
        assert!(!storage.has("v1").await.unwrap());
    }
}
