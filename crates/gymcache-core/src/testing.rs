//! Fakes shared by unit tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::cache::StoredResponse;
use crate::fetch::{AssetFetcher, FetchError, FetchMode};
use crate::messages::WorkerMessage;
use crate::notify::Notifier;

enum Scripted {
    Respond(StoredResponse),
    Fail(String),
}

/// Fetcher answering from a table. Unknown URLs fail like an unreachable host.
#[derive(Default)]
pub(crate) struct ScriptedFetcher {
    routes: Mutex<HashMap<String, Scripted>>,
    requests: Mutex<Vec<(String, FetchMode)>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(self, url: &str, text: &str) -> Self {
        self.set_text(url, text);
        self
    }

    pub fn with_status(self, url: &str, status: u16) -> Self {
        let response = StoredResponse::new(status, BTreeMap::new(), b"error page".to_vec());
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Scripted::Respond(response));
        self
    }

    pub fn with_failure(self, url: &str) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Scripted::Fail("connection reset".to_string()));
        self
    }

    pub fn set_text(&self, url: &str, text: &str) {
        self.routes.lock().unwrap().insert(
            url.to_string(),
            Scripted::Respond(StoredResponse::from_text(text, "text/plain")),
        );
    }

    pub fn requests(&self) -> Vec<(String, FetchMode)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl AssetFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str, mode: FetchMode) -> Result<StoredResponse, FetchError> {
        self.requests.lock().unwrap().push((url.to_string(), mode));
        match self.routes.lock().unwrap().get(url) {
            Some(Scripted::Respond(response)) => {
                let mut response = response.clone();
                response.cached_at = chrono::Utc::now();
                Ok(response)
            }
            Some(Scripted::Fail(reason)) => Err(FetchError::Transport(reason.clone())),
            None => Err(FetchError::Transport(format!("no route to {}", url))),
        }
    }
}

/// Notifier that keeps every message in order.
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    messages: Mutex<Vec<WorkerMessage>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<WorkerMessage> {
        self.messages.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.messages.lock().unwrap().clear();
    }
}

impl Notifier for RecordingNotifier {
    fn broadcast(&self, message: WorkerMessage) {
        self.messages.lock().unwrap().push(message);
    }
}
