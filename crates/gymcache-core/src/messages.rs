//! Wire protocol between page contexts and the worker.
//!
//! Both directions are JSON objects tagged by `type`. Names match what the
//! web app's page scripts already send and listen for.

use serde::{Deserialize, Serialize};
use tracing::debug;

#[cfg(feature = "ts")]
use ts_rs::TS;

/// Request posted by a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
#[serde(tag = "type")]
pub enum ClientRequest {
    #[serde(rename = "CHECK_FOR_UPDATE")]
    CheckForUpdate,
    #[serde(rename = "CHECKVERSION", alias = "checkversion")]
    CheckVersion,
}

impl ClientRequest {
    /// Parse a posted message. Anything that is not a known request is
    /// ignored, as the worker ignores unrelated `postMessage` traffic.
    pub fn from_json(raw: &str) -> Option<Self> {
        match serde_json::from_str(raw) {
            Ok(request) => Some(request),
            Err(e) => {
                debug!(error = %e, "Ignoring unrecognized client message");
                None
            }
        }
    }
}

/// Message broadcast by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
#[serde(tag = "type")]
pub enum WorkerMessage {
    #[serde(rename = "UPDATE_PROGRESS")]
    UpdateProgress {
        progress: u8,
        file: String,
        information: String,
    },
    #[serde(rename = "UPDATE_COMPLETE")]
    UpdateComplete,
    #[serde(rename = "NO_UPDATE")]
    NoUpdate,
    #[serde(rename = "CHECKVERSION_DONE")]
    CheckVersionDone {
        #[serde(rename = "fetchedVer")]
        fetched_ver: Option<String>,
        #[serde(rename = "cachedVer")]
        cached_ver: Option<String>,
    },
    #[serde(rename = "CACHE_HIT")]
    CacheHit { url: String },
    #[serde(rename = "NETWORK_FETCH")]
    NetworkFetch { url: String },
}

impl WorkerMessage {
    pub fn to_json(&self) -> String {
        // Serializing these variants cannot fail: every field is a string,
        // an integer or an option of one.
        serde_json::to_string(self).unwrap_or_default()
    }
}
