//! Offline cache and update manager for the PWA gym tracker.
//!
//! The web app's service worker keeps a named cache of static assets,
//! serves requests cache-first, and rebuilds the whole cache when the
//! remote version descriptor changes, reporting progress to open pages.
//! This crate implements that worker:
//!
//! - `cache`: named response stores on disk
//! - `fetch`: network access behind the `AssetFetcher` trait
//! - `version`: descriptor parsing and update detection
//! - `worker`: lifecycle hooks and the refresh orchestrator
//! - `notify` / `messages`: the page-facing message protocol

pub mod cache;
pub mod config;
pub mod fetch;
pub mod manifest;
pub mod messages;
pub mod notify;
pub mod version;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CacheStorage, CacheStore, StoredResponse};
pub use config::Config;
pub use fetch::{AssetFetcher, FetchError, FetchMode, HttpFetcher};
pub use manifest::AssetManifest;
pub use messages::{ClientRequest, WorkerMessage};
pub use notify::{ClientHandle, ClientHub, Notifier};
pub use version::{should_update, VersionDescriptor};
pub use worker::{CacheWorker, UpdateOutcome, VersionCheck, WorkerState};
