//! Persistent response cache for offline access.
//!
//! This module provides `CacheStorage`, the set of named stores under one
//! root directory, and `CacheStore`, a single URL-to-response mapping.
//! Each store is one JSON document; response bodies are base64 encoded.
//!
//! Exactly one store name is current at a time; the worker prunes the
//! others when it activates.

pub mod response;
pub mod storage;
pub mod store;

pub use response::StoredResponse;
pub use storage::CacheStorage;
pub use store::CacheStore;
