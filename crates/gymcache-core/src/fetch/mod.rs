//! Network access for the worker.
//!
//! This module provides the `AssetFetcher` seam used by every hook that
//! touches the network, and `HttpFetcher`, its `reqwest` implementation.
//! Relative asset URLs (`./index.html`) are resolved against the
//! configured origin.

pub mod client;
pub mod error;

pub use client::{AssetFetcher, FetchMode, HttpFetcher};
pub use error::FetchError;
