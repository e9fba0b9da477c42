//! Worker configuration.
//!
//! Configuration is stored at `~/.config/gymcache/config.json`. Every field
//! is optional; missing fields fall back to the web app's defaults.
//! `GYMCACHE_ORIGIN` and `GYMCACHE_CACHE_ROOT` override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::manifest::{AssetManifest, DEFAULT_ASSETS, DEFAULT_CACHE_NAME, DEFAULT_VERSION_RESOURCE};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "gymcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const ORIGIN_ENV: &str = "GYMCACHE_ORIGIN";
const CACHE_ROOT_ENV: &str = "GYMCACHE_CACHE_ROOT";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Base URL the app is served from.
    pub origin: Option<String>,
    pub cache_name: Option<String>,
    pub version_resource: Option<String>,
    pub assets: Option<Vec<String>>,
    pub request_timeout_secs: Option<u64>,
    pub cache_root: Option<PathBuf>,
}

impl Config {
    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(
            std::env::var(ORIGIN_ENV).ok(),
            std::env::var(CACHE_ROOT_ENV).ok().map(PathBuf::from),
        );
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_overrides(&mut self, origin: Option<String>, cache_root: Option<PathBuf>) {
        if let Some(origin) = origin.filter(|o| !o.trim().is_empty()) {
            self.origin = Some(origin);
        }
        if let Some(root) = cache_root {
            self.cache_root = Some(root);
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_root(&self) -> Result<PathBuf> {
        if let Some(ref root) = self.cache_root {
            return Ok(root.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn origin(&self) -> Result<&str> {
        self.origin
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("No origin configured (set {} or \"origin\" in {})", ORIGIN_ENV, CONFIG_FILE))
    }

    pub fn cache_name(&self) -> &str {
        self.cache_name.as_deref().unwrap_or(DEFAULT_CACHE_NAME)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    pub fn manifest(&self) -> AssetManifest {
        let assets = self
            .assets
            .clone()
            .unwrap_or_else(|| DEFAULT_ASSETS.iter().map(|s| s.to_string()).collect());
        let version_resource = self
            .version_resource
            .clone()
            .unwrap_or_else(|| DEFAULT_VERSION_RESOURCE.to_string());
        AssetManifest::new(assets, version_resource)
    }
}
