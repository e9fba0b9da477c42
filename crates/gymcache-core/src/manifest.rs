//! The fixed set of assets the app needs offline.

/// Store name of the current cache epoch.
pub const DEFAULT_CACHE_NAME: &str = "pwa-gym-tracker-cache-v1";

/// Version descriptor resource, fetched on every update check.
pub const DEFAULT_VERSION_RESOURCE: &str = "./updated-version.csv";

/// Assets cached at install time, in install order.
pub const DEFAULT_ASSETS: &[&str] = &[
    "./index.html",
    "./app/Views/homepage.html",
    "./app/Views/update-progress.html",
    "./app/Views/css/colors.css",
    "./app/Views/css/style.css",
    "./js/app.js",
    "./js/js-main.js",
    "./js/read-write-data.js",
    "./js/firebase-config.js",
    "./js/firebase-connect.js",
    "./images/icon-192x192.png",
    "./images/icon-512x512.png",
    "./manifest.json",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetManifest {
    assets: Vec<String>,
    version_resource: String,
}

impl AssetManifest {
    pub fn new(assets: Vec<String>, version_resource: String) -> Self {
        Self {
            assets,
            version_resource,
        }
    }

    /// Assets cached at install time.
    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn version_resource(&self) -> &str {
        &self.version_resource
    }

    /// Files fetched during a refresh: the assets followed by the version
    /// resource (unless it is already listed).
    pub fn refresh_files(&self) -> Vec<String> {
        let mut files = self.assets.clone();
        if !files.iter().any(|f| f == &self.version_resource) {
            files.push(self.version_resource.clone());
        }
        files
    }
}

impl Default for AssetManifest {
    fn default() -> Self {
        Self::new(
            DEFAULT_ASSETS.iter().map(|s| s.to_string()).collect(),
            DEFAULT_VERSION_RESOURCE.to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let manifest = AssetManifest::default();
        assert_eq!(manifest.assets().len(), 13);
        assert_eq!(manifest.assets()[0], "./index.html");
        assert_eq!(manifest.version_resource(), "./updated-version.csv");
    }

    #[test]
    fn test_refresh_files_appends_version_resource() {
        let manifest = AssetManifest::default();
        let files = manifest.refresh_files();
        assert_eq!(files.len(), 14);
        assert_eq!(files.last().map(String::as_str), Some("./updated-version.csv"));
    }

    #[test]
    fn test_refresh_files_does_not_duplicate() {
        let manifest = AssetManifest::new(
            vec!["./a.js".to_string(), "./v.csv".to_string()],
            "./v.csv".to_string(),
        );
        assert_eq!(manifest.refresh_files(), vec!["./a.js", "./v.csv"]);
    }
}
