//! # Registry Configuration
//!
//! Runtime settings for the engine. Configuration is plain JSON and every field
//! has a default, so a partial file (or no file at all) is valid:
//!
//! ```json
//! {
//!   "storage_root": "/var/lib/pkgd",
//!   "registry_url": "http://registry.internal:8080",
//!   "reload_concurrency": 25,
//!   "republish": "forbid"
//! }
//! ```
//!
//! ```rust,no_run
//! # use pkgd_core::config::RegistryConfig;
//! let config = RegistryConfig::load_or_default("pkgd.json")?;
//! assert!(config.registry_url().ends_with('/'));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Concurrent ingestions during a bulk reload.
pub const DEFAULT_RELOAD_CONCURRENCY: usize = 25;

/// Default ceiling for a single uploaded archive (100 MiB).
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 100 * 1024 * 1024;

/// What happens when an already-published (name, version) is uploaded again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepublishPolicy {
    /// The new artifact replaces the old one (last write wins).
    #[default]
    Overwrite,
    /// Published versions are immutable; re-uploads are rejected.
    Forbid,
}

impl std::str::FromStr for RepublishPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "overwrite" => Ok(RepublishPolicy::Overwrite),
            "forbid" => Ok(RepublishPolicy::Forbid),
            other => Err(format!(
                "unknown republish policy '{other}' (expected 'overwrite' or 'forbid')"
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Root directory holding `packages/` and `temp/`
    pub storage_root: PathBuf,
    /// Public base URL used to build `dist.tarball` links
    registry_url: String,
    /// Upper bound on simultaneous ingestions during a bulk reload
    pub reload_concurrency: usize,
    pub republish: RepublishPolicy,
    /// Largest accepted upload, in bytes
    pub max_upload_size: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("data"),
            registry_url: "http://localhost:8080/".to_string(),
            reload_concurrency: DEFAULT_RELOAD_CONCURRENCY,
            republish: RepublishPolicy::default(),
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
        }
    }
}

impl RegistryConfig {
    pub fn new(storage_root: impl Into<PathBuf>, registry_url: &str) -> Self {
        Self {
            storage_root: storage_root.into(),
            registry_url: normalize_url(registry_url),
            ..Self::default()
        }
    }

    /// Load configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: RegistryConfig =
            serde_json::from_str(&config_str).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.registry_url = normalize_url(&config.registry_url);
        config.reload_concurrency = config.reload_concurrency.max(1);
        Ok(config)
    }

    /// Load configuration from a JSON file, falling back to defaults when it does not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Base URL of the registry, always ending with `/`.
    pub fn registry_url(&self) -> &str {
        &self.registry_url
    }

    pub fn set_registry_url(&mut self, url: &str) {
        self.registry_url = normalize_url(url);
    }

    pub fn with_republish(mut self, policy: RepublishPolicy) -> Self {
        self.republish = policy;
        self
    }

    pub fn with_reload_concurrency(mut self, limit: usize) -> Self {
        self.reload_concurrency = limit.max(1);
        self
    }
}

/// Make sure a base URL ends with a path separator.
pub fn normalize_url(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("http://localhost:8080"), "http://localhost:8080/");
        assert_eq!(normalize_url("http://localhost:8080/"), "http://localhost:8080/");
        assert_eq!(
            normalize_url("https://example.com/registry"),
            "https://example.com/registry/"
        );
    }

    #[test]
    fn test_defaults() {
        let config = RegistryConfig::default();
        assert_eq!(config.reload_concurrency, 25);
        assert_eq!(config.republish, RepublishPolicy::Overwrite);
        assert_eq!(config.registry_url(), "http://localhost:8080/");
    }

    #[test]
    fn test_load_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("pkgd.json");
        fs::write(
            &path,
            r#"{"registry_url": "http://example.com:9000", "republish": "forbid", "reload_concurrency": 0}"#,
        )
        .unwrap();

        let config = RegistryConfig::load(&path).unwrap();
        assert_eq!(config.registry_url(), "http://example.com:9000/");
        assert_eq!(config.republish, RepublishPolicy::Forbid);
        assert_eq!(config.reload_concurrency, 1);
        assert_eq!(config.storage_root, PathBuf::from("data"));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = RegistryConfig::load_or_default(temp_dir.path().join("absent.json")).unwrap();
        assert_eq!(config.reload_concurrency, DEFAULT_RELOAD_CONCURRENCY);
    }

    #[test]
    fn test_load_malformed_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("pkgd.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            RegistryConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_republish_from_str() {
        assert_eq!(
            "Forbid".parse::<RepublishPolicy>().unwrap(),
            RepublishPolicy::Forbid
        );
        assert!("sometimes".parse::<RepublishPolicy>().is_err());
    }
}
