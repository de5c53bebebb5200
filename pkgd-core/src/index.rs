//! # Version Index
//!
//! The in-memory map from package name to package metadata and every stored
//! version. It is the single source of truth for queries and is only mutated
//! through [`VersionIndex::register_version`] and
//! [`VersionIndex::delete_version`].
//!
//! ## Consistency
//!
//! - Reads and writes of the map go through one `RwLock` that is never held
//!   across an `.await`.
//! - Writers of a given canonical artifact file are serialized by a keyed
//!   lock table ([`VersionIndex::lock_key`]). The key is the artifact file
//!   name, so two identities that share a file name (`foo-1.0.0@2.0.0` and
//!   `foo@1.0.0-2.0.0`) also share a lock. The ingestion pipeline holds the
//!   key from placement through registration, and deletion holds it across
//!   the unlink, so the registered checksum always describes the bytes at the
//!   canonical path. Different files never contend.
//! - The index is never persisted; [`crate::loader`] rebuilds it from disk.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};

use crate::checksum::Checksums;
use crate::descriptor::PackageDescriptor;
use crate::error::{RegistryError, RegistryResult};
use crate::layout::StorageLayout;

/// Size and modification time of a stored artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactStat {
    pub size: u64,
    pub modified: DateTime<Utc>,
}

impl ArtifactStat {
    pub fn from_metadata(metadata: &std::fs::Metadata) -> std::io::Result<Self> {
        Ok(Self {
            size: metadata.len(),
            modified: DateTime::<Utc>::from(metadata.modified()?),
        })
    }
}

/// Download block synthesized for every registered version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dist {
    pub tarball: String,
    pub shasum: String,
    pub integrity: String,
}

/// The manifest of one version plus its `dist` block, serialized flat.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionData {
    #[serde(flatten)]
    pub manifest: Map<String, Value>,
    pub dist: Dist,
}

impl VersionData {
    pub fn name(&self) -> Option<&str> {
        self.manifest.get("name").and_then(Value::as_str)
    }

    pub fn version(&self) -> Option<&str> {
        self.manifest.get("version").and_then(Value::as_str)
    }

    /// Full JSON document as served to npm clients.
    pub fn to_value(&self) -> Value {
        let mut doc = self.manifest.clone();
        doc.insert(
            "dist".to_string(),
            serde_json::json!({
                "tarball": self.dist.tarball,
                "shasum": self.dist.shasum,
                "integrity": self.dist.integrity,
            }),
        );
        Value::Object(doc)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    pub data: VersionData,
    pub path_to_artifact: PathBuf,
    /// Modification time of the artifact when it was registered
    pub registered_at: DateTime<Utc>,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageRecord {
    pub name: String,
    pub description: Option<String>,
    pub author: Option<Value>,
    pub repository: Option<Value>,
    pub dependencies: BTreeMap<String, String>,
    pub readme: Option<String>,
    pub versions: BTreeMap<String, VersionRecord>,
}

impl PackageRecord {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            author: None,
            repository: None,
            dependencies: BTreeMap::new(),
            readme: None,
            versions: BTreeMap::new(),
        }
    }

    fn refresh_metadata(&mut self, descriptor: &PackageDescriptor) {
        self.name = descriptor.name.clone();
        self.description = descriptor.description.clone();
        self.author = descriptor.author.clone();
        self.repository = descriptor.repository.clone();
        self.dependencies = descriptor.dependencies.clone();
        self.readme = descriptor.readme.clone();
    }
}

/// One row of the index summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexEntry {
    pub name: String,
    pub description: Option<Value>,
    pub author: Option<Value>,
    /// Greatest version string in plain string order
    pub version: String,
    /// All versions, reverse string order
    pub versions: Vec<String>,
}

type KeyLockTable = HashMap<String, Arc<tokio::sync::Mutex<()>>>;

/// Exclusive hold on one canonical artifact file name.
pub struct KeyGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: String,
    table: Arc<Mutex<KeyLockTable>>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        if table
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            table.remove(&self.key);
        }
    }
}

pub struct VersionIndex {
    registry_url: String,
    packages: RwLock<HashMap<String, PackageRecord>>,
    key_locks: Arc<Mutex<KeyLockTable>>,
}

impl VersionIndex {
    /// `registry_url` must end with `/`; see [`crate::config::normalize_url`].
    pub fn new(registry_url: impl Into<String>) -> Self {
        Self {
            registry_url: registry_url.into(),
            packages: RwLock::new(HashMap::new()),
            key_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, PackageRecord>> {
        self.packages.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, PackageRecord>> {
        self.packages.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for exclusive access to the canonical file of (name, version).
    pub async fn lock_key(&self, name: &str, version: &str) -> KeyGuard {
        let key = StorageLayout::artifact_file_name(name, version);
        let lock = {
            let mut table = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
            table.entry(key.clone()).or_default().clone()
        };
        KeyGuard {
            guard: Some(lock.lock_owned().await),
            key,
            table: Arc::clone(&self.key_locks),
        }
    }

    /// Public download URL of a stored artifact.
    pub fn tarball_url(&self, name: &str, file_name: &str) -> String {
        format!("{}{}/-/{}", self.registry_url, name, file_name)
    }

    /// Insert or overwrite a version and refresh the package's metadata.
    pub fn register_version(
        &self,
        descriptor: &PackageDescriptor,
        artifact_path: &Path,
        stat: ArtifactStat,
        checksums: Checksums,
    ) -> VersionRecord {
        let file_name = artifact_path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_default();

        let record = VersionRecord {
            data: VersionData {
                manifest: descriptor.manifest.clone(),
                dist: Dist {
                    tarball: self.tarball_url(&descriptor.name, &file_name),
                    shasum: checksums.shasum,
                    integrity: checksums.integrity,
                },
            },
            path_to_artifact: artifact_path.to_path_buf(),
            registered_at: stat.modified,
            size: stat.size,
        };

        let replaced = {
            let mut packages = self.write();
            let package = packages
                .entry(descriptor.name.clone())
                .or_insert_with(|| PackageRecord::new(&descriptor.name));
            package.refresh_metadata(descriptor);
            package
                .versions
                .insert(descriptor.version.clone(), record.clone())
                .is_some()
        };

        info!(
            package = %descriptor.name,
            version = %descriptor.version,
            replaced,
            "Registered package"
        );
        record
    }

    /// Remove a version and unlink its artifact.
    ///
    /// The map is only touched after the unlink succeeded; a failed unlink
    /// leaves the index unchanged.
    pub async fn delete_version(&self, name: &str, version: &str) -> RegistryResult<()> {
        let _key = self.lock_key(name, version).await;

        let path = {
            let packages = self.read();
            let package = packages
                .get(name)
                .ok_or_else(|| RegistryError::PackageNotFound {
                    name: name.to_string(),
                })?;
            package
                .versions
                .get(version)
                .ok_or_else(|| RegistryError::VersionNotFound {
                    name: name.to_string(),
                    version: version.to_string(),
                })?
                .path_to_artifact
                .clone()
        };

        tokio::fs::remove_file(&path)
            .await
            .map_err(|source| RegistryError::Unlink {
                path: path.clone(),
                source,
            })?;

        let mut packages = self.write();
        if let Some(package) = packages.get_mut(name) {
            package.versions.remove(version);
            if package.versions.is_empty() {
                packages.remove(name);
                debug!(package = %name, "Removed last version, dropping package");
            }
        }
        info!(package = %name, version = %version, "Deleted package version");
        Ok(())
    }

    /// Look up a version whose artifact is still present on disk.
    pub fn lookup_version(&self, name: &str, version: &str) -> RegistryResult<VersionRecord> {
        let packages = self.read();
        let package = packages
            .get(name)
            .ok_or_else(|| RegistryError::PackageNotFound {
                name: name.to_string(),
            })?;
        let record = package
            .versions
            .get(version)
            .ok_or_else(|| RegistryError::VersionNotFound {
                name: name.to_string(),
                version: version.to_string(),
            })?;

        if record.path_to_artifact.as_os_str().is_empty() || !record.path_to_artifact.is_file() {
            return Err(RegistryError::ArtifactMissing {
                name: name.to_string(),
                version: version.to_string(),
            });
        }
        Ok(record.clone())
    }

    /// The (name, version) whose record points at `path`, if any.
    pub fn artifact_owner(&self, path: &Path) -> Option<(String, String)> {
        self.read().values().find_map(|package| {
            package
                .versions
                .iter()
                .find(|(_, record)| record.path_to_artifact == path)
                .map(|(version, _)| (package.name.clone(), version.clone()))
        })
    }

    pub fn contains_version(&self, name: &str, version: &str) -> bool {
        self.read()
            .get(name)
            .is_some_and(|p| p.versions.contains_key(version))
    }

    /// Versions of a package; empty when the package is unknown.
    pub fn list_versions(&self, name: &str) -> BTreeSet<String> {
        self.read()
            .get(name)
            .map(|p| p.versions.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn list_package_names(&self) -> BTreeSet<String> {
        self.read().keys().cloned().collect()
    }

    pub fn package(&self, name: &str) -> Option<PackageRecord> {
        self.read().get(name).cloned()
    }

    pub fn package_count(&self) -> usize {
        self.read().len()
    }

    /// One entry per package, sorted by name.
    ///
    /// `version` is the greatest version in plain string order, so `1.0.2-2`
    /// beats `1.0.2-10` here even though semantic-version precedence (used by
    /// range resolution) says otherwise.
    pub fn build_index_summary(&self) -> Vec<IndexEntry> {
        let packages = self.read();
        let mut summary: Vec<IndexEntry> = packages
            .values()
            .filter_map(|package| {
                let mut versions: Vec<String> = package.versions.keys().cloned().collect();
                versions.sort();
                versions.reverse();
                let latest = versions.first()?.clone();
                let data = &package.versions[&latest].data.manifest;
                Some(IndexEntry {
                    name: package.name.clone(),
                    description: data.get("description").cloned(),
                    author: data.get("author").cloned(),
                    version: latest,
                    versions,
                })
            })
            .collect();
        summary.sort_by(|a, b| a.name.cmp(&b.name));
        summary
    }

    /// Deep copy of the whole index, ordered by name.
    pub fn snapshot(&self) -> BTreeMap<String, PackageRecord> {
        self.read()
            .iter()
            .map(|(name, package)| (name.clone(), package.clone()))
            .collect()
    }
}

impl std::fmt::Debug for VersionIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionIndex")
            .field("registry_url", &self.registry_url)
            .field("packages", &self.package_count())
            .finish()
    }
}
