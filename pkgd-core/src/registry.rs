//! # Registry
//!
//! [`Registry`] wires the storage layout, version index, ingestion pipeline
//! and bulk loader together and exposes the operations an HTTP front end
//! needs. Everything it owns is constructed in [`Registry::open`]; there is
//! no global state, so independent registries can coexist (tests rely on
//! this).
//!
//! Uploads arrive as bytes. They are written to a staging file under
//! `temp/`, ingested with the identity the client claimed, and the staging
//! file is removed whatever the outcome.

use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::RegistryConfig;
use crate::error::{RegistryError, RegistryResult};
use crate::index::{IndexEntry, PackageRecord, VersionIndex, VersionRecord};
use crate::layout::{StorageLayout, ARCHIVE_EXTENSION};
use crate::loader::{BulkLoader, ReloadReport};
use crate::pipeline::{IngestionPipeline, RegisteredVersion};
use crate::range::{self, VersionConstraint};
use crate::validation::{validate_filename, validate_package_name, validate_version};

/// A stored artifact chosen for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    pub name: String,
    pub version: String,
    pub file_name: String,
    pub path: PathBuf,
}

impl ResolvedArtifact {
    fn from_record(name: &str, version: &str, record: &VersionRecord) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            file_name: StorageLayout::artifact_file_name(name, version),
            path: record.path_to_artifact.clone(),
        }
    }
}

#[derive(Debug)]
pub struct Registry {
    config: Arc<RegistryConfig>,
    layout: StorageLayout,
    index: Arc<VersionIndex>,
    pipeline: IngestionPipeline,
    loader: BulkLoader,
}

impl Registry {
    /// Create the storage directories and an empty index.
    pub async fn open(config: RegistryConfig) -> RegistryResult<Self> {
        let layout = StorageLayout::new(&config.storage_root);
        layout.init().await?;

        let index = Arc::new(VersionIndex::new(config.registry_url()));
        let pipeline = IngestionPipeline::new(layout.clone(), Arc::clone(&index), config.republish);
        let loader = BulkLoader::new(pipeline.clone(), config.reload_concurrency);

        info!(
            root = %layout.root().display(),
            registry_url = %config.registry_url(),
            republish = ?config.republish,
            "Registry opened"
        );

        Ok(Self {
            config: Arc::new(config),
            layout,
            index,
            pipeline,
            loader,
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn index(&self) -> &Arc<VersionIndex> {
        &self.index
    }

    pub fn loader(&self) -> &BulkLoader {
        &self.loader
    }

    /// Rebuild the index from the packages directory.
    pub async fn reload_all(&self) -> RegistryResult<ReloadReport> {
        Ok(self.loader.reload_all().await?)
    }

    /// Publish a raw archive that must contain `name@version`.
    pub async fn publish(&self, name: &str, version: &str, body: Bytes) -> RegistryResult<RegisteredVersion> {
        validate_package_name(name)?;
        validate_version(version)?;
        self.ingest_bytes(&body, Some((name, version))).await
    }

    /// Publish a raw archive, taking its identity from the manifest.
    pub async fn publish_archive(&self, body: Bytes) -> RegistryResult<RegisteredVersion> {
        self.ingest_bytes(&body, None).await
    }

    /// Publish the attachments of an npm publish document.
    ///
    /// Every `*.tgz` entry of `_attachments` is decoded and ingested with
    /// `name` as the expected package. The expected version is the single key
    /// of `versions` when there is exactly one, otherwise it is taken from the
    /// attachment's file name (`<name>-<version>.tgz`).
    pub async fn publish_document(&self, name: &str, document: &Value) -> RegistryResult<Vec<RegisteredVersion>> {
        validate_package_name(name)?;

        let attachments = document
            .get("_attachments")
            .and_then(Value::as_object)
            .ok_or_else(|| {
                RegistryError::InvalidUpload(format!(
                    "Package '{name}': '_attachments' field is not an object"
                ))
            })?;

        let single_version = document
            .get("versions")
            .and_then(Value::as_object)
            .filter(|versions| versions.len() == 1)
            .and_then(|versions| versions.keys().next().cloned());

        let mut published = Vec::new();
        for (file_name, attachment) in attachments {
            if !file_name.ends_with(&format!(".{ARCHIVE_EXTENSION}")) {
                debug!(file = %file_name, "Skipping non-archive attachment");
                continue;
            }

            let version = match &single_version {
                Some(version) => version.clone(),
                None => version_from_file_name(name, file_name).ok_or_else(|| {
                    RegistryError::InvalidUpload(format!(
                        "cannot determine the version of attachment '{file_name}'"
                    ))
                })?,
            };
            validate_version(&version)?;

            let data = attachment
                .get("data")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    RegistryError::InvalidUpload("Attachment 'data' field is not a string".to_string())
                })?;
            let tarball = general_purpose::STANDARD.decode(data)?;
            debug!(file = %file_name, size = tarball.len(), "Decoded attachment");

            published.push(self.ingest_bytes(&tarball, Some((name, &version))).await?);
        }

        if published.is_empty() {
            return Err(RegistryError::InvalidUpload(format!(
                "Package '{name}': no .{ARCHIVE_EXTENSION} attachment found"
            )));
        }
        Ok(published)
    }

    async fn ingest_bytes(
        &self,
        body: &[u8],
        expected: Option<(&str, &str)>,
    ) -> RegistryResult<RegisteredVersion> {
        let staged = self.layout.staging_path();
        if let Err(e) = tokio::fs::write(&staged, body).await {
            remove_staged(&staged).await;
            return Err(e.into());
        }
        debug!(path = %staged.display(), size = body.len(), "Staged upload");

        let outcome = self.pipeline.ingest(&staged, expected).await;
        remove_staged(&staged).await;

        let registered = outcome?;
        info!(
            package = %registered.name,
            version = %registered.version,
            size = body.len(),
            "Package published"
        );
        Ok(registered)
    }

    pub async fn delete(&self, name: &str, version: &str) -> RegistryResult<()> {
        self.index.delete_version(name, version).await
    }

    pub fn versions(&self, name: &str) -> BTreeSet<String> {
        self.index.list_versions(name)
    }

    pub fn package_names(&self) -> BTreeSet<String> {
        self.index.list_package_names()
    }

    pub fn package(&self, name: &str) -> RegistryResult<PackageRecord> {
        self.index
            .package(name)
            .ok_or_else(|| RegistryError::PackageNotFound {
                name: name.to_string(),
            })
    }

    pub fn summary(&self) -> Vec<IndexEntry> {
        self.index.build_index_summary()
    }

    pub fn lookup(&self, name: &str, version: &str) -> RegistryResult<VersionRecord> {
        self.index.lookup_version(name, version)
    }

    /// Pick the best stored version for `constraint` and check its artifact.
    pub fn resolve(&self, name: &str, constraint: &VersionConstraint) -> RegistryResult<ResolvedArtifact> {
        let version = range::resolve(&self.index, name, constraint)?;
        let record = self.index.lookup_version(name, &version)?;
        debug!(package = %name, constraint = %constraint, version = %version, "Resolved version");
        Ok(ResolvedArtifact::from_record(name, &version, &record))
    }

    /// Find the stored artifact of `name` whose file is called `file_name`.
    pub fn lookup_file(&self, name: &str, file_name: &str) -> RegistryResult<ResolvedArtifact> {
        validate_filename(file_name)?;
        let package = self.package(name)?;
        let (version, _) = package
            .versions
            .iter()
            .find(|(_, record)| {
                record
                    .path_to_artifact
                    .file_name()
                    .is_some_and(|f| f == file_name)
            })
            .ok_or_else(|| RegistryError::VersionNotFound {
                name: name.to_string(),
                version: file_name.to_string(),
            })?;
        let record = self.index.lookup_version(name, version)?;
        Ok(ResolvedArtifact::from_record(name, version, &record))
    }

    pub async fn open_artifact(&self, artifact: &ResolvedArtifact) -> RegistryResult<tokio::fs::File> {
        tokio::fs::File::open(&artifact.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RegistryError::ArtifactMissing {
                    name: artifact.name.clone(),
                    version: artifact.version.clone(),
                }
            } else {
                RegistryError::Io(e)
            }
        })
    }
}

async fn remove_staged(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove staged upload");
        }
    }
}

fn version_from_file_name(name: &str, file_name: &str) -> Option<String> {
    file_name
        .strip_prefix(name)?
        .strip_prefix('-')?
        .strip_suffix(&format!(".{ARCHIVE_EXTENSION}"))
        .filter(|v| !v.is_empty())
        .map(String::from)
}
