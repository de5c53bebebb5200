//! # Ingestion Pipeline
//!
//! Turns one archive file into one registered version:
//!
//! 1. extract into a scratch directory
//! 2. read the manifest
//! 3. release the scratch directory
//! 4. check the claimed identity, if any
//! 5. take the key lock of the canonical file, refuse a file already owned by
//!    another identity and apply the republish policy
//! 6. place the artifact at its canonical path
//! 7. stat and digest the placed file
//! 8. register in the [`VersionIndex`]
//!
//! Each step either succeeds or ends the ingestion with an [`IngestionError`]
//! tagged with its stage. Only step 8 touches the index.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::checksum::digest_file;
use crate::config::RepublishPolicy;
use crate::descriptor;
use crate::error::{ChecksumError, IngestionError, ValidationError};
use crate::extract::extract;
use crate::index::{ArtifactStat, VersionIndex, VersionRecord};
use crate::layout::StorageLayout;
use crate::placement::{place, Placement};

/// Outcome of a successful ingestion.
#[derive(Debug, Clone)]
pub struct RegisteredVersion {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
    pub placement: Placement,
    pub record: VersionRecord,
}

#[derive(Debug, Clone)]
pub struct IngestionPipeline {
    layout: StorageLayout,
    index: Arc<VersionIndex>,
    republish: RepublishPolicy,
}

impl IngestionPipeline {
    pub fn new(layout: StorageLayout, index: Arc<VersionIndex>, republish: RepublishPolicy) -> Self {
        Self {
            layout,
            index,
            republish,
        }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn index(&self) -> &Arc<VersionIndex> {
        &self.index
    }

    /// Ingest the archive at `source`.
    ///
    /// When `expected` is given, the manifest must declare exactly that
    /// (name, version), otherwise nothing is placed or registered.
    #[instrument(skip_all, fields(source = %source.display()))]
    pub async fn ingest(
        &self,
        source: &Path,
        expected: Option<(&str, &str)>,
    ) -> Result<RegisteredVersion, IngestionError> {
        let scratch = extract(&self.layout, source)
            .await
            .map_err(|e| IngestionError::new(source, e))?;

        let descriptor = descriptor::read(scratch.path()).await;
        scratch.remove().await;
        let descriptor = descriptor.map_err(|e| IngestionError::new(source, e))?;
        debug!(package = %descriptor.name, version = %descriptor.version, "Manifest read");

        if let Some((name, version)) = expected {
            if descriptor.name != name || descriptor.version != version {
                return Err(IngestionError::new(
                    source,
                    ValidationError::Mismatch {
                        expected_name: name.to_string(),
                        expected_version: version.to_string(),
                        name: descriptor.name.clone(),
                        version: descriptor.version.clone(),
                    },
                ));
            }
        }

        let canonical = self
            .layout
            .canonical_path(&descriptor.name, &descriptor.version);
        let _key = self
            .index
            .lock_key(&descriptor.name, &descriptor.version)
            .await;

        if let Some((owner_name, owner_version)) = self.index.artifact_owner(&canonical) {
            if owner_name != descriptor.name || owner_version != descriptor.version {
                return Err(IngestionError::new(
                    source,
                    ValidationError::ArtifactClaimed {
                        name: descriptor.name.clone(),
                        version: descriptor.version.clone(),
                        file_name: StorageLayout::artifact_file_name(
                            &descriptor.name,
                            &descriptor.version,
                        ),
                        owner_name,
                        owner_version,
                    },
                ));
            }
        }

        if self.republish == RepublishPolicy::Forbid
            && self
                .index
                .contains_version(&descriptor.name, &descriptor.version)
            && !self.is_canonical_file(source, &canonical)
        {
            return Err(IngestionError::new(
                source,
                ValidationError::AlreadyPublished {
                    name: descriptor.name.clone(),
                    version: descriptor.version.clone(),
                },
            ));
        }

        let placement = place(&self.layout, source, &canonical)
            .await
            .map_err(|e| IngestionError::new(source, e))?;

        let metadata = tokio::fs::metadata(&canonical).await.map_err(|e| {
            IngestionError::new(
                source,
                ChecksumError::Stat {
                    path: canonical.clone(),
                    source: e,
                },
            )
        })?;
        let stat = ArtifactStat::from_metadata(&metadata).map_err(|e| {
            IngestionError::new(
                source,
                ChecksumError::Stat {
                    path: canonical.clone(),
                    source: e,
                },
            )
        })?;
        let checksums = digest_file(&canonical)
            .await
            .map_err(|e| IngestionError::new(source, e))?;

        let record = self
            .index
            .register_version(&descriptor, &canonical, stat, checksums);

        Ok(RegisteredVersion {
            name: descriptor.name,
            version: descriptor.version,
            path: canonical,
            placement,
            record,
        })
    }

    fn is_canonical_file(&self, source: &Path, canonical: &Path) -> bool {
        self.layout.is_in_packages_dir(source) && source.file_name() == canonical.file_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{IngestionErrorKind, Stage};
    use crate::testutil::{manifest, write_package_archive};
    use tempfile::TempDir;

    async fn pipeline(republish: RepublishPolicy) -> (TempDir, IngestionPipeline) {
        let temp_dir = TempDir::new().unwrap();
        let layout = StorageLayout::new(temp_dir.path().join("store"));
        layout.init().await.unwrap();
        let index = Arc::new(VersionIndex::new("http://localhost:8080/"));
        (temp_dir, IngestionPipeline::new(layout, index, republish))
    }

    fn temp_entries(pipeline: &IngestionPipeline) -> usize {
        std::fs::read_dir(pipeline.layout().temp_dir()).unwrap().count()
    }

    #[tokio::test]
    async fn test_ingest_staged_upload() {
        let (temp_dir, pipeline) = pipeline(RepublishPolicy::Overwrite).await;
        let staged = temp_dir.path().join("upload.tgz");
        write_package_archive(&staged, &manifest("a", "1.0.0"), &[]);

        let registered = pipeline.ingest(&staged, Some(("a", "1.0.0"))).await.unwrap();
        assert_eq!(registered.placement, Placement::Copied);
        assert_eq!(registered.path, pipeline.layout().canonical_path("a", "1.0.0"));
        assert_eq!(std::fs::read(&registered.path).unwrap(), std::fs::read(&staged).unwrap());
        assert_eq!(
            registered.record.data.dist.tarball,
            "http://localhost:8080/a/-/a-1.0.0.tgz"
        );
        assert!(pipeline.index().contains_version("a", "1.0.0"));
        assert_eq!(temp_entries(&pipeline), 0);
    }

    #[tokio::test]
    async fn test_mismatch_registers_nothing() {
        let (temp_dir, pipeline) = pipeline(RepublishPolicy::Overwrite).await;
        let staged = temp_dir.path().join("upload.tgz");
        write_package_archive(&staged, &manifest("b", "2.0.0"), &[]);

        let err = pipeline.ingest(&staged, Some(("a", "1.0.0"))).await.unwrap_err();
        assert_eq!(err.stage, Stage::Validate);
        assert!(err.is_mismatch());
        assert!(pipeline.index().list_package_names().is_empty());
        assert!(!pipeline.layout().canonical_path("b", "2.0.0").exists());
        assert_eq!(temp_entries(&pipeline), 0);
    }

    #[tokio::test]
    async fn test_corrupt_archive_fails_at_extract() {
        let (temp_dir, pipeline) = pipeline(RepublishPolicy::Overwrite).await;
        let staged = temp_dir.path().join("upload.tgz");
        std::fs::write(&staged, b"definitely not gzip").unwrap();

        let err = pipeline.ingest(&staged, None).await.unwrap_err();
        assert_eq!(err.stage, Stage::Extract);
        assert_eq!(err.artifact, staged);
        assert_eq!(temp_entries(&pipeline), 0);
    }

    #[tokio::test]
    async fn test_missing_manifest_fails_at_manifest() {
        let (temp_dir, pipeline) = pipeline(RepublishPolicy::Overwrite).await;
        let staged = temp_dir.path().join("upload.tgz");

        let file = std::fs::File::create(&staged).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let mut header = tar::Header::new_gnu();
        header.set_size(2);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, "package/index.js", &b"//"[..])
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let err = pipeline.ingest(&staged, None).await.unwrap_err();
        assert_eq!(err.stage, Stage::Manifest);
        assert_eq!(temp_entries(&pipeline), 0);
    }

    #[tokio::test]
    async fn test_forbid_rejects_republish() {
        let (temp_dir, pipeline) = pipeline(RepublishPolicy::Forbid).await;
        let staged = temp_dir.path().join("upload.tgz");
        write_package_archive(&staged, &manifest("a", "1.0.0"), &[]);
        pipeline.ingest(&staged, None).await.unwrap();

        let err = pipeline.ingest(&staged, None).await.unwrap_err();
        assert_eq!(err.stage, Stage::Validate);
        assert!(!err.is_mismatch());

        // Re-ingesting the stored file itself is still allowed
        let canonical = pipeline.layout().canonical_path("a", "1.0.0");
        let registered = pipeline.ingest(&canonical, None).await.unwrap();
        assert_eq!(registered.placement, Placement::AlreadyCanonical);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_version() {
        let (temp_dir, pipeline) = pipeline(RepublishPolicy::Overwrite).await;
        let first = temp_dir.path().join("first.tgz");
        let second = temp_dir.path().join("second.tgz");
        write_package_archive(&first, &manifest("a", "1.0.0"), &[]);
        write_package_archive(&second, &manifest("a", "1.0.0"), &[("extra.js", "// more")]);

        let before = pipeline.ingest(&first, None).await.unwrap();
        let after = pipeline.ingest(&second, None).await.unwrap();
        assert_ne!(before.record.data.dist.shasum, after.record.data.dist.shasum);
        assert_eq!(pipeline.index().list_versions("a").len(), 1);
        assert_eq!(
            std::fs::read(&after.path).unwrap(),
            std::fs::read(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn test_identities_sharing_a_file_name_are_rejected() {
        for policy in [RepublishPolicy::Overwrite, RepublishPolicy::Forbid] {
            let (temp_dir, pipeline) = pipeline(policy).await;
            let first = temp_dir.path().join("first.tgz");
            let second = temp_dir.path().join("second.tgz");
            write_package_archive(&first, &manifest("foo-1.0.0", "2.0.0"), &[]);
            write_package_archive(&second, &manifest("foo", "1.0.0-2.0.0"), &[]);

            let stored = pipeline.ingest(&first, None).await.unwrap();
            assert_eq!(stored.path, pipeline.layout().canonical_path("foo", "1.0.0-2.0.0"));

            let err = pipeline.ingest(&second, None).await.unwrap_err();
            assert_eq!(err.stage, Stage::Validate);
            assert!(matches!(
                err.kind,
                IngestionErrorKind::Validation(ValidationError::ArtifactClaimed { .. })
            ));

            assert!(!pipeline.index().contains_version("foo", "1.0.0-2.0.0"));
            let checksums = digest_file(&stored.path).await.unwrap();
            assert_eq!(checksums.shasum, stored.record.data.dist.shasum);
            assert_eq!(std::fs::read(&stored.path).unwrap(), std::fs::read(&first).unwrap());
        }
    }
}
