//! # Error Types
//!
//! Errors are split along the two paths through the engine:
//!
//! - **Ingestion** ([`IngestionError`]): every failure of the
//!   extract → manifest → validate → place → checksum sequence carries the
//!   [`Stage`] it happened in plus the artifact that was being ingested. An
//!   ingestion error never leaves a trace in the version index.
//! - **Read / delete** ([`RegistryError`]): lookups of unknown packages or
//!   versions, unsatisfiable ranges, and failures of the surrounding glue
//!   (staging uploads, decoding npm publish documents).
//!
//! Nothing in this crate retries; callers decide.

use serde::Serialize;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use crate::validation::InvalidInput;

/// The pipeline stage an ingestion failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extract,
    Manifest,
    Validate,
    Place,
    Checksum,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::Manifest => "manifest",
            Stage::Validate => "validate",
            Stage::Place => "place",
            Stage::Checksum => "checksum",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decompression or unpacking failed.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("failed to create scratch directory {}: {source}", .path.display())]
    Scratch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to open archive {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt or truncated archive {}: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("extraction of {} was interrupted: {reason}", .path.display())]
    Interrupted { path: PathBuf, reason: String },
}

/// The package manifest is missing or unusable.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("manifest not found at {}", .path.display())]
    Missing { path: PathBuf },

    #[error("failed to read manifest {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed manifest {}: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("manifest field '{field}' is missing or not a string")]
    MissingField { field: &'static str },

    #[error("manifest declares an invalid package name '{name}': {source}")]
    InvalidName {
        name: String,
        #[source]
        source: InvalidInput,
    },

    #[error("manifest declares an invalid version '{version}': {source}")]
    InvalidVersion {
        version: String,
        #[source]
        source: InvalidInput,
    },
}

/// The archive's identity is not acceptable for this ingestion.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("package rejected, expected {expected_name}@{expected_version}, received {name}@{version}")]
    Mismatch {
        expected_name: String,
        expected_version: String,
        name: String,
        version: String,
    },

    #[error("{name}@{version} is already published and republishing is forbidden")]
    AlreadyPublished { name: String, version: String },

    #[error("{name}@{version} would be stored as {file_name}, which already holds {owner_name}@{owner_version}")]
    ArtifactClaimed {
        name: String,
        version: String,
        file_name: String,
        owner_name: String,
        owner_version: String,
    },
}

/// Moving the artifact into the store failed.
#[derive(Debug, thiserror::Error)]
pub enum PlacementError {
    #[error("failed to create storage directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to rename {} to {}: {source}", .from.display(), .to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to copy {} to {}: {source}", .from.display(), .to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Stat or digest of the placed artifact failed.
#[derive(Debug, thiserror::Error)]
pub enum ChecksumError {
    #[error("failed to stat {}: {source}", .path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to digest {}: {source}", .path.display())]
    Digest {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum IngestionErrorKind {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Placement(#[from] PlacementError),

    #[error(transparent)]
    Checksum(#[from] ChecksumError),
}

impl IngestionErrorKind {
    pub fn stage(&self) -> Stage {
        match self {
            IngestionErrorKind::Extraction(_) => Stage::Extract,
            IngestionErrorKind::Descriptor(_) => Stage::Manifest,
            IngestionErrorKind::Validation(_) => Stage::Validate,
            IngestionErrorKind::Placement(_) => Stage::Place,
            IngestionErrorKind::Checksum(_) => Stage::Checksum,
        }
    }
}

/// A single artifact could not be ingested.
#[derive(Debug, thiserror::Error)]
#[error("ingestion of {} failed at {stage} stage: {kind}", .artifact.display())]
pub struct IngestionError {
    pub stage: Stage,
    pub artifact: PathBuf,
    #[source]
    pub kind: IngestionErrorKind,
}

impl IngestionError {
    pub fn new(artifact: &Path, kind: impl Into<IngestionErrorKind>) -> Self {
        let kind = kind.into();
        Self {
            stage: kind.stage(),
            artifact: artifact.to_path_buf(),
            kind,
        }
    }

    /// True when the archive was readable but declared the wrong identity.
    pub fn is_mismatch(&self) -> bool {
        matches!(
            self.kind,
            IngestionErrorKind::Validation(ValidationError::Mismatch { .. })
        )
    }
}

/// A version constraint expression could not be parsed.
#[derive(Debug, thiserror::Error)]
pub enum RangeError {
    #[error("unknown comparison operator '{0}'")]
    UnknownOperator(String),

    #[error("invalid version bound '{bound}': {source}")]
    InvalidBound {
        bound: String,
        #[source]
        source: semver::Error,
    },

    #[error("operator '{0}' is missing a version bound")]
    MissingBound(String),
}

/// Configuration could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse configuration {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors of the read, delete, and publish paths.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("{name} package not found")]
    PackageNotFound { name: String },

    #[error("{name}@{version} package not found")]
    VersionNotFound { name: String, version: String },

    #[error("{name}@{version} package missing")]
    ArtifactMissing { name: String, version: String },

    #[error("no version of '{name}' satisfies '{constraint}'")]
    NotSatisfied { name: String, constraint: String },

    #[error("invalid version range: {0}")]
    InvalidRange(#[from] RangeError),

    #[error(transparent)]
    Ingestion(#[from] IngestionError),

    #[error("failed to delete artifact {}: {source}", .path.display())]
    Unlink {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    #[error(transparent)]
    InvalidInput(#[from] InvalidInput),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("base64 decoding error: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl RegistryError {
    /// Unknown package, unknown version, or a version whose artifact is gone.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RegistryError::PackageNotFound { .. }
                | RegistryError::VersionNotFound { .. }
                | RegistryError::ArtifactMissing { .. }
        )
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;
