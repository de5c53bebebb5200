//! # pkgd core
//!
//! Storage and version-resolution engine of a self-hosted npm-compatible
//! package registry. Archives are ingested into a flat packages directory,
//! described by an in-memory version index, and served back by name and
//! version range.
//!
//! ## Key Modules
//!
//! - [`extract`]: unpacking archives into scratch directories
//! - [`descriptor`]: reading `package/package.json`
//! - [`placement`]: moving artifacts to their canonical path
//! - [`index`]: the in-memory version index
//! - [`pipeline`]: the extract → register ingestion sequence
//! - [`loader`]: rebuilding the index from disk
//! - [`range`]: version constraints and best-match resolution
//! - [`registry`]: the facade used by the HTTP server
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pkgd_core::{Registry, RegistryConfig, VersionConstraint};
//!
//! # async fn run() -> Result<(), pkgd_core::RegistryError> {
//! let registry = Registry::open(RegistryConfig::new("./data", "http://localhost:8080")).await?;
//! registry.reload_all().await?;
//! let artifact = registry.resolve("left-pad", &VersionConstraint::parse(">=1.0.0 <2.0.0")?)?;
//! println!("{}", artifact.path.display());
//! # Ok(())
//! # }
//! ```

pub mod checksum;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod extract;
pub mod index;
pub mod layout;
pub mod loader;
pub mod pipeline;
pub mod placement;
pub mod range;
pub mod registry;
pub mod validation;

#[cfg(test)]
mod testutil;

pub use config::{RegistryConfig, RepublishPolicy};
pub use error::{IngestionError, RegistryError, RegistryResult, Stage};
pub use index::{IndexEntry, PackageRecord, VersionIndex, VersionRecord};
pub use loader::{BulkLoader, ReloadReport};
pub use pipeline::{IngestionPipeline, RegisteredVersion};
pub use range::{Op, VersionConstraint};
pub use registry::{Registry, ResolvedArtifact};
