//! On-disk layout of the archive store.
//!
//! ```text
//! <storage_root>/
//! ├── packages/<name>-<version>.tgz   canonical artifacts
//! └── temp/
//!     ├── <32 hex chars>/             scratch extraction directories
//!     └── upload-<32 hex chars>.tgz   staged uploads
//! ```
//!
//! The version index is never written here; it is rebuilt from `packages/`.

use rand::RngCore;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Extension of every stored archive.
pub const ARCHIVE_EXTENSION: &str = "tgz";

const PACKAGES_DIR: &str = "packages";
const TEMP_DIR: &str = "temp";

/// Bytes of entropy in scratch and staging names.
const RANDOM_NAME_BYTES: usize = 16;

#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
    packages_dir: PathBuf,
    temp_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            packages_dir: root.join(PACKAGES_DIR),
            temp_dir: root.join(TEMP_DIR),
            root,
        }
    }

    /// Create the `packages/` and `temp/` directories.
    pub async fn init(&self) -> io::Result<()> {
        fs::create_dir_all(&self.packages_dir).await?;
        fs::create_dir_all(&self.temp_dir).await?;
        debug!(root = %self.root.display(), "Storage layout initialized");
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn packages_dir(&self) -> &Path {
        &self.packages_dir
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// `<name>-<version>.tgz`
    pub fn artifact_file_name(name: &str, version: &str) -> String {
        format!("{name}-{version}.{ARCHIVE_EXTENSION}")
    }

    /// Canonical location of the artifact for (name, version).
    pub fn canonical_path(&self, name: &str, version: &str) -> PathBuf {
        self.packages_dir
            .join(Self::artifact_file_name(name, version))
    }

    /// Whether `path` sits directly inside the packages directory.
    pub fn is_in_packages_dir(&self, path: &Path) -> bool {
        let Some(parent) = path.parent() else {
            return false;
        };
        if parent == self.packages_dir {
            return true;
        }
        match (
            std::fs::canonicalize(parent),
            std::fs::canonicalize(&self.packages_dir),
        ) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    /// A fresh, unique scratch directory path (not yet created).
    pub fn scratch_path(&self) -> PathBuf {
        self.temp_dir.join(random_hex_name())
    }

    /// A fresh, unique path for staging an uploaded archive.
    pub fn staging_path(&self) -> PathBuf {
        self.temp_dir
            .join(format!("upload-{}.{ARCHIVE_EXTENSION}", random_hex_name()))
    }
}

/// 16 random bytes, lowercase hex encoded.
pub fn random_hex_name() -> String {
    let mut bytes = [0u8; RANDOM_NAME_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_canonical_path() {
        let layout = StorageLayout::new("/srv/pkgd");
        assert_eq!(
            layout.canonical_path("left-pad", "1.3.0"),
            PathBuf::from("/srv/pkgd/packages/left-pad-1.3.0.tgz")
        );
        assert_eq!(
            StorageLayout::artifact_file_name("a", "1.0.2-10"),
            "a-1.0.2-10.tgz"
        );
    }

    #[test]
    fn test_random_names_are_unique_hex() {
        let a = random_hex_name();
        let b = random_hex_name();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_scratch_and_staging_live_in_temp() {
        let layout = StorageLayout::new("/srv/pkgd");
        let scratch = layout.scratch_path();
        assert_eq!(scratch.parent(), Some(Path::new("/srv/pkgd/temp")));
        let staging = layout.staging_path();
        assert_eq!(staging.parent(), Some(Path::new("/srv/pkgd/temp")));
        assert!(staging.to_string_lossy().ends_with(".tgz"));
    }

    #[tokio::test]
    async fn test_is_in_packages_dir() {
        let temp_dir = TempDir::new().unwrap();
        let layout = StorageLayout::new(temp_dir.path());
        layout.init().await.unwrap();

        assert!(layout.is_in_packages_dir(&layout.canonical_path("a", "1.0.0")));
        assert!(layout.is_in_packages_dir(&layout.packages_dir().join("odd-name.tgz")));
        assert!(!layout.is_in_packages_dir(&layout.staging_path()));
        assert!(!layout.is_in_packages_dir(&layout.packages_dir().join("sub/a.tgz")));

        // Same directory reached through a different spelling
        let dotted = temp_dir.path().join("temp/../packages/a-1.0.0.tgz");
        assert!(layout.is_in_packages_dir(&dotted));
    }
}
