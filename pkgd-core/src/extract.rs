//! Archive extraction into scratch directories.
//!
//! An artifact is streamed through gzip decompression and tar unpacking into a
//! freshly created `temp/<32 hex>` directory. The directory is owned by a
//! [`ScratchDir`], which removes it on every exit path: explicitly through
//! [`ScratchDir::remove`], or as a fallback when the guard is dropped.

use flate2::read::GzDecoder;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::ExtractionError;
use crate::layout::StorageLayout;

/// A scratch directory that is deleted when released.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    released: bool,
}

impl ScratchDir {
    async fn create(path: PathBuf) -> Result<Self, ExtractionError> {
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|source| ExtractionError::Scratch {
                path: path.clone(),
                source,
            })?;
        Ok(Self {
            path,
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recursively delete the directory. Failures are logged, never returned.
    pub async fn remove(mut self) {
        self.released = true;
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "Removed scratch directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to remove scratch directory")
            }
        }
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Failed to remove scratch directory");
            }
        }
    }
}

/// Unpack a gzipped tarball into a new scratch directory.
///
/// The scratch directory is returned even though extraction happens in a
/// blocking task; on failure it has already been cleaned up by its guard.
pub async fn extract(layout: &StorageLayout, source: &Path) -> Result<ScratchDir, ExtractionError> {
    let scratch = ScratchDir::create(layout.scratch_path()).await?;
    debug!(source = %source.display(), scratch = %scratch.path().display(), "Extracting archive");

    let archive_path = source.to_path_buf();
    let dest = scratch.path().to_path_buf();
    tokio::task::spawn_blocking(move || unpack_tar_gz(&archive_path, &dest))
        .await
        .map_err(|e| ExtractionError::Interrupted {
            path: source.to_path_buf(),
            reason: e.to_string(),
        })??;

    Ok(scratch)
}

fn unpack_tar_gz(archive_path: &Path, dest: &Path) -> Result<(), ExtractionError> {
    let file = File::open(archive_path).map_err(|source| ExtractionError::Open {
        path: archive_path.to_path_buf(),
        source,
    })?;

    let decoder = GzDecoder::new(BufReader::new(file));
    let mut archive = tar::Archive::new(decoder);
    archive.set_preserve_permissions(false);
    archive.set_preserve_mtime(false);

    archive
        .unpack(dest)
        .map_err(|source| ExtractionError::Corrupt {
            path: archive_path.to_path_buf(),
            source,
        })
}
