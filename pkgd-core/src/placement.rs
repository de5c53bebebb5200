//! Moving an ingested artifact to its canonical location.

use std::path::Path;
use tokio::fs;
use tracing::debug;

use crate::error::PlacementError;
use crate::layout::StorageLayout;

/// What [`place`] did to get the artifact to its canonical path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Already stored under the canonical name; nothing was touched.
    AlreadyCanonical,
    /// Stored under another name in the packages directory; renamed.
    Renamed,
    /// Staged outside the store; copied. The source is left in place.
    Copied,
}

/// Put `source` at `canonical`.
///
/// Files already inside the packages directory are renamed (or left alone when
/// correctly named) so the bytes are never stored twice; anything else is
/// copied.
pub async fn place(
    layout: &StorageLayout,
    source: &Path,
    canonical: &Path,
) -> Result<Placement, PlacementError> {
    if layout.is_in_packages_dir(source) {
        if source.file_name() == canonical.file_name() {
            debug!(path = %canonical.display(), "Artifact already at canonical path");
            return Ok(Placement::AlreadyCanonical);
        }

        fs::rename(source, canonical)
            .await
            .map_err(|e| PlacementError::Rename {
                from: source.to_path_buf(),
                to: canonical.to_path_buf(),
                source: e,
            })?;
        debug!(from = %source.display(), to = %canonical.display(), "Renamed artifact");
        return Ok(Placement::Renamed);
    }

    if let Some(parent) = canonical.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| PlacementError::CreateDir {
                path: parent.to_path_buf(),
                source: e,
            })?;
    }

    let bytes = fs::copy(source, canonical)
        .await
        .map_err(|e| PlacementError::Copy {
            from: source.to_path_buf(),
            to: canonical.to_path_buf(),
            source: e,
        })?;
    debug!(from = %source.display(), to = %canonical.display(), bytes, "Copied artifact");
    Ok(Placement::Copied)
}
