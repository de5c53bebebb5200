//! Cryptographic digests for artifact integrity.
//!
//! npm clients verify downloads against `dist.shasum` (SHA-1, hex) and, when
//! present, `dist.integrity` (a Subresource Integrity string). Both are
//! computed in one streaming pass over the stored file.

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha512};
use std::path::Path;
use tokio::io::AsyncReadExt;

use crate::error::ChecksumError;

const READ_CHUNK: usize = 64 * 1024;

/// Digests of one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksums {
    /// Lowercase hex SHA-1
    pub shasum: String,
    /// `sha512-<base64>`
    pub integrity: String,
}

/// Digest a file without loading it into memory.
pub async fn digest_file(path: &Path) -> Result<Checksums, ChecksumError> {
    let to_err = |source| ChecksumError::Digest {
        path: path.to_path_buf(),
        source,
    };

    let mut file = tokio::fs::File::open(path).await.map_err(to_err)?;
    let mut sha1 = Sha1::new();
    let mut sha512 = Sha512::new();
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        let n = file.read(&mut buf).await.map_err(to_err)?;
        if n == 0 {
            break;
        }
        sha1.update(&buf[..n]);
        sha512.update(&buf[..n]);
    }

    Ok(Checksums {
        shasum: format!("{:x}", sha1.finalize()),
        integrity: format!(
            "sha512-{}",
            general_purpose::STANDARD.encode(sha512.finalize())
        ),
    })
}
