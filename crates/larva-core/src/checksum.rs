//! SHA-256 digests of image payloads.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::Result;

/// Size and digest of a file as it exists on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    pub size_bytes: u64,
    /// Lower-case hex SHA-256.
    pub checksum_hex: String,
}

/// Lower-case hex SHA-256 of a byte slice.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Read a file and digest the bytes actually stored.
pub async fn sha256_file(path: &Path) -> Result<FileDigest> {
    let bytes = tokio::fs::read(path).await?;
    Ok(FileDigest {
        size_bytes: bytes.len() as u64,
        checksum_hex: sha256_hex(&bytes),
    })
}
