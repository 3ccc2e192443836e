//! SHA-256 digests of documents already on disk.
//!
//! Fresh downloads are hashed while streaming (see the client); this is for
//! files a previous run left behind without a manifest record.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use super::DownloadError;

const BUF_SIZE: usize = 64 * 1024;

/// Computes the lowercase hex SHA-256 of the file at `path`.
///
/// # Errors
///
/// Returns [`DownloadError::Io`] when the file cannot be opened or read.
pub async fn sha256_file(path: &Path) -> Result<String, DownloadError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| DownloadError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = file
            .read(&mut buf)
            .await
            .map_err(|e| DownloadError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
