//! Hashing utilities for sync operations.
//!
//! Content digests are the change-detection signal: a file is re-uploaded
//! exactly when its digest differs from the last synced state, regardless of
//! size or mtime.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Hash bytes using BLAKE3.
pub fn hash_bytes(data: &[u8]) -> String {
    // Use parallel hashing for data > 128KB
    if data.len() > 128 * 1024 {
        let mut hasher = blake3::Hasher::new();
        hasher.update_rayon(data);
        hasher.finalize().to_hex().to_string()
    } else {
        blake3::hash(data).to_hex().to_string()
    }
}

/// Hash a file using BLAKE3, streaming in 64KB reads so memory stays bounded
/// regardless of file size.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open for hashing: {}", path.display()))?;

    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0u8; 65536];

    loop {
        let bytes_read = file
            .read(&mut buffer)
            .with_context(|| format!("Failed to read for hashing: {}", path.display()))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}

/// Hash a file asynchronously using BLAKE3.
pub async fn hash_file_async(path: PathBuf) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_file(&path))
        .await
        .context("Hashing task panicked")?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_hash_bytes() {
        let hash1 = hash_bytes(b"hello world");
        let hash2 = hash_bytes(b"hello world");
        let hash3 = hash_bytes(b"goodbye world");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 64); // BLAKE3 produces 256-bit hash
    }

    #[test]
    fn test_hash_file_matches_hash_bytes() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"test content").unwrap();

        let hash = hash_file(file.path()).unwrap();

        assert_eq!(hash, hash_bytes(b"test content"));
    }

    #[test]
    fn test_hash_file_streams_large_input() {
        let mut file = NamedTempFile::new().unwrap();
        let data = vec![0xabu8; 300 * 1024];
        file.write_all(&data).unwrap();

        let hash = hash_file(file.path()).unwrap();

        assert_eq!(hash, hash_bytes(&data));
    }

    #[tokio::test]
    async fn test_hash_file_async() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"async content").unwrap();

        let hash = hash_file_async(file.path().to_path_buf()).await.unwrap();

        assert_eq!(hash, hash_bytes(b"async content"));
    }
}
