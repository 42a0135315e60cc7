//! Last-observed file state, keyed by workspace-relative path.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::sync::hash::{hash_file, hash_file_async};

/// Last known state of one synchronized file, either as last pulled from the
/// remote or as last pushed to it.
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    /// Path relative to the workspace root, `/`-separated.
    pub path: String,
    pub size: u64,
    pub mtime: Option<DateTime<Utc>>,
    /// BLAKE3 digest of the file content; the authoritative change signal.
    pub hash: String,
}

impl FileInfo {
    /// Stat and hash `local_path`, recording it under `relative_path`.
    pub fn from_local(local_path: &Path, relative_path: &str) -> Result<Self> {
        let metadata = std::fs::metadata(local_path)
            .with_context(|| format!("Failed to stat: {}", local_path.display()))?;
        let mtime = metadata.modified().ok().map(DateTime::<Utc>::from);
        let hash = hash_file(local_path)?;

        Ok(Self {
            path: relative_path.to_string(),
            size: metadata.len(),
            mtime,
            hash,
        })
    }

    /// Async variant; hashing runs on the blocking pool.
    pub async fn from_local_async(local_path: PathBuf, relative_path: String) -> Result<Self> {
        let metadata = tokio::fs::metadata(&local_path)
            .await
            .with_context(|| format!("Failed to stat: {}", local_path.display()))?;
        let mtime = metadata.modified().ok().map(DateTime::<Utc>::from);
        let hash = hash_file_async(local_path).await?;

        Ok(Self {
            path: relative_path,
            size: metadata.len(),
            mtime,
            hash,
        })
    }
}

/// In-memory record of what the engine last observed per file.
///
/// Owned and mutated exclusively by the sync engine: entries are written on
/// successful download or upload and removed when cleanup deletes a
/// local-only file.
#[derive(Debug, Default)]
pub struct Snapshot {
    entries: HashMap<String, FileInfo>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, info: FileInfo) {
        self.entries.insert(info.path.clone(), info);
    }

    pub fn forget(&mut self, path: &str) -> Option<FileInfo> {
        self.entries.remove(path)
    }

    pub fn get(&self, path: &str) -> Option<&FileInfo> {
        self.entries.get(path)
    }

    /// True when `info` is new or its content digest differs from the
    /// recorded state. Size and mtime never decide this.
    pub fn has_changed(&self, info: &FileInfo) -> bool {
        match self.entries.get(&info.path) {
            Some(known) => known.hash != info.hash,
            None => true,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::hash::hash_bytes;
    use tempfile::TempDir;

    fn info(path: &str, hash: &str) -> FileInfo {
        FileInfo {
            path: path.to_string(),
            size: 1,
            mtime: None,
            hash: hash.to_string(),
        }
    }

    #[test]
    fn test_unknown_path_counts_as_changed() {
        let snapshot = Snapshot::new();
        assert!(snapshot.has_changed(&info("a.txt", "h1")));
    }

    #[test]
    fn test_same_hash_is_unchanged() {
        let mut snapshot = Snapshot::new();
        snapshot.record(info("a.txt", "h1"));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("a.txt").unwrap().hash, "h1");
        assert!(!snapshot.has_changed(&info("a.txt", "h1")));
        assert!(snapshot.has_changed(&info("a.txt", "h2")));
    }

    #[test]
    fn test_forget_removes_entry() {
        let mut snapshot = Snapshot::new();
        snapshot.record(info("a.txt", "h1"));

        assert!(snapshot.forget("a.txt").is_some());
        assert!(snapshot.is_empty());
        assert!(snapshot.has_changed(&info("a.txt", "h1")));
    }

    #[test]
    fn test_from_local_populates_all_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file.txt");
        std::fs::write(&path, b"content").unwrap();

        let info = FileInfo::from_local(&path, "file.txt").unwrap();

        assert_eq!(info.path, "file.txt");
        assert_eq!(info.size, 7);
        assert!(info.mtime.is_some());
        assert_eq!(info.hash, hash_bytes(b"content"));
    }
}
