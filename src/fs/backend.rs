use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use opendal::Operator;
use std::path::Path;

use crate::fs::types::RemoteObject;

/// Remote object-storage boundary consumed by the sync engine.
///
/// Implementations must list recursively, skip directory markers, and leave
/// key/prefix normalization to the caller. Injecting a different
/// implementation is the test-double seam.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List every object under `prefix`, recursively. Keys in the result are
    /// full keys, never directory markers.
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<RemoteObject>>;

    /// Download one object to a local file, creating parent directories.
    async fn download(&self, key: &str, local_path: &Path) -> Result<()>;

    /// Upload a local file to `key`, tagging it with `content_type` when the
    /// backing service supports it.
    async fn upload(&self, local_path: &Path, key: &str, content_type: &str) -> Result<()>;
}

/// [`ObjectStore`] backed by an OpenDAL [`Operator`].
///
/// Constructors for concrete services live in the sibling `s3` and `gcs`
/// modules; tests wrap a memory operator directly.
pub struct OpendalStore {
    operator: Operator,
    label: String,
}

impl OpendalStore {
    /// Wrap an already-configured operator. `label` names the backing
    /// service in error messages (e.g. `s3://bucket`).
    pub fn new(operator: Operator, label: impl Into<String>) -> Self {
        Self {
            operator,
            label: label.into(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

#[async_trait]
impl ObjectStore for OpendalStore {
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<RemoteObject>> {
        let mut lister = self
            .operator
            .lister_with(prefix)
            .recursive(true)
            .await
            .with_context(|| format!("Failed to list {}/{}", self.label, prefix))?;

        let mut objects = Vec::new();

        while let Some(entry) = lister
            .try_next()
            .await
            .with_context(|| format!("Failed to page listing of {}/{}", self.label, prefix))?
        {
            let meta = entry.metadata();

            // The prefix itself and zero-byte "folder" keys come back as
            // directory entries; only real objects become download tasks.
            if meta.mode().is_dir() || entry.path().ends_with('/') {
                continue;
            }

            objects.push(RemoteObject {
                key: entry.path().to_string(),
                size: meta.content_length(),
            });
        }

        Ok(objects)
    }

    async fn download(&self, key: &str, local_path: &Path) -> Result<()> {
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let content = self
            .operator
            .read(key)
            .await
            .with_context(|| format!("Failed to read {}/{}", self.label, key))?;

        tokio::fs::write(local_path, content.to_vec())
            .await
            .with_context(|| format!("Failed to write local file: {}", local_path.display()))?;

        Ok(())
    }

    async fn upload(&self, local_path: &Path, key: &str, content_type: &str) -> Result<()> {
        let content = tokio::fs::read(local_path)
            .await
            .with_context(|| format!("Failed to read local file: {}", local_path.display()))?;

        // kv-style services (memory, used by tests) reject write options they
        // cannot store, so only set the content type where supported.
        if self.operator.info().full_capability().write_with_content_type {
            self.operator
                .write_with(key, content)
                .content_type(content_type)
                .await
                .with_context(|| format!("Failed to write {}/{}", self.label, key))?;
        } else {
            self.operator
                .write(key, content)
                .await
                .with_context(|| format!("Failed to write {}/{}", self.label, key))?;
        }

        Ok(())
    }
}
