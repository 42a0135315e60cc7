//! Bidirectional sync engine between a local workspace and a remote prefix.
//!
//! `pull()` makes the workspace mirror the remote prefix (remote is
//! authoritative, local-only files are deleted); `push()` uploads files whose
//! content digest differs from the last synced state. Both tolerate per-file
//! failures and report them through [`SyncResult`] instead of aborting.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};
use std::time::Instant;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use crate::fs::ObjectStore;
use crate::sync::content_type::{ContentTypeResolver, GuessContentType};
use crate::sync::ignore::IgnoreFilter;
use crate::sync::limiter::ConcurrencyLimiter;
use crate::sync::progress::{ProgressEmitter, SyncPhase, SyncProgress};
use crate::sync::snapshot::{FileInfo, Snapshot};

/// Default maximum concurrent downloads during a pull.
pub const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 50;

/// Default maximum concurrent uploads during a push. Lower than the download
/// cap: uploads carry content-type resolution and larger write costs.
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 10;

/// Engine configuration. Bucket, prefix, and local directory are required;
/// everything else has documented defaults.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Remote bucket name.
    pub bucket: String,
    /// Key prefix ("folder") the workspace lives under. Normalized to end
    /// with `/`.
    pub prefix: String,
    /// Local workspace directory.
    pub local_dir: PathBuf,
    /// Maximum concurrent downloads (default 50).
    pub download_concurrency: usize,
    /// Maximum concurrent uploads (default 10).
    pub upload_concurrency: usize,
    /// Base ignore patterns, gitignore syntax. Workspace `.syncignore` rules
    /// layer on top after each pull.
    pub ignore_patterns: Vec<String>,
}

impl SyncConfig {
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>, local_dir: impl Into<PathBuf>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
            local_dir: local_dir.into(),
            download_concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
            upload_concurrency: DEFAULT_UPLOAD_CONCURRENCY,
            ignore_patterns: Vec::new(),
        }
    }

    pub fn with_download_concurrency(mut self, n: usize) -> Self {
        self.download_concurrency = n;
        self
    }

    pub fn with_upload_concurrency(mut self, n: usize) -> Self {
        self.upload_concurrency = n;
        self
    }

    pub fn with_ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }
}

/// Outcome of one `pull()` or `push()`.
///
/// `success` is false whenever `errors` is non-empty, but the operation still
/// completed as many transfers as possible; callers must inspect the counts
/// and the error list, not rely on an `Err` return.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncResult {
    pub success: bool,
    pub downloaded_files: usize,
    pub uploaded_files: usize,
    pub deleted_files: usize,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

/// State of the background pull, tracked on a watch channel so waiters can
/// both read it and await transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PullState {
    NotStarted,
    Running,
    Settled,
}

/// Sync engine for one workspace.
///
/// Operations on one instance must be serialized by the caller; only
/// `start_background_pull` guards against re-entry. The snapshot is owned by
/// the engine and never exposed.
pub struct SyncEngine {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    prefix: String,
    local_dir: PathBuf,
    snapshot: Mutex<Snapshot>,
    ignore: RwLock<IgnoreFilter>,
    download_limiter: ConcurrencyLimiter,
    upload_limiter: ConcurrencyLimiter,
    resolver: Arc<dyn ContentTypeResolver>,
    progress: ProgressEmitter,
    pull_state: watch::Sender<PullState>,
}

impl SyncEngine {
    /// Create an engine from validated configuration and a storage client.
    ///
    /// Fails fast when bucket, prefix, or local directory are empty.
    pub fn new(config: SyncConfig, store: Arc<dyn ObjectStore>) -> Result<Self> {
        if config.bucket.is_empty() {
            bail!("Sync configuration requires a bucket");
        }
        if config.prefix.is_empty() {
            bail!("Sync configuration requires a key prefix");
        }
        if config.local_dir.as_os_str().is_empty() {
            bail!("Sync configuration requires a local directory");
        }

        let prefix = if config.prefix.ends_with('/') {
            config.prefix.clone()
        } else {
            format!("{}/", config.prefix)
        };

        let ignore = IgnoreFilter::new(&config.local_dir, &config.ignore_patterns)?;
        let (pull_state, _) = watch::channel(PullState::NotStarted);

        Ok(Self {
            store,
            bucket: config.bucket,
            prefix,
            local_dir: config.local_dir,
            snapshot: Mutex::new(Snapshot::new()),
            ignore: RwLock::new(ignore),
            download_limiter: ConcurrencyLimiter::new(config.download_concurrency),
            upload_limiter: ConcurrencyLimiter::new(config.upload_concurrency),
            resolver: Arc::new(GuessContentType),
            progress: ProgressEmitter::new(),
            pull_state,
        })
    }

    /// Override the content-type resolver used for uploads.
    pub fn with_resolver(mut self, resolver: Arc<dyn ContentTypeResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// The local workspace directory this engine synchronizes.
    pub fn workspace_path(&self) -> &Path {
        &self.local_dir
    }

    /// Subscribe to progress ticks. Dropping the receiver unsubscribes.
    pub fn subscribe_progress(&self) -> broadcast::Receiver<SyncProgress> {
        self.progress.subscribe()
    }

    /// Make the workspace mirror the remote prefix.
    ///
    /// Phases, strictly ordered: list the prefix, download everything through
    /// the limiter, delete local files the remote no longer has, then reload
    /// workspace ignore rules. A listing failure aborts the call; per-file
    /// failures are collected in the result.
    pub async fn pull(&self) -> Result<SyncResult> {
        let start = Instant::now();
        let mut result = SyncResult::default();

        // Phase 1: list. Nothing has changed locally yet, so a failure here
        // is a whole-operation error rather than a partial result.
        let objects = self
            .store
            .list_prefix(&self.prefix)
            .await
            .with_context(|| format!("Failed to list bucket {} prefix {}", self.bucket, self.prefix))?;

        let mut tasks: Vec<(String, String)> = Vec::new();
        let mut remote_paths: HashSet<String> = HashSet::new();
        for object in objects {
            let Some(rel) = object.key.strip_prefix(&self.prefix) else {
                continue;
            };
            if rel.is_empty() || rel.ends_with('/') {
                continue; // synthetic directory markers
            }
            if self.ignore_guard().is_ignored(rel, false) {
                debug!(path = rel, "Skipping ignored remote object");
                continue;
            }
            remote_paths.insert(rel.to_string());
            tasks.push((rel.to_string(), object.key));
        }

        info!(
            bucket = %self.bucket,
            prefix = %self.prefix,
            files = tasks.len(),
            "Pulling remote prefix"
        );

        // Phase 2: parallel download. Each task is isolated; a failure is
        // recorded and its siblings keep going.
        let total = tasks.len();
        let interval = ProgressEmitter::interval(total);
        let completed = AtomicUsize::new(0);
        let completed = &completed;

        let downloads = tasks.iter().map(|(rel, key)| {
            self.download_limiter.run(async move {
                let outcome = self.download_one(key, rel).await;
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                if done % interval == 0 || done == total {
                    self.progress.emit(SyncPhase::Download, done, total, rel);
                }
                outcome.map_err(|err| format!("{}: {:#}", rel, err))
            })
        });

        for outcome in futures::future::join_all(downloads).await {
            match outcome {
                Ok(info) => {
                    self.snapshot_guard().record(info);
                    result.downloaded_files += 1;
                }
                Err(message) => {
                    warn!(error = %message, "Download failed");
                    result.errors.push(message);
                }
            }
        }

        // Phase 3: delete local files the remote no longer has. Ignored
        // paths survive so user-local scratch files are kept even though the
        // remote is authoritative for everything else.
        result.deleted_files = self.cleanup_local_only(&remote_paths).await;
        self.prune_empty_dirs(&self.local_dir);

        // Phase 4: pulled content may carry new ignore rules; honor them
        // from now on.
        if let Err(err) = self.ignore_write_guard().load_workspace() {
            warn!(error = %err, "Failed to reload workspace ignore rules");
        }

        result.success = result.errors.is_empty();
        result.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            downloaded = result.downloaded_files,
            deleted = result.deleted_files,
            errors = result.errors.len(),
            duration_ms = result.duration_ms,
            "Pull finished"
        );
        Ok(result)
    }

    /// Upload local files whose content changed since the last sync.
    ///
    /// Waits for any in-flight background pull first: pushing before the
    /// baseline snapshot exists would classify every local file as new.
    pub async fn push(&self) -> Result<SyncResult> {
        self.wait_for_pull().await;

        let start = Instant::now();
        let mut result = SyncResult::default();

        let local_files = self
            .scan_local_files()
            .context("Failed to scan workspace")?;

        // Diff on content digest; size and mtime are unreliable across
        // container restarts and bind mounts.
        let mut changed: Vec<FileInfo> = Vec::new();
        for rel in local_files {
            let local_path = self.local_dir.join(&rel);
            match FileInfo::from_local_async(local_path, rel.clone()).await {
                Ok(info) => {
                    if self.snapshot_guard().has_changed(&info) {
                        changed.push(info);
                    }
                }
                Err(err) => result.errors.push(format!("{}: {:#}", rel, err)),
            }
        }

        info!(
            bucket = %self.bucket,
            prefix = %self.prefix,
            files = changed.len(),
            "Pushing changed files"
        );

        let total = changed.len();
        let interval = ProgressEmitter::interval(total);
        let completed = AtomicUsize::new(0);
        let completed = &completed;

        let uploads = changed.iter().map(|info| {
            self.upload_limiter.run(async move {
                let outcome = self.upload_one(info).await;
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                if done % interval == 0 || done == total {
                    self.progress.emit(SyncPhase::Upload, done, total, &info.path);
                }
                outcome
                    .map(|()| info)
                    .map_err(|err| format!("{}: {:#}", info.path, err))
            })
        });

        for outcome in futures::future::join_all(uploads).await {
            match outcome {
                Ok(info) => {
                    self.snapshot_guard().record(info.clone());
                    result.uploaded_files += 1;
                }
                Err(message) => {
                    warn!(error = %message, "Upload failed");
                    result.errors.push(message);
                }
            }
        }

        result.success = result.errors.is_empty();
        result.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            uploaded = result.uploaded_files,
            errors = result.errors.len(),
            duration_ms = result.duration_ms,
            "Push finished"
        );
        Ok(result)
    }

    /// Launch `pull()` on the runtime without blocking the caller.
    ///
    /// Failures are logged and swallowed here so a waiter is never
    /// deadlocked: a failed pull still settles the state channel. Calling
    /// this while a pull is already running is a no-op.
    pub fn start_background_pull(self: &Arc<Self>) {
        if *self.pull_state.borrow() == PullState::Running {
            warn!("Background pull already running, ignoring");
            return;
        }
        self.pull_state.send_replace(PullState::Running);

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            match engine.pull().await {
                Ok(result) if result.success => {
                    info!(
                        downloaded = result.downloaded_files,
                        deleted = result.deleted_files,
                        "Background pull complete"
                    );
                }
                Ok(result) => {
                    warn!(
                        downloaded = result.downloaded_files,
                        errors = result.errors.len(),
                        "Background pull finished with errors"
                    );
                }
                Err(err) => {
                    error!(error = %format!("{:#}", err), "Background pull failed");
                }
            }
            engine.pull_state.send_replace(PullState::Settled);
        });
    }

    /// Suspend until any in-flight background pull settles (success or
    /// failure). Returns immediately when none was started or it already
    /// settled.
    pub async fn wait_for_pull(&self) {
        let mut rx = self.pull_state.subscribe();
        // wait_for checks the current value first, so this never misses a
        // transition that happened before subscribing.
        let _ = rx.wait_for(|state| *state != PullState::Running).await;
    }

    /// Non-blocking check: has a background pull settled?
    pub fn is_pull_complete(&self) -> bool {
        *self.pull_state.borrow() == PullState::Settled
    }

    async fn download_one(&self, key: &str, rel: &str) -> Result<FileInfo> {
        let local_path = self.local_dir.join(rel);
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        self.store.download(key, &local_path).await?;
        FileInfo::from_local_async(local_path, rel.to_string()).await
    }

    async fn upload_one(&self, info: &FileInfo) -> Result<()> {
        let local_path = self.local_dir.join(&info.path);
        let key = format!("{}{}", self.prefix, info.path);
        let content_type = self.resolver.resolve(Path::new(&info.path));
        self.store.upload(&local_path, &key, &content_type).await
    }

    /// Delete local files absent from `remote_paths`, dropping their
    /// snapshot entries. Filesystem errors here are logged and tolerated.
    async fn cleanup_local_only(&self, remote_paths: &HashSet<String>) -> usize {
        let local_files = match self.scan_local_files() {
            Ok(files) => files,
            Err(err) => {
                warn!(error = %format!("{:#}", err), "Skipping local cleanup");
                return 0;
            }
        };

        let mut deleted = 0;
        for rel in local_files {
            if remote_paths.contains(&rel) {
                continue;
            }
            let path = self.local_dir.join(&rel);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    self.snapshot_guard().forget(&rel);
                    deleted += 1;
                    debug!(path = %rel, "Deleted local file missing from remote");
                }
                Err(err) => {
                    warn!(path = %rel, error = %err, "Failed to delete local file");
                }
            }
        }
        deleted
    }

    /// Workspace-relative paths of every non-ignored local file. Ignored
    /// directories are pruned from the walk without descending.
    fn scan_local_files(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();
        if !self.local_dir.exists() {
            return Ok(files);
        }

        let ignore = self.ignore_guard();
        let mut stack = vec![self.local_dir.clone()];

        while let Some(dir) = stack.pop() {
            let read_dir = std::fs::read_dir(&dir)
                .with_context(|| format!("Failed to read directory: {}", dir.display()))?;

            for entry in read_dir {
                let entry = entry?;
                let path = entry.path();
                let rel = path
                    .strip_prefix(&self.local_dir)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .replace('\\', "/");

                let file_type = entry.file_type()?;
                if file_type.is_dir() {
                    if !ignore.is_ignored(&rel, true) {
                        stack.push(path);
                    }
                } else if !ignore.is_ignored(&rel, false) {
                    files.push(rel);
                }
            }
        }

        Ok(files)
    }

    /// Remove directories emptied by cleanup, deepest first. `remove_dir`
    /// fails on non-empty directories, which is the signal to keep them.
    fn prune_empty_dirs(&self, dir: &Path) {
        let Ok(read_dir) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in read_dir.flatten() {
            let path = entry.path();
            if path.is_dir() {
                self.prune_empty_dirs(&path);
                let _ = std::fs::remove_dir(&path);
            }
        }
    }

    fn snapshot_guard(&self) -> MutexGuard<'_, Snapshot> {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn ignore_guard(&self) -> RwLockReadGuard<'_, IgnoreFilter> {
        self.ignore.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn ignore_write_guard(&self) -> std::sync::RwLockWriteGuard<'_, IgnoreFilter> {
        self.ignore.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::types::RemoteObject;
    use async_trait::async_trait;

    struct NullStore;

    #[async_trait]
    impl ObjectStore for NullStore {
        async fn list_prefix(&self, _prefix: &str) -> Result<Vec<RemoteObject>> {
            Ok(Vec::new())
        }
        async fn download(&self, _key: &str, _local_path: &Path) -> Result<()> {
            Ok(())
        }
        async fn upload(&self, _local_path: &Path, _key: &str, _content_type: &str) -> Result<()> {
            Ok(())
        }
    }

    fn engine(config: SyncConfig) -> Result<SyncEngine> {
        SyncEngine::new(config, Arc::new(NullStore))
    }

    #[test]
    fn test_missing_required_fields_fail_fast() {
        assert!(engine(SyncConfig::new("", "u/1/", "/tmp/ws")).is_err());
        assert!(engine(SyncConfig::new("bucket", "", "/tmp/ws")).is_err());
        assert!(engine(SyncConfig::new("bucket", "u/1/", "")).is_err());
    }

    #[test]
    fn test_prefix_normalized_to_trailing_slash() {
        let bare = engine(SyncConfig::new("bucket", "u/1", "/tmp/ws")).unwrap();
        assert_eq!(bare.prefix, "u/1/");

        let slashed = engine(SyncConfig::new("bucket", "u/1/", "/tmp/ws")).unwrap();
        assert_eq!(slashed.prefix, "u/1/");
    }

    #[test]
    fn test_config_defaults() {
        let config = SyncConfig::new("b", "p/", "/tmp/ws");
        assert_eq!(config.download_concurrency, DEFAULT_DOWNLOAD_CONCURRENCY);
        assert_eq!(config.upload_concurrency, DEFAULT_UPLOAD_CONCURRENCY);
        assert!(config.ignore_patterns.is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_pull_without_background_pull_returns() {
        let engine = engine(SyncConfig::new("bucket", "u/1/", "/tmp/ws")).unwrap();
        engine.wait_for_pull().await;
        assert!(!engine.is_pull_complete());
    }
}
