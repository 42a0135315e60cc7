//! Workspace synchronization module.
//!
//! Provides the bidirectional sync engine along with its collaborators:
//! ignore filtering, content hashing, concurrency limiting, progress
//! reporting, and content-type resolution.

pub mod content_type;
pub mod engine;
pub mod hash;
pub mod ignore;
pub mod limiter;
pub mod progress;
pub mod snapshot;

pub use content_type::{ContentTypeResolver, GuessContentType};
pub use engine::{SyncConfig, SyncEngine, SyncResult};
pub use hash::{hash_bytes, hash_file};
pub use ignore::{IgnoreFilter, WORKSPACE_IGNORE_FILE};
pub use limiter::ConcurrencyLimiter;
pub use progress::{SyncPhase, SyncProgress};
pub use snapshot::{FileInfo, Snapshot};
