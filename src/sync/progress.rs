//! Progress reporting for sync operations.
//!
//! Ticks flow through a broadcast channel: consumers subscribe for a
//! receiver and unsubscribe by dropping it. Emission is batched so event
//! volume stays independent of file count.

use serde::Serialize;
use tokio::sync::broadcast;

/// Direction of the transfer a progress tick describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    Download,
    Upload,
}

/// A point-in-time progress update emitted during a pull or push.
#[derive(Debug, Clone, Serialize)]
pub struct SyncProgress {
    pub phase: SyncPhase,
    pub current: usize,
    pub total: usize,
    pub percentage: u8,
    pub current_file: String,
}

/// Task counts above this emit batched ticks instead of one per completion.
const BATCH_THRESHOLD: usize = 100;

/// Upper bound on ticks per operation once batching kicks in.
const MAX_TICKS: usize = 20;

#[derive(Debug)]
pub struct ProgressEmitter {
    tx: broadcast::Sender<SyncProgress>,
}

impl ProgressEmitter {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncProgress> {
        self.tx.subscribe()
    }

    /// Completions between ticks for an operation of `total` items.
    pub fn interval(total: usize) -> usize {
        if total > BATCH_THRESHOLD {
            (total / MAX_TICKS).max(1)
        } else {
            1
        }
    }

    pub fn emit(&self, phase: SyncPhase, current: usize, total: usize, current_file: &str) {
        let percentage = if total == 0 {
            100
        } else {
            (current * 100 / total) as u8
        };

        // send only fails when nobody is subscribed, which is fine.
        let _ = self.tx.send(SyncProgress {
            phase,
            current,
            total,
            percentage,
            current_file: current_file.to_string(),
        });
    }
}

impl Default for ProgressEmitter {
    fn default() -> Self {
        Self::new()
    }
}
