//! Transfer observer port
//!
//! Observers receive progress and completion events from the engine.
//! Callbacks are synchronous and fire-and-forget: the engine never waits
//! on an observer and an observer cannot fail a transfer.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::entry::SkipReason;

/// How a file's bytes are being moved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    /// One request, no session
    Single,
    /// Session with chunked appends and a commit
    Chunked,
}

impl std::fmt::Display for TransferMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferMode::Single => write!(f, "single"),
            TransferMode::Chunked => write!(f, "chunked"),
        }
    }
}

/// Observer for engine events
///
/// All methods have empty default bodies so implementations pick only
/// the events they care about.
pub trait ITransferObserver: Send + Sync {
    /// A file transfer is about to start
    fn on_transfer_started(&self, _path: &str, _size: u64, _mode: TransferMode) {}

    /// A chunk was acknowledged; `offset` is the new committed offset
    fn on_chunk(&self, _path: &str, _offset: u64, _total: u64) {}

    /// A file transfer committed with its final size
    fn on_committed(&self, _path: &str, _size: u64) {}

    /// An entry was not transferred
    fn on_skipped(&self, _path: &str, _reason: SkipReason) {}

    /// A remote or local folder was created
    fn on_folder_created(&self, _path: &str) {}

    /// A remote entry was deleted
    fn on_deleted(&self, _path: &str) {}
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ITransferObserver for NoopObserver {}

/// Emits every event as a `tracing` event
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ITransferObserver for TracingObserver {
    fn on_transfer_started(&self, path: &str, size: u64, mode: TransferMode) {
        debug!(path, size, mode = %mode, "Transfer started");
    }

    fn on_chunk(&self, path: &str, offset: u64, total: u64) {
        debug!(path, offset, total, "Chunk committed");
    }

    fn on_committed(&self, path: &str, size: u64) {
        info!(path, size, "Transfer committed");
    }

    fn on_skipped(&self, path: &str, reason: SkipReason) {
        debug!(path, reason = %reason, "Entry skipped");
    }

    fn on_folder_created(&self, path: &str) {
        info!(path, "Folder created");
    }

    fn on_deleted(&self, path: &str) {
        info!(path, "Entry deleted");
    }
}
