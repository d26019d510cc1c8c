//! CloudMirror Transfer - Chunked, resumable transfer engine
//!
//! Provides:
//! - Logical path resolution against any [`IBackendAdapter`]
//! - Level-by-level remote folder mirroring
//! - Resumable chunked upload/download with bounded retry
//! - Recursive upload walks, download materialization and deletes
//!
//! ## Modules
//!
//! - [`engine`] - Entry point: upload, download and delete
//! - [`resolver`] - Logical path to handle resolution
//! - [`mirror`] - Idempotent remote folder creation
//! - [`walker`] - Local tree traversal for uploads
//! - [`chunked`] - Per-file transfer state machine
//! - [`download`] - Remote tree materialization
//! - [`delete`] - Depth-first remote deletion
//! - [`skip`] - Local entry exclusion rules
//! - [`digest`] - Rolling content digests (SHA-256, quickXorHash)
//! - [`retry`] - Bounded exponential backoff
//! - [`memory`] - In-process backend used by tests
//!
//! [`IBackendAdapter`]: cloudmirror_core::ports::IBackendAdapter

pub mod chunked;
pub mod delete;
pub mod digest;
pub mod download;
pub mod engine;
pub mod memory;
pub mod mirror;
pub mod options;
pub mod report;
pub mod resolver;
pub mod retry;
pub mod skip;
pub mod walker;

pub use engine::TransferEngine;
pub use options::TransferOptions;
pub use report::TransferReport;
pub use retry::RetryPolicy;
pub use skip::SkipFilter;

use std::path::{Path, PathBuf};

use cloudmirror_core::domain::{DomainError, EntryKind};
use cloudmirror_core::ports::{BackendError, RejectReason};
use thiserror::Error;

/// Errors that end a transfer operation
///
/// Every variant names the local or remote path it concerns, so a single
/// terminal message is enough for the user to locate the failure.
#[derive(Debug, Error)]
pub enum TransferError {
    /// A segment of a logical path does not exist remotely
    #[error("Path not found: {path}")]
    PathNotFound { path: String },

    /// The name exists, but as the other kind
    #[error("Name conflict at {path}: expected a {expected}, found a {found}")]
    NameKindConflict {
        path: String,
        expected: EntryKind,
        found: EntryKind,
    },

    /// Transient failure outside a chunk operation (not retried)
    #[error("Transient transport error at {path}: {message}")]
    TransientTransport { path: String, message: String },

    /// Transient failures outlasted the retry budget
    #[error("Giving up on {path} after {attempts} attempts: {message}")]
    RetryExhausted {
        path: String,
        attempts: u32,
        message: String,
    },

    /// The backend refused the operation
    #[error("Backend rejected {path} ({reason}): {message}")]
    BackendRejected {
        path: String,
        reason: RejectReason,
        message: String,
    },

    /// Content digest mismatch at commit
    #[error("Integrity mismatch for {path}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// Local filesystem failure
    #[error("Local I/O error at {}: {source}", path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid logical path or illegal session transition
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The request itself cannot be carried out
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl TransferError {
    /// Attaches a path to a backend error
    pub fn from_backend(path: impl Into<String>, err: BackendError) -> Self {
        let path = path.into();
        match err {
            BackendError::Transient(message) | BackendError::Throttled { message, .. } => {
                TransferError::TransientTransport { path, message }
            }
            BackendError::Rejected { reason, message } => TransferError::BackendRejected {
                path,
                reason,
                message,
            },
            BackendError::IntegrityMismatch { expected, actual } => {
                TransferError::IntegrityMismatch {
                    path,
                    expected,
                    actual,
                }
            }
        }
    }

    pub fn local_io(path: &Path, source: std::io::Error) -> Self {
        TransferError::LocalIo {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Returns true for errors a caller could reasonably retry later
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransferError::TransientTransport { .. } | TransferError::RetryExhausted { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, TransferError>;
