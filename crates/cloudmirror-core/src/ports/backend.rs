//! Backend adapter port (driven/secondary port)
//!
//! This module defines the capability surface every remote storage backend
//! exposes to the transfer engine. Object stores and drive-style services
//! differ in identifier schemes, pagination and failure modes; adapters hide
//! those differences behind [`IBackendAdapter`] so the engine is written once.
//!
//! ## Design Notes
//!
//! - Errors use the typed [`BackendError`] rather than `anyhow` because the
//!   engine must tell transient faults (retried) from rejections (fatal).
//! - Uses `#[async_trait]` for async trait methods.
//! - The adapter is constructed before the engine runs and closed after it
//!   finishes; it carries no global state.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::entry::RemoteEntry;
use crate::domain::newtypes::RemoteHandle;

// ============================================================================
// Errors
// ============================================================================

/// Why a backend refused an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Unauthorized,
    Forbidden,
    NotFound,
    QuotaExceeded,
    Conflict,
    Invalid,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RejectReason::Unauthorized => "unauthorized",
            RejectReason::Forbidden => "forbidden",
            RejectReason::NotFound => "not found",
            RejectReason::QuotaExceeded => "quota exceeded",
            RejectReason::Conflict => "conflict",
            RejectReason::Invalid => "invalid request",
        };
        write!(f, "{}", s)
    }
}

/// Errors reported by a backend adapter
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Connection failure, timeout, throttling or server-side 5xx
    #[error("transient backend failure: {0}")]
    Transient(String),

    /// The backend asked the caller to wait before trying again
    #[error("backend throttled request, retry after {retry_after:?}: {message}")]
    Throttled {
        message: String,
        retry_after: Duration,
    },

    /// The backend refused the request; retrying will not help
    #[error("backend rejected request ({reason}): {message}")]
    Rejected {
        reason: RejectReason,
        message: String,
    },

    /// Committed content does not match the submitted digest
    #[error("integrity mismatch: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },
}

impl BackendError {
    /// Shorthand for a rejection
    pub fn rejected(reason: RejectReason, message: impl Into<String>) -> Self {
        BackendError::Rejected {
            reason,
            message: message.into(),
        }
    }

    /// Shorthand for a `NotFound` rejection
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::rejected(RejectReason::NotFound, message)
    }

    /// Returns true if the operation may succeed when repeated unchanged
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BackendError::Transient(_) | BackendError::Throttled { .. }
        )
    }

    /// Minimum wait the backend requested before the next attempt
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            BackendError::Throttled { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

// ============================================================================
// DTOs
// ============================================================================

/// Content digest a backend verifies at commit time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestAlgorithm {
    /// SHA-256, lowercase hex
    Sha256,
    /// OneDrive quickXorHash, base64
    QuickXor,
}

/// One page of a folder listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub entries: Vec<RemoteEntry>,
    /// Opaque token for the next page (`None` on the last page)
    pub next_page: Option<String>,
}

/// Destination of an upload in create-or-update mode
///
/// When `existing` is set the backend replaces that object's content in
/// place; otherwise it creates `name` under `parent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub parent: RemoteHandle,
    pub name: String,
    pub existing: Option<RemoteHandle>,
}

impl UploadTarget {
    pub fn create(parent: RemoteHandle, name: impl Into<String>) -> Self {
        Self {
            parent,
            name: name.into(),
            existing: None,
        }
    }

    pub fn update(parent: RemoteHandle, name: impl Into<String>, existing: RemoteHandle) -> Self {
        Self {
            parent,
            name: name.into(),
            existing: Some(existing),
        }
    }
}

/// A backend-tracked resumable upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    /// Backend-assigned identifier (an upload URL, an upload id, ...)
    pub session_id: String,
    /// Negotiated chunk size in bytes
    pub chunk_size: u64,
}

// ============================================================================
// IBackendAdapter trait
// ============================================================================

/// Port trait for remote storage operations
///
/// ## Implementation Notes
///
/// - `list_children` returns one page at a time. Callers pass the previous
///   page's `next_page` token back until it comes back `None`.
/// - Two entries of different kind may share a name within one folder on
///   some backends. Adapters report what exists; they never merge.
/// - `commit_session` carries the final chunk. Intermediate chunks go
///   through `append_chunk`.
/// - `download_range` is the primitive behind chunked downloads. The engine
///   drives its own cursor over it; no backend-side session is opened.
/// - Adapters must not retry internally. Retry policy belongs to the engine.
#[async_trait::async_trait]
pub trait IBackendAdapter: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &str;

    /// Handle of the namespace root
    fn root(&self) -> RemoteHandle;

    /// Digest the backend verifies at commit, if any
    fn digest_algorithm(&self) -> Option<DigestAlgorithm> {
        None
    }

    /// Lists one page of a folder's children
    ///
    /// # Arguments
    /// * `folder` - Folder to list
    /// * `page_token` - Token from the previous page, `None` for the first
    async fn list_children(
        &self,
        folder: &RemoteHandle,
        page_token: Option<&str>,
    ) -> BackendResult<ListPage>;

    /// Retrieves metadata for one entry
    async fn get_metadata(&self, handle: &RemoteHandle) -> BackendResult<RemoteEntry>;

    /// Creates a folder named `name` under `parent`
    async fn create_folder(&self, parent: &RemoteHandle, name: &str)
        -> BackendResult<RemoteEntry>;

    /// Uploads a whole file in one request
    async fn upload_small(&self, target: &UploadTarget, data: &[u8])
        -> BackendResult<RemoteEntry>;

    /// Opens a resumable upload session for `total_size` bytes
    async fn start_upload_session(
        &self,
        target: &UploadTarget,
        total_size: u64,
    ) -> BackendResult<UploadSession>;

    /// Sends one intermediate chunk starting at `offset`
    async fn append_chunk(
        &self,
        session: &UploadSession,
        offset: u64,
        data: &[u8],
    ) -> BackendResult<()>;

    /// Sends the final chunk and finishes the session
    ///
    /// # Arguments
    /// * `offset` - Offset of `data` within the file
    /// * `data` - The final chunk (may be shorter than the chunk size)
    /// * `total_size` - Size of the complete file
    /// * `digest` - Rolling digest of the whole file, when the backend verifies one
    async fn commit_session(
        &self,
        session: &UploadSession,
        offset: u64,
        data: &[u8],
        total_size: u64,
        digest: Option<&str>,
    ) -> BackendResult<RemoteEntry>;

    /// Downloads a whole file in one request
    async fn download_small(&self, handle: &RemoteHandle) -> BackendResult<Vec<u8>>;

    /// Downloads `length` bytes starting at `offset`
    async fn download_range(
        &self,
        handle: &RemoteHandle,
        offset: u64,
        length: u64,
    ) -> BackendResult<Vec<u8>>;

    /// Deletes a single entry
    async fn delete_entry(&self, handle: &RemoteHandle) -> BackendResult<()>;

    /// Releases backend resources at the end of a run
    async fn close(&self) -> BackendResult<()> {
        Ok(())
    }
}
