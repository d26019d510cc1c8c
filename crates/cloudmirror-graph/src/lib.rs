//! CloudMirror Graph - Microsoft Graph (OneDrive) backend adapter
//!
//! Provides:
//! - An authenticated HTTP client for the Graph v1.0 API
//! - Serde models for drive items and upload sessions
//! - [`GraphBackend`], an [`IBackendAdapter`] over a user's OneDrive
//!
//! Credential acquisition is external: the client is built from an access
//! token obtained elsewhere.
//!
//! ## Modules
//!
//! - [`client`] - Microsoft Graph API HTTP client
//! - [`items`] - Drive item and upload session response types
//! - [`provider`] - The backend adapter implementation
//! - [`upload`] - Small uploads and resumable upload sessions
//!
//! [`IBackendAdapter`]: cloudmirror_core::ports::IBackendAdapter

pub mod client;
pub mod items;
pub mod provider;
pub mod upload;

pub use provider::GraphBackend;

use std::time::Duration;

use cloudmirror_core::ports::{BackendError, RejectReason};
use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur when communicating with the Microsoft Graph API
#[derive(Debug, Error)]
pub enum GraphError {
    /// Authentication credentials are invalid or expired
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Insufficient permissions for the requested operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A conflict was detected (e.g., name already taken)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The drive has no room left (HTTP 507)
    #[error("Insufficient storage: {0}")]
    InsufficientStorage(String),

    /// Rate limit exceeded; retry after the specified duration
    #[error("Too many requests, retry after {retry_after:?}")]
    TooManyRequests {
        /// Duration to wait before retrying
        retry_after: Duration,
    },

    /// A server-side error occurred (5xx)
    #[error("Server error: {0}")]
    ServerError(String),

    /// Any other 4xx status
    #[error("Request rejected with status {status}: {message}")]
    BadRequest { status: u16, message: String },

    /// A network-level error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The API response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl GraphError {
    /// Classifies a non-success HTTP status
    ///
    /// # Arguments
    /// * `status` - The response status
    /// * `message` - Error text extracted from the response body
    /// * `retry_after` - Parsed `Retry-After` header, if any
    pub fn from_status(status: StatusCode, message: String, retry_after: Option<Duration>) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => GraphError::Unauthorized(message),
            StatusCode::FORBIDDEN => GraphError::Forbidden(message),
            StatusCode::NOT_FOUND => GraphError::NotFound(message),
            StatusCode::CONFLICT => GraphError::Conflict(message),
            StatusCode::INSUFFICIENT_STORAGE => GraphError::InsufficientStorage(message),
            StatusCode::TOO_MANY_REQUESTS => GraphError::TooManyRequests {
                retry_after: retry_after.unwrap_or(client::DEFAULT_RETRY_AFTER),
            },
            s if s.is_server_error() => GraphError::ServerError(format!("{s}: {message}")),
            s => GraphError::BadRequest {
                status: s.as_u16(),
                message,
            },
        }
    }

    /// Returns true if repeating the request unchanged may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            GraphError::TooManyRequests { .. } | GraphError::ServerError(_) => true,
            GraphError::NetworkError(e) => !e.is_decode() && !e.is_builder(),
            _ => false,
        }
    }
}

impl From<GraphError> for BackendError {
    fn from(err: GraphError) -> Self {
        let message = err.to_string();
        if let GraphError::TooManyRequests { retry_after } = err {
            return BackendError::Throttled {
                message,
                retry_after,
            };
        }
        let reason = match &err {
            GraphError::Unauthorized(_) => RejectReason::Unauthorized,
            GraphError::Forbidden(_) => RejectReason::Forbidden,
            GraphError::NotFound(_) => RejectReason::NotFound,
            GraphError::Conflict(_) => RejectReason::Conflict,
            GraphError::InsufficientStorage(_) => RejectReason::QuotaExceeded,
            _ if err.is_transient() => return BackendError::Transient(message),
            _ => RejectReason::Invalid,
        };
        BackendError::rejected(reason, message)
    }
}
