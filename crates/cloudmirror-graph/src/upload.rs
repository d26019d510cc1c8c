//! File upload operations for Microsoft Graph API
//!
//! Implements two upload strategies:
//! - **Small files**: a single PUT of the whole content
//! - **Resumable sessions**: `createUploadSession`, then one PUT per chunk to
//!   the session's upload URL with a `Content-Range` header
//!
//! Every function works in create-or-update mode: an [`UploadTarget`] with
//! an `existing` item is addressed by ID, otherwise by `{parent}:/{name}:`.
//!
//! ## Graph API Endpoints
//!
//! - Small upload: `PUT /me/drive/items/{parent-id}:/{filename}:/content`
//!   or `PUT /me/drive/items/{item-id}/content`
//! - Create session: `POST /me/drive/items/{parent-id}:/{filename}:/createUploadSession`
//!   or `POST /me/drive/items/{item-id}/createUploadSession`
//! - Upload chunk: `PUT {uploadUrl}` with `Content-Range` header

use cloudmirror_core::ports::UploadTarget;
use reqwest::{Method, StatusCode};
use serde_json::json;
use tracing::debug;
use url::Url;

use crate::client::{parse_json, GraphClient};
use crate::items::{GraphDriveItem, UploadSessionResponse};
use crate::GraphError;

/// Chunk size for resumable uploads (10 MiB, a multiple of 320 KiB)
pub const CHUNK_SIZE: u64 = 10 * 1024 * 1024;

// ============================================================================
// API path construction helper
// ============================================================================

/// Builds the item URL for an upload target followed by `action`
///
/// # Examples
/// - create `a.txt` under `p1` → `/me/drive/items/p1:/a.txt:/content`
/// - update item `f9` → `/me/drive/items/f9/content`
pub fn target_url(
    client: &GraphClient,
    target: &UploadTarget,
    action: &str,
) -> Result<Url, GraphError> {
    match &target.existing {
        Some(existing) => client.endpoint(&["me", "drive", "items", existing.as_str(), action]),
        None => {
            let parent = format!("{}:", target.parent.as_str());
            let name = format!("{}:", target.name);
            client.endpoint(&["me", "drive", "items", &parent, &name, action])
        }
    }
}

// ============================================================================
// upload_small
// ============================================================================

/// Uploads a whole file in a single PUT request
///
/// # Returns
/// The created or updated DriveItem
pub async fn upload_small(
    client: &GraphClient,
    target: &UploadTarget,
    data: &[u8],
) -> Result<GraphDriveItem, GraphError> {
    let url = target_url(client, target, "content")?;
    debug!(name = %target.name, bytes = data.len(), "Uploading small file");

    let request = client
        .request_url(Method::PUT, url)
        .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
        .body(data.to_vec());
    client.send_json(request).await
}

// ============================================================================
// Upload sessions
// ============================================================================

/// Creates a resumable upload session
///
/// An existing item of the same name is replaced when the session commits.
///
/// # Returns
/// The pre-authenticated upload URL
pub async fn create_upload_session(
    client: &GraphClient,
    target: &UploadTarget,
) -> Result<String, GraphError> {
    let url = target_url(client, target, "createUploadSession")?;
    let body = json!({
        "item": {
            "@microsoft.graph.conflictBehavior": "replace"
        }
    });

    let response: UploadSessionResponse = client
        .send_json(client.request_url(Method::POST, url).json(&body))
        .await?;

    debug!(
        name = %target.name,
        expires = response.expiration_date_time.as_deref().unwrap_or("unknown"),
        "Upload session created"
    );
    Ok(response.upload_url)
}

/// Uploads a single chunk of data to a resumable upload session
///
/// # Arguments
/// * `upload_url` - The session URL from [`create_upload_session`]
/// * `data` - The chunk bytes to upload
/// * `offset` - Byte offset of this chunk within the total file
/// * `total` - Total file size in bytes
///
/// # Returns
/// - `Some(item)` with the completed DriveItem on the final chunk
/// - `None` for intermediate chunks (HTTP 202 Accepted)
pub async fn upload_chunk(
    client: &GraphClient,
    upload_url: &str,
    data: &[u8],
    offset: u64,
    total: u64,
) -> Result<Option<GraphDriveItem>, GraphError> {
    if data.is_empty() {
        return Err(GraphError::InvalidResponse(format!(
            "refusing to send an empty chunk at offset {offset}"
        )));
    }
    let chunk_len = data.len() as u64;
    let content_range = format!("bytes {}-{}/{}", offset, offset + chunk_len - 1, total);

    debug!(range = %content_range, bytes = chunk_len, "Uploading chunk");

    let request = client
        .request_unauthenticated(Method::PUT, upload_url)
        .header(reqwest::header::CONTENT_RANGE, &content_range)
        .body(data.to_vec());
    let response = client.send(request).await?;

    match response.status() {
        StatusCode::OK | StatusCode::CREATED => {
            debug!(status = %response.status(), "Upload session completed");
            Ok(Some(parse_json(response).await?))
        }
        status => {
            debug!(%status, "Chunk accepted");
            Ok(None)
        }
    }
}

/// Cancels an upload session, discarding the bytes received so far
pub async fn cancel_upload_session(
    client: &GraphClient,
    upload_url: &str,
) -> Result<(), GraphError> {
    client
        .send(client.request_unauthenticated(Method::DELETE, upload_url))
        .await?;
    debug!("Upload session cancelled");
    Ok(())
}
