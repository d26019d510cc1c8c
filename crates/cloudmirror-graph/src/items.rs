//! Graph API response types
//!
//! Serde models for the subset of the DriveItem resource the backend reads,
//! plus folder listing pages and upload session responses. Fields are
//! optional where the service omits them for some item kinds.

use chrono::{DateTime, Utc};
use cloudmirror_core::domain::{RemoteEntry, RemoteHandle};
use serde::Deserialize;

use crate::GraphError;

// ============================================================================
// DriveItem
// ============================================================================

/// A DriveItem as returned by item, children and upload endpoints
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDriveItem {
    /// OneDrive item ID
    pub id: String,
    /// Item name (file or folder name)
    pub name: String,
    /// Size in bytes (folders report the total of their contents)
    pub size: Option<u64>,
    /// Last modified timestamp in ISO 8601 format
    pub last_modified_date_time: Option<String>,
    /// Present if the item is a file (contains hashes)
    pub file: Option<FileFacet>,
    /// Present if the item is a folder
    pub folder: Option<serde_json::Value>,
    /// Present if the item has been deleted
    pub deleted: Option<serde_json::Value>,
}

/// File-specific metadata in a DriveItem response
#[derive(Debug, Deserialize)]
pub struct FileFacet {
    /// File content hashes
    pub hashes: Option<FileHashes>,
}

/// Content hashes for a file
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHashes {
    /// QuickXorHash used by OneDrive for integrity verification
    pub quick_xor_hash: Option<String>,
}

impl GraphDriveItem {
    /// The item's quickXorHash, if the service reported one
    pub fn quick_xor_hash(&self) -> Option<&str> {
        self.file
            .as_ref()
            .and_then(|f| f.hashes.as_ref())
            .and_then(|h| h.quick_xor_hash.as_deref())
    }

    /// Converts the item into a backend-neutral entry
    ///
    /// Anything that is not a folder is treated as a file: packages such
    /// as OneNote notebooks carry neither facet but download as content.
    ///
    /// # Errors
    /// Returns [`GraphError::InvalidResponse`] if the item has an empty ID.
    pub fn into_entry(self) -> Result<RemoteEntry, GraphError> {
        let handle = RemoteHandle::new(self.id.as_str())
            .map_err(|e| GraphError::InvalidResponse(format!("item '{}': {e}", self.name)))?;

        let modified = self
            .last_modified_date_time
            .as_deref()
            .and_then(|s| s.parse::<DateTime<Utc>>().ok());

        let mut entry = if self.folder.is_some() {
            RemoteEntry::folder(handle, self.name.as_str())
        } else {
            let digest = self.quick_xor_hash().map(str::to_string);
            let mut entry = RemoteEntry::file(handle, self.name.as_str(), self.size.unwrap_or(0));
            if let Some(digest) = digest {
                entry = entry.with_digest(digest);
            }
            entry
        };
        if let Some(modified) = modified {
            entry = entry.with_modified(modified);
        }
        Ok(entry)
    }
}

// ============================================================================
// Listing and sessions
// ============================================================================

/// One page of `GET /items/{id}/children`
#[derive(Debug, Deserialize)]
pub struct ChildrenPage {
    #[serde(default)]
    pub value: Vec<GraphDriveItem>,
    /// Absolute URL of the next page
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

/// Response from creating an upload session
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSessionResponse {
    /// The URL to use for uploading chunks
    pub upload_url: String,
    /// Session expiry, informational only
    pub expiration_date_time: Option<String>,
}
