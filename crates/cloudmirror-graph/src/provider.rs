//! Graph backend adapter
//!
//! Implements [`IBackendAdapter`] over a user's OneDrive through the
//! Microsoft Graph API. Handles are DriveItem IDs, with the `root` alias for
//! the drive root. The service verifies uploads with quickXorHash.
//!
//! Upload sessions are tracked by upload URL together with their declared
//! size, since every chunk's `Content-Range` must repeat the total. Sessions
//! still open when [`close`](IBackendAdapter::close) runs are cancelled.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use cloudmirror_core::domain::{RemoteEntry, RemoteHandle};
use cloudmirror_core::ports::{
    BackendError, BackendResult, DigestAlgorithm, IBackendAdapter, ListPage, RejectReason,
    UploadSession, UploadTarget,
};
use reqwest::{Method, StatusCode};
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use crate::client::GraphClient;
use crate::items::{ChildrenPage, GraphDriveItem};
use crate::upload::{self, CHUNK_SIZE};
use crate::GraphError;

/// [`IBackendAdapter`] backed by Microsoft Graph
#[derive(Debug)]
pub struct GraphBackend {
    client: GraphClient,
    /// Requested listing page size (`$top`); the service default when unset
    page_size: Option<u32>,
    /// Open upload sessions: upload URL to declared total size
    sessions: Mutex<HashMap<String, u64>>,
}

impl GraphBackend {
    /// Creates a new backend over an authenticated client
    pub fn new(client: GraphClient) -> Self {
        Self {
            client,
            page_size: None,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Requests listing pages of at most `size` items
    #[must_use]
    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Returns a reference to the underlying client
    pub fn client(&self) -> &GraphClient {
        &self.client
    }

    /// Number of upload sessions opened and not yet committed or cancelled
    pub fn open_sessions(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn item_url(&self, handle: &RemoteHandle, action: Option<&str>) -> Result<Url, GraphError> {
        match action {
            Some(action) => self
                .client
                .endpoint(&["me", "drive", "items", handle.as_str(), action]),
            None => self.client.endpoint(&["me", "drive", "items", handle.as_str()]),
        }
    }

    fn session_total(&self, session: &UploadSession) -> BackendResult<u64> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&session.session_id)
            .copied()
            .ok_or_else(|| {
                BackendError::rejected(
                    RejectReason::Invalid,
                    format!("unknown upload session {}", session.session_id),
                )
            })
    }
}

/// Compares the service-computed hash with the one the engine submitted
fn verify_digest(item: &GraphDriveItem, expected: Option<&str>) -> BackendResult<()> {
    let (Some(expected), Some(actual)) = (expected, item.quick_xor_hash()) else {
        debug!(name = %item.name, "No digest to compare on commit");
        return Ok(());
    };
    if expected != actual {
        return Err(BackendError::IntegrityMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}

#[async_trait::async_trait]
impl IBackendAdapter for GraphBackend {
    fn name(&self) -> &str {
        "onedrive"
    }

    fn root(&self) -> RemoteHandle {
        RemoteHandle::root()
    }

    fn digest_algorithm(&self) -> Option<DigestAlgorithm> {
        Some(DigestAlgorithm::QuickXor)
    }

    async fn list_children(
        &self,
        folder: &RemoteHandle,
        page_token: Option<&str>,
    ) -> BackendResult<ListPage> {
        let url = match page_token {
            Some(token) => Url::parse(token).map_err(|e| {
                BackendError::rejected(
                    RejectReason::Invalid,
                    format!("malformed page token '{token}': {e}"),
                )
            })?,
            None => {
                let mut url = self.item_url(folder, Some("children"))?;
                if let Some(top) = self.page_size {
                    url.query_pairs_mut().append_pair("$top", &top.to_string());
                }
                url
            }
        };

        let page: ChildrenPage = self
            .client
            .send_json(self.client.request_url(Method::GET, url))
            .await?;

        let entries = page
            .value
            .into_iter()
            .filter(|item| item.deleted.is_none())
            .map(GraphDriveItem::into_entry)
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            folder = %folder,
            count = entries.len(),
            more = page.next_link.is_some(),
            "Listed children"
        );
        Ok(ListPage {
            entries,
            next_page: page.next_link,
        })
    }

    async fn get_metadata(&self, handle: &RemoteHandle) -> BackendResult<RemoteEntry> {
        let url = self.item_url(handle, None)?;
        let item: GraphDriveItem = self
            .client
            .send_json(self.client.request_url(Method::GET, url))
            .await?;
        Ok(item.into_entry()?)
    }

    async fn create_folder(
        &self,
        parent: &RemoteHandle,
        name: &str,
    ) -> BackendResult<RemoteEntry> {
        let url = self.item_url(parent, Some("children"))?;
        let body = json!({
            "name": name,
            "folder": {},
            "@microsoft.graph.conflictBehavior": "fail"
        });

        let item: GraphDriveItem = self
            .client
            .send_json(self.client.request_url(Method::POST, url).json(&body))
            .await?;
        debug!(parent = %parent, name, id = %item.id, "Folder created");
        Ok(item.into_entry()?)
    }

    async fn upload_small(&self, target: &UploadTarget, data: &[u8]) -> BackendResult<RemoteEntry> {
        let item = upload::upload_small(&self.client, target, data).await?;
        Ok(item.into_entry()?)
    }

    async fn start_upload_session(
        &self,
        target: &UploadTarget,
        total_size: u64,
    ) -> BackendResult<UploadSession> {
        let upload_url = upload::create_upload_session(&self.client, target).await?;
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(upload_url.clone(), total_size);

        Ok(UploadSession {
            session_id: upload_url,
            chunk_size: CHUNK_SIZE,
        })
    }

    async fn append_chunk(
        &self,
        session: &UploadSession,
        offset: u64,
        data: &[u8],
    ) -> BackendResult<()> {
        let total = self.session_total(session)?;
        let completed =
            upload::upload_chunk(&self.client, &session.session_id, data, offset, total).await?;
        if completed.is_some() {
            return Err(GraphError::InvalidResponse(format!(
                "session completed early at offset {offset} of {total}"
            ))
            .into());
        }
        Ok(())
    }

    async fn commit_session(
        &self,
        session: &UploadSession,
        offset: u64,
        data: &[u8],
        total_size: u64,
        digest: Option<&str>,
    ) -> BackendResult<RemoteEntry> {
        let item = upload::upload_chunk(&self.client, &session.session_id, data, offset, total_size)
            .await?
            .ok_or_else(|| {
                GraphError::InvalidResponse(format!(
                    "final chunk at offset {offset} did not complete the session"
                ))
            })?;

        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&session.session_id);

        verify_digest(&item, digest)?;
        Ok(item.into_entry()?)
    }

    async fn download_small(&self, handle: &RemoteHandle) -> BackendResult<Vec<u8>> {
        let url = self.item_url(handle, Some("content"))?;
        let response = self
            .client
            .send(self.client.request_url(Method::GET, url))
            .await?;
        let bytes = response.bytes().await.map_err(GraphError::from)?;
        debug!(id = %handle, bytes = bytes.len(), "Downloaded file");
        Ok(bytes.to_vec())
    }

    async fn download_range(
        &self,
        handle: &RemoteHandle,
        offset: u64,
        length: u64,
    ) -> BackendResult<Vec<u8>> {
        if length == 0 {
            return Ok(Vec::new());
        }
        let url = self.item_url(handle, Some("content"))?;
        let range = format!("bytes={}-{}", offset, offset + length - 1);
        let response = self
            .client
            .send(
                self.client
                    .request_url(Method::GET, url)
                    .header(reqwest::header::RANGE, &range),
            )
            .await?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(GraphError::from)?;
        if status == StatusCode::PARTIAL_CONTENT {
            return Ok(bytes.to_vec());
        }

        // The service ignored the range and sent the whole file
        warn!(id = %handle, %range, %status, "Range not honoured, slicing full body");
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(bytes.len());
        let end = usize::try_from(offset + length)
            .unwrap_or(usize::MAX)
            .min(bytes.len());
        Ok(bytes[start..end].to_vec())
    }

    async fn delete_entry(&self, handle: &RemoteHandle) -> BackendResult<()> {
        let url = self.item_url(handle, None)?;
        self.client
            .send(self.client.request_url(Method::DELETE, url))
            .await?;
        debug!(id = %handle, "Deleted item");
        Ok(())
    }

    async fn close(&self) -> BackendResult<()> {
        let abandoned: Vec<String> = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(url, _)| url)
            .collect();

        for upload_url in abandoned {
            if let Err(e) = upload::cancel_upload_session(&self.client, &upload_url).await {
                warn!(error = %e, "Failed to cancel abandoned upload session");
            }
        }
        Ok(())
    }
}
