//! In-process backend
//!
//! [`MemoryBackend`] implements the full [`IBackendAdapter`] surface over a
//! mutex-guarded node table. It behaves like a drive-style service: uuid
//! handles, paginated listings, upload sessions that check every offset,
//! and same-name entries of different kinds allowed side by side.
//!
//! Fault injection and call counters make it the reference backend for
//! engine tests:
//!
//! ```ignore
//! let backend = MemoryBackend::new().with_chunk_size(1024);
//! backend.inject_fault_at_offset(
//!     FaultPoint::AppendChunk,
//!     4096,
//!     BackendError::Transient("connection reset".into()),
//! );
//! ```

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cloudmirror_core::domain::{EntryKind, LogicalPath, RemoteEntry, RemoteHandle};
use cloudmirror_core::ports::{
    BackendError, BackendResult, DigestAlgorithm, IBackendAdapter, ListPage, RejectReason,
    UploadSession, UploadTarget,
};
use tracing::trace;
use uuid::Uuid;

use crate::digest::digest_bytes;

const DEFAULT_PAGE_SIZE: usize = 200;
const DEFAULT_CHUNK_SIZE: u64 = 10 * 1024 * 1024;

// ============================================================================
// Fault injection
// ============================================================================

/// Backend call a fault is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    ListChildren,
    GetMetadata,
    CreateFolder,
    UploadSmall,
    StartUploadSession,
    AppendChunk,
    CommitSession,
    DownloadSmall,
    DownloadRange,
    DeleteEntry,
}

#[derive(Debug, Clone)]
struct Fault {
    point: FaultPoint,
    /// Only fire for calls at this byte offset
    offset: Option<u64>,
    error: BackendError,
    /// Matching calls to let through before firing
    skip: u32,
    /// Keep firing instead of being consumed by the first hit
    persistent: bool,
}

/// Number of calls per backend operation, failed calls included
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub list_children: u32,
    pub get_metadata: u32,
    pub create_folder: u32,
    pub upload_small: u32,
    pub start_upload_session: u32,
    pub append_chunk: u32,
    pub commit_session: u32,
    pub download_small: u32,
    pub download_range: u32,
    pub delete_entry: u32,
}

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Clone)]
struct Node {
    name: String,
    kind: EntryKind,
    parent: Option<String>,
    /// Child ids in creation order
    children: Vec<String>,
    content: Vec<u8>,
    modified: DateTime<Utc>,
    digest: Option<String>,
}

#[derive(Debug)]
struct PendingUpload {
    target: UploadTarget,
    total_size: u64,
    received: Vec<u8>,
}

#[derive(Debug, Default)]
struct State {
    nodes: HashMap<String, Node>,
    sessions: HashMap<String, PendingUpload>,
    faults: Vec<Fault>,
    corrupt_next_commit: bool,
    calls: CallCounts,
}

/// In-memory [`IBackendAdapter`]
#[derive(Debug)]
pub struct MemoryBackend {
    state: Mutex<State>,
    page_size: usize,
    chunk_size: u64,
    digest: Option<DigestAlgorithm>,
    max_range_response: Option<u64>,
}

impl MemoryBackend {
    /// Empty namespace: a root folder and nothing else
    pub fn new() -> Self {
        let mut state = State::default();
        state.nodes.insert(
            RemoteHandle::root().as_str().to_string(),
            Node {
                name: String::new(),
                kind: EntryKind::Folder,
                parent: None,
                children: Vec::new(),
                content: Vec::new(),
                modified: Utc::now(),
                digest: None,
            },
        );
        Self {
            state: Mutex::new(state),
            page_size: DEFAULT_PAGE_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            digest: None,
            max_range_response: None,
        }
    }

    /// Entries per listing page
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Chunk size handed out by `start_upload_session`
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Verify and report content digests with `algorithm`
    #[must_use]
    pub fn with_digest(mut self, algorithm: DigestAlgorithm) -> Self {
        self.digest = Some(algorithm);
        self
    }

    /// Cap ranged reads, simulating short responses
    #[must_use]
    pub fn with_max_range_response(mut self, max: u64) -> Self {
        self.max_range_response = Some(max.max(1));
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // Fixtures
    // ========================================================================

    /// Fails the next call at `point` with `error`
    pub fn inject_fault(&self, point: FaultPoint, error: BackendError) {
        self.push_fault(point, None, 0, error, false);
    }

    /// Lets `calls` calls at `point` succeed, then fails the next one
    pub fn inject_fault_after(&self, point: FaultPoint, calls: u32, error: BackendError) {
        self.push_fault(point, None, calls, error, false);
    }

    /// Fails the next call at `point` whose offset is `offset`
    pub fn inject_fault_at_offset(&self, point: FaultPoint, offset: u64, error: BackendError) {
        self.push_fault(point, Some(offset), 0, error, false);
    }

    /// Fails every call at `point` until [`clear_faults`](Self::clear_faults)
    pub fn inject_persistent_fault(&self, point: FaultPoint, error: BackendError) {
        self.push_fault(point, None, 0, error, true);
    }

    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    /// Flips one byte of the next committed upload before it is verified
    pub fn corrupt_next_commit(&self) {
        self.lock().corrupt_next_commit = true;
    }

    fn push_fault(
        &self,
        point: FaultPoint,
        offset: Option<u64>,
        skip: u32,
        error: BackendError,
        persistent: bool,
    ) {
        self.lock().faults.push(Fault {
            point,
            offset,
            error,
            skip,
            persistent,
        });
    }

    /// Creates a folder fixture under `parent`
    pub fn add_folder(&self, parent: &RemoteHandle, name: &str) -> BackendResult<RemoteHandle> {
        let mut state = self.lock();
        insert_node(&mut state, parent.as_str(), name, EntryKind::Folder, Vec::new(), None)
    }

    /// Creates a file fixture under `parent`
    pub fn add_file(
        &self,
        parent: &RemoteHandle,
        name: &str,
        content: impl Into<Vec<u8>>,
    ) -> BackendResult<RemoteHandle> {
        let content = content.into();
        let digest = self.digest.map(|alg| digest_bytes(alg, &content));
        let mut state = self.lock();
        insert_node(&mut state, parent.as_str(), name, EntryKind::File, content, digest)
    }

    /// Creates a file fixture with an explicit modification time
    pub fn add_file_with_modified(
        &self,
        parent: &RemoteHandle,
        name: &str,
        content: impl Into<Vec<u8>>,
        modified: DateTime<Utc>,
    ) -> BackendResult<RemoteHandle> {
        let handle = self.add_file(parent, name, content)?;
        if let Some(node) = self.lock().nodes.get_mut(handle.as_str()) {
            node.modified = modified;
        }
        Ok(handle)
    }

    /// Replaces the digest reported for `handle`
    pub fn override_digest(&self, handle: &RemoteHandle, digest: impl Into<String>) {
        if let Some(node) = self.lock().nodes.get_mut(handle.as_str()) {
            node.digest = Some(digest.into());
        }
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub fn calls(&self) -> CallCounts {
        self.lock().calls.clone()
    }

    /// Upload sessions started but neither committed nor abandoned
    pub fn open_sessions(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Content of a file
    pub fn content(&self, handle: &RemoteHandle) -> Option<Vec<u8>> {
        let state = self.lock();
        state
            .nodes
            .get(handle.as_str())
            .filter(|n| n.kind == EntryKind::File)
            .map(|n| n.content.clone())
    }

    /// Looks an entry up by logical path (`/a/b/` for folders, `/a/b` for files)
    pub fn find_path(&self, path: &str) -> Option<RemoteEntry> {
        let path = LogicalPath::parse(path).ok()?;
        let state = self.lock();
        let mut current = RemoteHandle::root().as_str().to_string();
        let last = path.segments().len();
        for (i, segment) in path.segments().iter().enumerate() {
            let kind = if i + 1 == last {
                path.target_kind()
            } else {
                EntryKind::Folder
            };
            let node = state.nodes.get(&current)?;
            current = node
                .children
                .iter()
                .find(|id| {
                    state
                        .nodes
                        .get(id.as_str())
                        .is_some_and(|c| c.name == *segment && c.kind == kind)
                })?
                .clone();
        }
        to_entry(&current, state.nodes.get(&current)?).ok()
    }

    /// Child names of a folder in creation order
    pub fn children_names(&self, folder: &RemoteHandle) -> Vec<String> {
        let state = self.lock();
        state
            .nodes
            .get(folder.as_str())
            .map(|n| {
                n.children
                    .iter()
                    .filter_map(|id| state.nodes.get(id).map(|c| c.name.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Total number of entries, root excluded
    pub fn entry_count(&self) -> usize {
        self.lock().nodes.len().saturating_sub(1)
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Helpers
// ============================================================================

impl State {
    /// Counts the call and fires a matching fault, if any
    fn enter(&mut self, point: FaultPoint, offset: Option<u64>) -> BackendResult<()> {
        let calls = &mut self.calls;
        let counter = match point {
            FaultPoint::ListChildren => &mut calls.list_children,
            FaultPoint::GetMetadata => &mut calls.get_metadata,
            FaultPoint::CreateFolder => &mut calls.create_folder,
            FaultPoint::UploadSmall => &mut calls.upload_small,
            FaultPoint::StartUploadSession => &mut calls.start_upload_session,
            FaultPoint::AppendChunk => &mut calls.append_chunk,
            FaultPoint::CommitSession => &mut calls.commit_session,
            FaultPoint::DownloadSmall => &mut calls.download_small,
            FaultPoint::DownloadRange => &mut calls.download_range,
            FaultPoint::DeleteEntry => &mut calls.delete_entry,
        };
        *counter += 1;

        let hit = self.faults.iter().position(|f| {
            f.point == point && (f.offset.is_none() || f.offset == offset)
        });
        match hit {
            Some(index) if self.faults[index].skip > 0 => {
                self.faults[index].skip -= 1;
                Ok(())
            }
            Some(index) if self.faults[index].persistent => Err(self.faults[index].error.clone()),
            Some(index) => Err(self.faults.remove(index).error),
            None => Ok(()),
        }
    }

    fn node(&self, handle: &str) -> BackendResult<&Node> {
        self.nodes
            .get(handle)
            .ok_or_else(|| BackendError::not_found(format!("no entry with handle {handle}")))
    }

    fn folder(&self, handle: &str) -> BackendResult<&Node> {
        let node = self.node(handle)?;
        if node.kind != EntryKind::Folder {
            return Err(BackendError::rejected(
                RejectReason::Invalid,
                format!("{handle} is not a folder"),
            ));
        }
        Ok(node)
    }

    fn child_named(&self, parent: &str, name: &str, kind: EntryKind) -> Option<&str> {
        self.nodes.get(parent)?.children.iter().find_map(|id| {
            let child = self.nodes.get(id)?;
            (child.name == name && child.kind == kind).then_some(id.as_str())
        })
    }

    /// Writes a committed file, in place when `target.existing` is set
    fn store_file(
        &mut self,
        target: &UploadTarget,
        content: Vec<u8>,
        digest: Option<String>,
    ) -> BackendResult<RemoteEntry> {
        let id = match &target.existing {
            Some(existing) => {
                let node = self
                    .nodes
                    .get_mut(existing.as_str())
                    .filter(|n| n.kind == EntryKind::File)
                    .ok_or_else(|| BackendError::not_found(format!("no file {existing}")))?;
                node.content = content;
                node.digest = digest;
                node.modified = Utc::now();
                existing.as_str().to_string()
            }
            None => {
                let handle = insert_node(
                    self,
                    target.parent.as_str(),
                    &target.name,
                    EntryKind::File,
                    content,
                    digest,
                )?;
                handle.as_str().to_string()
            }
        };
        to_entry(&id, self.node(&id)?)
    }
}

fn insert_node(
    state: &mut State,
    parent: &str,
    name: &str,
    kind: EntryKind,
    content: Vec<u8>,
    digest: Option<String>,
) -> BackendResult<RemoteHandle> {
    if name.is_empty() || name.contains('/') {
        return Err(BackendError::rejected(
            RejectReason::Invalid,
            format!("invalid name '{name}'"),
        ));
    }
    state.folder(parent)?;
    if state.child_named(parent, name, kind).is_some() {
        return Err(BackendError::rejected(
            RejectReason::Conflict,
            format!("a {kind} named '{name}' already exists"),
        ));
    }

    let handle = RemoteHandle::from(Uuid::new_v4());
    let id = handle.as_str().to_string();
    state.nodes.insert(
        id.clone(),
        Node {
            name: name.to_string(),
            kind,
            parent: Some(parent.to_string()),
            children: Vec::new(),
            content,
            modified: Utc::now(),
            digest,
        },
    );
    if let Some(parent) = state.nodes.get_mut(parent) {
        parent.children.push(id);
    }
    Ok(handle)
}

fn to_entry(id: &str, node: &Node) -> BackendResult<RemoteEntry> {
    let handle = RemoteHandle::new(id)
        .map_err(|e| BackendError::rejected(RejectReason::Invalid, e.to_string()))?;
    let entry = match node.kind {
        EntryKind::Folder => RemoteEntry::folder(handle, node.name.as_str()),
        EntryKind::File => {
            let entry = RemoteEntry::file(handle, node.name.as_str(), node.content.len() as u64);
            match &node.digest {
                Some(digest) => entry.with_digest(digest.as_str()),
                None => entry,
            }
        }
    };
    Ok(entry.with_modified(node.modified))
}

fn check_offset(pending: &PendingUpload, offset: u64, len: usize) -> BackendResult<()> {
    let received = pending.received.len() as u64;
    if offset != received {
        return Err(BackendError::rejected(
            RejectReason::Invalid,
            format!("expected offset {received}, got {offset}"),
        ));
    }
    if len == 0 || received + len as u64 > pending.total_size {
        return Err(BackendError::rejected(
            RejectReason::Invalid,
            format!(
                "chunk of {len} bytes at {offset} does not fit a {} byte upload",
                pending.total_size
            ),
        ));
    }
    Ok(())
}

// ============================================================================
// IBackendAdapter
// ============================================================================

#[async_trait]
impl IBackendAdapter for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn root(&self) -> RemoteHandle {
        RemoteHandle::root()
    }

    fn digest_algorithm(&self) -> Option<DigestAlgorithm> {
        self.digest
    }

    async fn list_children(
        &self,
        folder: &RemoteHandle,
        page_token: Option<&str>,
    ) -> BackendResult<ListPage> {
        let mut state = self.lock();
        state.enter(FaultPoint::ListChildren, None)?;

        let start = match page_token {
            None => 0,
            Some(token) => token.parse::<usize>().map_err(|_| {
                BackendError::rejected(RejectReason::Invalid, format!("bad page token '{token}'"))
            })?,
        };
        let node = state.folder(folder.as_str())?;
        let end = (start + self.page_size).min(node.children.len());
        let entries = node
            .children
            .get(start..end)
            .unwrap_or_default()
            .iter()
            .map(|id| to_entry(id, state.node(id)?))
            .collect::<BackendResult<Vec<_>>>()?;
        let next_page = (end < node.children.len()).then(|| end.to_string());

        trace!(folder = %folder, start, count = entries.len(), "Listed page");
        Ok(ListPage { entries, next_page })
    }

    async fn get_metadata(&self, handle: &RemoteHandle) -> BackendResult<RemoteEntry> {
        let mut state = self.lock();
        state.enter(FaultPoint::GetMetadata, None)?;
        to_entry(handle.as_str(), state.node(handle.as_str())?)
    }

    async fn create_folder(
        &self,
        parent: &RemoteHandle,
        name: &str,
    ) -> BackendResult<RemoteEntry> {
        let mut state = self.lock();
        state.enter(FaultPoint::CreateFolder, None)?;
        let handle = insert_node(
            &mut state,
            parent.as_str(),
            name,
            EntryKind::Folder,
            Vec::new(),
            None,
        )?;
        to_entry(handle.as_str(), state.node(handle.as_str())?)
    }

    async fn upload_small(
        &self,
        target: &UploadTarget,
        data: &[u8],
    ) -> BackendResult<RemoteEntry> {
        let mut state = self.lock();
        state.enter(FaultPoint::UploadSmall, None)?;
        let digest = self.digest.map(|alg| digest_bytes(alg, data));
        state.store_file(target, data.to_vec(), digest)
    }

    async fn start_upload_session(
        &self,
        target: &UploadTarget,
        total_size: u64,
    ) -> BackendResult<UploadSession> {
        let mut state = self.lock();
        state.enter(FaultPoint::StartUploadSession, None)?;
        state.folder(target.parent.as_str())?;

        let session_id = Uuid::new_v4().to_string();
        state.sessions.insert(
            session_id.clone(),
            PendingUpload {
                target: target.clone(),
                total_size,
                received: Vec::new(),
            },
        );
        Ok(UploadSession {
            session_id,
            chunk_size: self.chunk_size,
        })
    }

    async fn append_chunk(
        &self,
        session: &UploadSession,
        offset: u64,
        data: &[u8],
    ) -> BackendResult<()> {
        let mut state = self.lock();
        state.enter(FaultPoint::AppendChunk, Some(offset))?;
        let pending = state.sessions.get_mut(&session.session_id).ok_or_else(|| {
            BackendError::not_found(format!("no upload session {}", session.session_id))
        })?;
        check_offset(pending, offset, data.len())?;
        pending.received.extend_from_slice(data);
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
        let mut state = self.lock();
        state.enter(FaultPoint::CommitSession, Some(offset))?;
        let pending = state.sessions.get(&session.session_id).ok_or_else(|| {
            BackendError::not_found(format!("no upload session {}", session.session_id))
        })?;
        check_offset(pending, offset, data.len())?;
        if pending.total_size != total_size || offset + data.len() as u64 != total_size {
            return Err(BackendError::rejected(
                RejectReason::Invalid,
                format!("commit does not complete a {} byte upload", pending.total_size),
            ));
        }

        let mut pending = state
            .sessions
            .remove(&session.session_id)
            .ok_or_else(|| BackendError::not_found("upload session vanished"))?;
        pending.received.extend_from_slice(data);
        if std::mem::take(&mut state.corrupt_next_commit) {
            if let Some(byte) = pending.received.last_mut() {
                *byte ^= 0xFF;
            }
        }

        let actual = self.digest.map(|alg| digest_bytes(alg, &pending.received));
        if let (Some(expected), Some(actual)) = (digest, actual.as_deref()) {
            if expected != actual {
                return Err(BackendError::IntegrityMismatch {
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
        }

        state.store_file(&pending.target, pending.received, actual)
    }

    async fn download_small(&self, handle: &RemoteHandle) -> BackendResult<Vec<u8>> {
        let mut state = self.lock();
        state.enter(FaultPoint::DownloadSmall, None)?;
        let node = state.node(handle.as_str())?;
        if node.kind != EntryKind::File {
            return Err(BackendError::rejected(
                RejectReason::Invalid,
                format!("{handle} is not a file"),
            ));
        }
        Ok(node.content.clone())
    }

    async fn download_range(
        &self,
        handle: &RemoteHandle,
        offset: u64,
        length: u64,
    ) -> BackendResult<Vec<u8>> {
        let mut state = self.lock();
        state.enter(FaultPoint::DownloadRange, Some(offset))?;
        let node = state.node(handle.as_str())?;
        let size = node.content.len() as u64;
        if node.kind != EntryKind::File || offset >= size {
            return Err(BackendError::rejected(
                RejectReason::Invalid,
                format!("range at {offset} is not satisfiable for {handle}"),
            ));
        }
        let length = match self.max_range_response {
            Some(max) => length.min(max),
            None => length,
        };
        let end = (offset + length).min(size);
        Ok(node.content[offset as usize..end as usize].to_vec())
    }

    async fn delete_entry(&self, handle: &RemoteHandle) -> BackendResult<()> {
        let mut state = self.lock();
        state.enter(FaultPoint::DeleteEntry, None)?;
        let node = state.node(handle.as_str())?;
        let Some(parent) = node.parent.clone() else {
            return Err(BackendError::rejected(
                RejectReason::Forbidden,
                "the root folder cannot be deleted",
            ));
        };
        if !node.children.is_empty() {
            return Err(BackendError::rejected(
                RejectReason::Conflict,
                format!("folder {handle} is not empty"),
            ));
        }

        state.nodes.remove(handle.as_str());
        if let Some(parent) = state.nodes.get_mut(&parent) {
            parent.children.retain(|id| id != handle.as_str());
        }
        Ok(())
    }
}
