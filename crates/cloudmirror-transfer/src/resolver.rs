//! Logical path resolution
//!
//! Maps a slash-delimited [`LogicalPath`] to a backend handle by listing one
//! folder per segment. Resolution only lists: it never creates anything.

use std::collections::HashSet;

use cloudmirror_core::domain::{EntryKind, LogicalPath, RemoteEntry, RemoteHandle};
use cloudmirror_core::ports::{BackendError, BackendResult, IBackendAdapter, RejectReason};
use tracing::debug;

use crate::{Result, TransferError};

/// Outcome of looking up one name in one folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildLookup {
    /// An entry with the requested name and kind
    Found(RemoteEntry),
    /// Only an entry of the other kind carries the name
    KindConflict(RemoteEntry),
    Absent,
}

/// Every child of one folder, merged across pages in discovery order
#[derive(Debug, Clone, Default)]
pub struct FolderListing {
    entries: Vec<RemoteEntry>,
}

impl FolderListing {
    pub fn new(entries: Vec<RemoteEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[RemoteEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<RemoteEntry> {
        self.entries
    }

    /// Looks up `name` restricted to `kind`
    ///
    /// A same-kind match always wins. An opposite-kind entry with the same
    /// name is reported as a conflict only when no same-kind entry exists.
    pub fn lookup(&self, name: &str, kind: EntryKind) -> ChildLookup {
        let mut other = None;
        for entry in self.entries.iter().filter(|e| e.name == name) {
            if entry.kind == kind {
                return ChildLookup::Found(entry.clone());
            }
            other.get_or_insert(entry);
        }
        match other {
            Some(entry) => ChildLookup::KindConflict(entry.clone()),
            None => ChildLookup::Absent,
        }
    }
}

/// A resolved logical path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub handle: RemoteHandle,
    pub kind: EntryKind,
    /// The matched entry (`None` for the namespace root)
    pub entry: Option<RemoteEntry>,
}

/// Side-effect-free path resolution against one backend
pub struct PathResolver<'a> {
    backend: &'a dyn IBackendAdapter,
}

impl<'a> PathResolver<'a> {
    pub fn new(backend: &'a dyn IBackendAdapter) -> Self {
        Self { backend }
    }

    /// Lists every child of `folder`, following page tokens to the end
    pub async fn list_all(&self, folder: &RemoteHandle) -> BackendResult<FolderListing> {
        let mut entries = Vec::new();
        let mut token: Option<String> = None;
        let mut seen_tokens = HashSet::new();
        let mut pages = 0u32;

        loop {
            let page = self
                .backend
                .list_children(folder, token.as_deref())
                .await?;
            pages += 1;
            entries.extend(page.entries);

            match page.next_page {
                Some(next) => {
                    if !seen_tokens.insert(next.clone()) {
                        return Err(BackendError::rejected(
                            RejectReason::Invalid,
                            format!("listing of {folder} repeated page token '{next}'"),
                        ));
                    }
                    token = Some(next);
                }
                None => break,
            }
        }

        debug!(folder = %folder, pages, entries = entries.len(), "Listed folder");
        Ok(FolderListing::new(entries))
    }

    /// Existence check for a single name in a single folder
    pub async fn find_child(
        &self,
        folder: &RemoteHandle,
        name: &str,
        kind: EntryKind,
    ) -> BackendResult<ChildLookup> {
        Ok(self.list_all(folder).await?.lookup(name, kind))
    }

    /// Resolves `path` starting from `root`
    ///
    /// Intermediate segments must be folders. The final segment must match
    /// the kind implied by the path's trailing separator.
    ///
    /// # Errors
    /// - `PathNotFound` if any segment is missing
    /// - `NameKindConflict` if the final name exists only as the other kind
    pub async fn resolve(&self, root: &RemoteHandle, path: &LogicalPath) -> Result<Resolved> {
        let Some(name) = path.file_name() else {
            return Ok(Resolved {
                handle: root.clone(),
                kind: EntryKind::Folder,
                entry: None,
            });
        };

        let mut current = root.clone();
        let mut walked = LogicalPath::root();

        for segment in path.parent_segments() {
            walked = walked.join(segment, EntryKind::Folder)?;
            let listing = self
                .list_all(&current)
                .await
                .map_err(|e| TransferError::from_backend(walked.to_string(), e))?;
            match listing.lookup(segment, EntryKind::Folder) {
                ChildLookup::Found(entry) => {
                    debug!(segment = %segment, handle = %entry.handle, "Resolved segment");
                    current = entry.handle;
                }
                ChildLookup::KindConflict(_) | ChildLookup::Absent => {
                    return Err(TransferError::PathNotFound {
                        path: walked.to_string(),
                    });
                }
            }
        }

        let kind = path.target_kind();
        let listing = self
            .list_all(&current)
            .await
            .map_err(|e| TransferError::from_backend(path.to_string(), e))?;

        match listing.lookup(name, kind) {
            ChildLookup::Found(entry) => Ok(Resolved {
                handle: entry.handle.clone(),
                kind,
                entry: Some(entry),
            }),
            ChildLookup::KindConflict(entry) => Err(TransferError::NameKindConflict {
                path: path.to_string(),
                expected: kind,
                found: entry.kind,
            }),
            ChildLookup::Absent => Err(TransferError::PathNotFound {
                path: path.to_string(),
            }),
        }
    }
}
