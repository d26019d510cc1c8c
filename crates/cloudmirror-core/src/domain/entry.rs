//! Remote and local entry snapshots
//!
//! `RemoteEntry` is what a backend listing or metadata call returns.
//! `LocalTreeNode` is what the local walk produces. Both are immutable
//! snapshots that live only as long as the step that produced them.

use std::fs::Metadata;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::RemoteHandle;

/// Kind of an entry in either namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Folder,
}

impl EntryKind {
    /// The other kind
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            EntryKind::File => EntryKind::Folder,
            EntryKind::Folder => EntryKind::File,
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryKind::File => write!(f, "file"),
            EntryKind::Folder => write!(f, "folder"),
        }
    }
}

/// One object in the remote namespace, as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Backend-native identifier
    pub handle: RemoteHandle,
    /// Name within the parent folder
    pub name: String,
    pub kind: EntryKind,
    /// Size in bytes (files only)
    pub size: Option<u64>,
    /// Last modification time, when the backend reports one
    pub modified: Option<DateTime<Utc>>,
    /// Backend-reported content digest, in the backend's digest encoding
    pub digest: Option<String>,
}

impl RemoteEntry {
    /// Creates a folder entry with no size or timestamps
    pub fn folder(handle: RemoteHandle, name: impl Into<String>) -> Self {
        Self {
            handle,
            name: name.into(),
            kind: EntryKind::Folder,
            size: None,
            modified: None,
            digest: None,
        }
    }

    /// Creates a file entry of the given size
    pub fn file(handle: RemoteHandle, name: impl Into<String>, size: u64) -> Self {
        Self {
            handle,
            name: name.into(),
            kind: EntryKind::File,
            size: Some(size),
            modified: None,
            digest: None,
        }
    }

    /// Sets the modification time
    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = Some(modified);
        self
    }

    /// Sets the content digest
    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }

    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// An on-disk directory entry visited during traversal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTreeNode {
    pub path: PathBuf,
    pub name: String,
    pub kind: EntryKind,
    /// Size in bytes (zero for directories)
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl LocalTreeNode {
    /// Builds a node from already-fetched metadata
    ///
    /// Returns `None` for entries that are neither regular files nor
    /// directories (sockets, fifos, dangling links) and for names that are
    /// not valid UTF-8.
    pub fn from_metadata(path: &Path, metadata: &Metadata) -> Option<Self> {
        let kind = if metadata.is_file() {
            EntryKind::File
        } else if metadata.is_dir() {
            EntryKind::Folder
        } else {
            return None;
        };
        let name = path.file_name()?.to_str()?.to_string();
        let modified = metadata.modified().ok().map(DateTime::<Utc>::from);

        Some(Self {
            path: path.to_path_buf(),
            name,
            kind,
            size: if kind == EntryKind::File { metadata.len() } else { 0 },
            modified,
        })
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Folder
    }
}

/// Why an entry was not transferred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Name starts with `.`
    DotFile,
    /// Name starts with `@` or ends with `~`
    Temporary,
    /// Name ends with a configured generated-artifact suffix
    Generated,
    /// Name matches a configured glob pattern
    Pattern,
    /// Remote copy has the same size and modification time
    Unchanged,
    /// The decision policy declined the overwrite or descent
    Declined,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SkipReason::DotFile => "dotfile",
            SkipReason::Temporary => "temporary",
            SkipReason::Generated => "generated",
            SkipReason::Pattern => "pattern",
            SkipReason::Unchanged => "unchanged",
            SkipReason::Declined => "declined",
        };
        write!(f, "{}", s)
    }
}
