//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for backend identifiers and
//! logical remote paths. Each newtype ensures data validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entry::EntryKind;
use super::errors::DomainError;

// ============================================================================
// Backend handles
// ============================================================================

/// Opaque backend-native identifier for a remote file or folder
///
/// The engine never interprets the contents: a Graph item id, an object-store
/// key and a Drive file id are all just handles. The only invariant is that a
/// handle is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemoteHandle(String);

impl RemoteHandle {
    /// Create a new RemoteHandle
    ///
    /// # Errors
    /// Returns error if the handle is empty
    pub fn new(handle: impl Into<String>) -> Result<Self, DomainError> {
        let handle = handle.into();
        if handle.is_empty() {
            return Err(DomainError::InvalidHandle(
                "Remote handle cannot be empty".to_string(),
            ));
        }
        Ok(Self(handle))
    }

    /// The `root` alias drive-style backends accept for the namespace root
    #[must_use]
    pub fn root() -> Self {
        Self("root".to_string())
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RemoteHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RemoteHandle {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RemoteHandle {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Uuid> for RemoteHandle {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.to_string())
    }
}

impl From<RemoteHandle> for String {
    fn from(handle: RemoteHandle) -> Self {
        handle.0
    }
}

// ============================================================================
// Logical paths
// ============================================================================

/// A slash-delimited path in the remote namespace
///
/// The trailing separator decides the target kind: `docs/` names a folder,
/// `docs` names a file. The empty string and `/` both denote the namespace
/// root, which is always a folder. Leading and duplicate separators are
/// dropped during parsing; `.` and `..` segments are rejected.
///
/// Resolution never infers the kind. Whatever the caller wrote is checked
/// against what the backend actually holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LogicalPath {
    segments: Vec<String>,
    target: EntryKind,
}

impl LogicalPath {
    /// Parse a logical path
    ///
    /// # Errors
    /// Returns error if any segment is `.` or `..`
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        if raw.trim().is_empty() {
            return Ok(Self::root());
        }
        let target = if raw.ends_with('/') {
            EntryKind::Folder
        } else {
            EntryKind::File
        };

        let mut segments = Vec::new();
        for segment in raw.split('/').filter(|s| !s.is_empty()) {
            if segment == "." || segment == ".." {
                return Err(DomainError::InvalidPath(format!(
                    "Path contains relative segment '{segment}': {raw}"
                )));
            }
            segments.push(segment.to_string());
        }

        Ok(Self { segments, target })
    }

    /// The namespace root
    #[must_use]
    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
            target: EntryKind::Folder,
        }
    }

    /// Append a child segment with an explicit kind
    ///
    /// # Errors
    /// Returns error if `name` is empty, contains a separator, or is a
    /// relative segment
    pub fn join(&self, name: &str, kind: EntryKind) -> Result<Self, DomainError> {
        if name.is_empty() || name.contains('/') || name == "." || name == ".." {
            return Err(DomainError::InvalidPath(format!(
                "Invalid path segment: {name}"
            )));
        }
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Ok(Self {
            segments,
            target: kind,
        })
    }

    /// The ordered name segments, root excluded
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The kind implied by the trailing separator
    #[must_use]
    pub fn target_kind(&self) -> EntryKind {
        self.target
    }

    /// Returns true for the namespace root
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// The final segment, `None` for the root
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Every segment except the final one
    #[must_use]
    pub fn parent_segments(&self) -> &[String] {
        match self.segments.split_last() {
            Some((_, parents)) => parents,
            None => &[],
        }
    }
}

impl Display for LogicalPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        if self.target == EntryKind::Folder {
            write!(f, "/")?;
        }
        Ok(())
    }
}

impl FromStr for LogicalPath {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for LogicalPath {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<LogicalPath> for String {
    fn from(path: LogicalPath) -> Self {
        path.to_string()
    }
}
