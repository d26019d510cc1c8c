//! Local tree traversal for uploads
//!
//! Pre-order walk: at each directory level the remote folder is ensured
//! first, then its files are uploaded, then its subdirectories are visited.
//! The first error ends the whole walk.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use cloudmirror_core::domain::{
    EntryKind, LocalTreeNode, LogicalPath, RemoteEntry, RemoteHandle, SkipReason,
};
use cloudmirror_core::ports::{
    Decision, IBackendAdapter, IDecisionPolicy, ITransferObserver, UploadTarget,
};
use tracing::{debug, warn};

use crate::chunked::ChunkedTransfer;
use crate::mirror::RemoteMirror;
use crate::options::TransferOptions;
use crate::report::TransferReport;
use crate::resolver::{ChildLookup, FolderListing, PathResolver};
use crate::skip::SkipFilter;
use crate::{Result, TransferError};

/// Drives uploads of a local file or directory tree
pub struct TreeWalker<'a> {
    backend: &'a dyn IBackendAdapter,
    options: &'a TransferOptions,
    skip: &'a SkipFilter,
    policy: &'a dyn IDecisionPolicy,
    observer: &'a dyn ITransferObserver,
}

impl<'a> TreeWalker<'a> {
    pub fn new(
        backend: &'a dyn IBackendAdapter,
        options: &'a TransferOptions,
        skip: &'a SkipFilter,
        policy: &'a dyn IDecisionPolicy,
        observer: &'a dyn ITransferObserver,
    ) -> Self {
        Self {
            backend,
            options,
            skip,
            policy,
            observer,
        }
    }

    /// Uploads `local_root` into the remote folder `dest`
    ///
    /// A file lands as `dest/<name>`. A directory is reproduced as
    /// `dest/<dirname>/...` rather than flattened into `dest`. The root
    /// itself is never subject to the skip filter; everything below it is.
    pub async fn upload(
        &self,
        local_root: &Path,
        dest: &RemoteHandle,
        dest_path: &LogicalPath,
        report: &mut TransferReport,
    ) -> Result<()> {
        let canonical = tokio::fs::canonicalize(local_root)
            .await
            .map_err(|e| TransferError::local_io(local_root, e))?;
        let metadata = tokio::fs::metadata(&canonical)
            .await
            .map_err(|e| TransferError::local_io(&canonical, e))?;
        // The name as given wins over a link target's name; `.` and `..` have none.
        let named = if local_root.file_name().is_some() {
            local_root
        } else {
            canonical.as_path()
        };
        let node = LocalTreeNode::from_metadata(named, &metadata).ok_or_else(|| {
            TransferError::InvalidRequest(format!(
                "{} is not a regular file or directory with a UTF-8 name",
                local_root.display()
            ))
        })?;

        match node.kind {
            EntryKind::File => {
                let label = dest_path.to_string();
                let listing = PathResolver::new(self.backend)
                    .list_all(dest)
                    .await
                    .map_err(|e| TransferError::from_backend(label, e))?;
                self.upload_file(&node, dest, dest_path, &listing, report)
                    .await
            }
            EntryKind::Folder => {
                let remote_path = dest_path.join(&node.name, EntryKind::Folder)?;
                self.visit_dir(node.path, node.name, dest.clone(), remote_path, report)
                    .await
            }
        }
    }

    /// One directory level, then recursion into each kept subdirectory
    fn visit_dir<'b>(
        &'b self,
        local_dir: PathBuf,
        name: String,
        parent: RemoteHandle,
        remote_path: LogicalPath,
        report: &'b mut TransferReport,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'b>> {
        Box::pin(async move {
            let label = remote_path.to_string();
            let folder = RemoteMirror::new(self.backend, self.observer)
                .ensure_folder(&parent, &name, &label)
                .await?;

            // A folder created just now has nothing to collide with.
            let listing = if folder.created {
                report.folders_created += 1;
                FolderListing::default()
            } else {
                PathResolver::new(self.backend)
                    .list_all(&folder.handle)
                    .await
                    .map_err(|e| TransferError::from_backend(label.as_str(), e))?
            };

            let (files, dirs) = read_local_dir(&local_dir).await?;
            debug!(
                path = %label,
                files = files.len(),
                dirs = dirs.len(),
                "Visiting directory"
            );

            for node in &files {
                if let Some(reason) = self.skip.check(&node.name) {
                    let path = remote_path.join(&node.name, EntryKind::File)?;
                    self.skipped(path.to_string(), reason, report);
                    continue;
                }
                self.upload_file(node, &folder.handle, &remote_path, &listing, report)
                    .await?;
            }

            for node in dirs {
                let child_path = remote_path.join(&node.name, EntryKind::Folder)?;
                if let Some(reason) = self.skip.check(&node.name) {
                    self.skipped(child_path.to_string(), reason, report);
                    continue;
                }
                let descend = Decision::Descend {
                    path: child_path.to_string(),
                };
                if !self.policy.confirm(&descend) {
                    self.skipped(child_path.to_string(), SkipReason::Declined, report);
                    continue;
                }
                self.visit_dir(node.path, node.name, folder.handle.clone(), child_path, report)
                    .await?;
            }

            Ok(())
        })
    }

    /// Existence check against the folder snapshot, then create-or-update
    async fn upload_file(
        &self,
        node: &LocalTreeNode,
        parent: &RemoteHandle,
        folder_path: &LogicalPath,
        listing: &FolderListing,
        report: &mut TransferReport,
    ) -> Result<()> {
        let path = folder_path.join(&node.name, EntryKind::File)?;
        let label = path.to_string();

        let target = match listing.lookup(&node.name, EntryKind::File) {
            ChildLookup::Absent => UploadTarget::create(parent.clone(), node.name.as_str()),
            ChildLookup::KindConflict(entry) => {
                return Err(TransferError::NameKindConflict {
                    path: label,
                    expected: EntryKind::File,
                    found: entry.kind,
                });
            }
            ChildLookup::Found(existing) => {
                if self.options.skip_unchanged && is_unchanged(node, &existing) {
                    self.skipped(label, SkipReason::Unchanged, report);
                    return Ok(());
                }
                let overwrite = Decision::Overwrite {
                    path: label.clone(),
                };
                if !self.policy.confirm(&overwrite) {
                    self.skipped(label, SkipReason::Declined, report);
                    return Ok(());
                }
                UploadTarget::update(parent.clone(), node.name.as_str(), existing.handle)
            }
        };

        let entry = ChunkedTransfer::new(self.backend, self.options, self.observer)
            .upload(&node.path, &target, &label)
            .await?;
        report.record_transfer(entry.size.unwrap_or(node.size));
        Ok(())
    }

    fn skipped(&self, path: String, reason: SkipReason, report: &mut TransferReport) {
        debug!(path = %path, reason = %reason, "Skipping entry");
        self.observer.on_skipped(&path, reason);
        report.record_skip(path, reason);
    }
}

/// Same size, and same mtime at one-second precision
fn is_unchanged(node: &LocalTreeNode, remote: &RemoteEntry) -> bool {
    if remote.size != Some(node.size) {
        return false;
    }
    match (node.modified, remote.modified) {
        (Some(local), Some(remote)) => local.timestamp() == remote.timestamp(),
        _ => false,
    }
}

/// Reads one directory level, split into files and subdirectories
///
/// Both lists are sorted by name so runs are reproducible. Entries that are
/// neither files nor directories, or whose names are not UTF-8, are left out,
/// as are symlinks to directories.
async fn read_local_dir(dir: &Path) -> Result<(Vec<LocalTreeNode>, Vec<LocalTreeNode>)> {
    let mut reader = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| TransferError::local_io(dir, e))?;

    let mut files = Vec::new();
    let mut dirs = Vec::new();

    while let Some(entry) = reader
        .next_entry()
        .await
        .map_err(|e| TransferError::local_io(dir, e))?
    {
        let path = entry.path();
        let is_link = match entry.file_type().await {
            Ok(file_type) => file_type.is_symlink(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable entry");
                continue;
            }
        };
        // Linked files are followed; a dangling link has no metadata.
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable entry");
                continue;
            }
        };
        if is_link && metadata.is_dir() {
            debug!(path = %path.display(), "Not following symlinked directory");
            continue;
        }
        match LocalTreeNode::from_metadata(&path, &metadata) {
            Some(node) if node.is_dir() => dirs.push(node),
            Some(node) => files.push(node),
            None => debug!(path = %path.display(), "Ignoring special or non-UTF-8 entry"),
        }
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    dirs.sort_by(|a, b| a.name.cmp(&b.name));
    Ok((files, dirs))
}
