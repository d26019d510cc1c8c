//! Depth-first remote deletion
//!
//! A folder's files go first, then its subfolders (each emptied the same
//! way), then the folder itself. Deletion is not atomic: on error, whatever
//! was already removed stays removed and a later listing shows it.

use std::future::Future;
use std::pin::Pin;

use cloudmirror_core::domain::{EntryKind, LogicalPath, RemoteHandle};
use cloudmirror_core::ports::{IBackendAdapter, ITransferObserver};
use tracing::{debug, info};

use crate::report::TransferReport;
use crate::resolver::PathResolver;
use crate::{Result, TransferError};

pub struct RecursiveDelete<'a> {
    backend: &'a dyn IBackendAdapter,
    observer: &'a dyn ITransferObserver,
}

impl<'a> RecursiveDelete<'a> {
    pub fn new(backend: &'a dyn IBackendAdapter, observer: &'a dyn ITransferObserver) -> Self {
        Self { backend, observer }
    }

    /// Deletes `handle` and, for a folder, everything below it
    pub fn delete_tree<'b>(
        &'b self,
        handle: RemoteHandle,
        kind: EntryKind,
        path: LogicalPath,
        report: &'b mut TransferReport,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'b>> {
        Box::pin(async move {
            if kind == EntryKind::Folder {
                let label = path.to_string();
                let listing = PathResolver::new(self.backend)
                    .list_all(&handle)
                    .await
                    .map_err(|e| TransferError::from_backend(label.as_str(), e))?;
                let (files, folders): (Vec<_>, Vec<_>) =
                    listing.into_entries().into_iter().partition(|e| e.is_file());
                debug!(
                    path = %label,
                    files = files.len(),
                    folders = folders.len(),
                    "Emptying folder"
                );

                for file in files {
                    let child = path.join(&file.name, EntryKind::File)?;
                    self.delete_one(&file.handle, &child, report).await?;
                }
                for folder in folders {
                    let child = path.join(&folder.name, EntryKind::Folder)?;
                    self.delete_tree(folder.handle, EntryKind::Folder, child, report)
                        .await?;
                }
            }

            self.delete_one(&handle, &path, report).await
        })
    }

    async fn delete_one(
        &self,
        handle: &RemoteHandle,
        path: &LogicalPath,
        report: &mut TransferReport,
    ) -> Result<()> {
        let label = path.to_string();
        self.backend
            .delete_entry(handle)
            .await
            .map_err(|e| TransferError::from_backend(label.as_str(), e))?;
        info!(path = %label, "Deleted remote entry");
        self.observer.on_deleted(&label);
        report.entries_deleted += 1;
        Ok(())
    }
}
