//! Remote folder mirroring
//!
//! [`RemoteMirror::ensure_folder`] is called once per directory level while
//! a local tree is uploaded, so intermediate folders are created explicitly
//! rather than left to backend auto-creation.

use cloudmirror_core::domain::{EntryKind, RemoteHandle};
use cloudmirror_core::ports::{BackendError, IBackendAdapter, ITransferObserver, RejectReason};
use tracing::{debug, info};

use crate::resolver::{ChildLookup, PathResolver};
use crate::{Result, TransferError};

/// Handle of an ensured folder and whether this call created it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsuredFolder {
    pub handle: RemoteHandle,
    pub created: bool,
}

/// Idempotent get-or-create for remote folders
pub struct RemoteMirror<'a> {
    backend: &'a dyn IBackendAdapter,
    observer: &'a dyn ITransferObserver,
}

impl<'a> RemoteMirror<'a> {
    pub fn new(backend: &'a dyn IBackendAdapter, observer: &'a dyn ITransferObserver) -> Self {
        Self { backend, observer }
    }

    /// Returns the folder `name` under `parent`, creating it if absent
    ///
    /// Calling this twice with the same arguments returns the same handle and
    /// creates at most one folder. `path` is only used in errors and events.
    ///
    /// # Errors
    /// `NameKindConflict` if `name` exists under `parent` only as a file
    pub async fn ensure_folder(
        &self,
        parent: &RemoteHandle,
        name: &str,
        path: &str,
    ) -> Result<EnsuredFolder> {
        match self.lookup(parent, name, path).await? {
            ChildLookup::Found(entry) => {
                debug!(path, handle = %entry.handle, "Reusing remote folder");
                return Ok(EnsuredFolder {
                    handle: entry.handle,
                    created: false,
                });
            }
            ChildLookup::KindConflict(entry) => {
                return Err(TransferError::NameKindConflict {
                    path: path.to_string(),
                    expected: EntryKind::Folder,
                    found: entry.kind,
                });
            }
            ChildLookup::Absent => {}
        }

        match self.backend.create_folder(parent, name).await {
            Ok(entry) => {
                info!(path, handle = %entry.handle, "Created remote folder");
                self.observer.on_folder_created(path);
                Ok(EnsuredFolder {
                    handle: entry.handle,
                    created: true,
                })
            }
            // Lost a creation race; the winner's folder is as good as ours.
            Err(BackendError::Rejected {
                reason: RejectReason::Conflict,
                message,
            }) => match self.lookup(parent, name, path).await? {
                ChildLookup::Found(entry) => Ok(EnsuredFolder {
                    handle: entry.handle,
                    created: false,
                }),
                _ => Err(TransferError::BackendRejected {
                    path: path.to_string(),
                    reason: RejectReason::Conflict,
                    message,
                }),
            },
            Err(err) => Err(TransferError::from_backend(path, err)),
        }
    }

    async fn lookup(&self, parent: &RemoteHandle, name: &str, path: &str) -> Result<ChildLookup> {
        PathResolver::new(self.backend)
            .find_child(parent, name, EntryKind::Folder)
            .await
            .map_err(|e| TransferError::from_backend(path, e))
    }
}
