//! Remote tree materialization
//!
//! Recreates a remote folder as a local directory, listing each folder
//! once (all pages merged in discovery order) and downloading its files
//! through [`ChunkedTransfer`]. The skip filter applies to remote names
//! exactly as it does to local names on upload.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use cloudmirror_core::domain::{EntryKind, LogicalPath, RemoteEntry, RemoteHandle, SkipReason};
use cloudmirror_core::ports::{Decision, IBackendAdapter, IDecisionPolicy, ITransferObserver};
use tracing::{debug, info};

use crate::chunked::ChunkedTransfer;
use crate::options::TransferOptions;
use crate::report::TransferReport;
use crate::resolver::PathResolver;
use crate::skip::SkipFilter;
use crate::{Result, TransferError};

pub struct DownloadMaterializer<'a> {
    backend: &'a dyn IBackendAdapter,
    options: &'a TransferOptions,
    skip: &'a SkipFilter,
    policy: &'a dyn IDecisionPolicy,
    observer: &'a dyn ITransferObserver,
}

impl<'a> DownloadMaterializer<'a> {
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

    /// Downloads one remote file to `local_dir/<name>`
    ///
    /// An existing local file is replaced only if the policy confirms the
    /// overwrite. An existing local directory of that name is a conflict.
    pub async fn download_file(
        &self,
        entry: &RemoteEntry,
        remote_path: &LogicalPath,
        local_dir: &Path,
        report: &mut TransferReport,
    ) -> Result<()> {
        let dest = local_child(local_dir, &entry.name)?;
        let label = remote_path.to_string();

        match tokio::fs::metadata(&dest).await {
            Ok(metadata) if metadata.is_dir() => {
                return Err(TransferError::NameKindConflict {
                    path: dest.display().to_string(),
                    expected: EntryKind::File,
                    found: EntryKind::Folder,
                });
            }
            Ok(_) => {
                let overwrite = Decision::Overwrite {
                    path: dest.display().to_string(),
                };
                if !self.policy.confirm(&overwrite) {
                    debug!(path = %label, "Overwrite declined");
                    self.observer.on_skipped(&label, SkipReason::Declined);
                    report.record_skip(label, SkipReason::Declined);
                    return Ok(());
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(TransferError::local_io(&dest, e)),
        }

        let size = ChunkedTransfer::new(self.backend, self.options, self.observer)
            .download(entry, &dest, &label)
            .await?;
        report.record_transfer(size);
        Ok(())
    }

    /// Recreates the remote folder `folder` as `local_dir`, recursively
    ///
    /// Subfolders the policy declines to descend into are skipped whole.
    pub fn materialize<'b>(
        &'b self,
        folder: RemoteHandle,
        remote_path: LogicalPath,
        local_dir: PathBuf,
        report: &'b mut TransferReport,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'b>> {
        Box::pin(async move {
            self.ensure_local_dir(&local_dir, report).await?;

            let label = remote_path.to_string();
            let listing = PathResolver::new(self.backend)
                .list_all(&folder)
                .await
                .map_err(|e| TransferError::from_backend(label.as_str(), e))?;
            debug!(
                path = %label,
                entries = listing.entries().len(),
                "Materializing folder"
            );

            for entry in listing.into_entries() {
                let child_path = remote_path.join(&entry.name, entry.kind)?;
                if let Some(reason) = self.skip.check(&entry.name) {
                    let path = child_path.to_string();
                    debug!(path = %path, reason = %reason, "Skipping entry");
                    self.observer.on_skipped(&path, reason);
                    report.record_skip(path, reason);
                    continue;
                }

                match entry.kind {
                    EntryKind::File => {
                        self.download_file(&entry, &child_path, &local_dir, report)
                            .await?;
                    }
                    EntryKind::Folder => {
                        let descend = Decision::Descend {
                            path: child_path.to_string(),
                        };
                        if !self.policy.confirm(&descend) {
                            let path = child_path.to_string();
                            debug!(path = %path, "Descend declined");
                            self.observer.on_skipped(&path, SkipReason::Declined);
                            report.record_skip(path, SkipReason::Declined);
                            continue;
                        }
                        let child_dir = local_child(&local_dir, &entry.name)?;
                        self.materialize(entry.handle, child_path, child_dir, report)
                            .await?;
                    }
                }
            }
            Ok(())
        })
    }

    async fn ensure_local_dir(&self, dir: &Path, report: &mut TransferReport) -> Result<()> {
        match tokio::fs::metadata(dir).await {
            Ok(metadata) if metadata.is_dir() => Ok(()),
            Ok(_) => Err(TransferError::NameKindConflict {
                path: dir.display().to_string(),
                expected: EntryKind::Folder,
                found: EntryKind::File,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tokio::fs::create_dir(dir)
                    .await
                    .map_err(|e| TransferError::local_io(dir, e))?;
                let path = dir.display().to_string();
                info!(path = %path, "Created local directory");
                self.observer.on_folder_created(&path);
                report.folders_created += 1;
                Ok(())
            }
            Err(e) => Err(TransferError::local_io(dir, e)),
        }
    }
}

/// `dir/<name>`, refusing names that would escape `dir`
pub fn local_child(dir: &Path, name: &str) -> Result<PathBuf> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(TransferError::InvalidRequest(format!(
            "remote name '{name}' is not usable as a local file name"
        )));
    }
    Ok(dir.join(name))
}
