//! Transfer engine entry point
//!
//! The [`TransferEngine`] owns the collaborators of one run (backend,
//! options, skip filter, decision policy, observer) and exposes the three
//! operations: upload, download and delete.
//!
//! ## Flow
//!
//! - **Upload**: resolve the destination folder, then let the
//!   [`TreeWalker`] mirror folders and move files level by level
//! - **Download**: resolve the target once, then either transfer a single
//!   file or materialize a folder recursively
//! - **Delete**: resolve, confirm with the policy, delete depth-first
//!
//! Every await is sequential. Nothing is transferred concurrently within
//! one operation.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use cloudmirror_core::domain::{EntryKind, LogicalPath, SkipReason};
use cloudmirror_core::ports::{
    AlwaysOverwrite, Decision, IBackendAdapter, IDecisionPolicy, ITransferObserver,
    TracingObserver,
};
use tracing::{error, info, instrument};

use crate::delete::RecursiveDelete;
use crate::download::{local_child, DownloadMaterializer};
use crate::options::TransferOptions;
use crate::report::TransferReport;
use crate::resolver::PathResolver;
use crate::skip::SkipFilter;
use crate::walker::TreeWalker;
use crate::{Result, TransferError};

/// Upload, download and delete against one backend
///
/// ## Dependencies
///
/// - `backend`: Remote storage operations (IBackendAdapter)
/// - `policy`: Overwrite/descend/delete confirmations (IDecisionPolicy)
/// - `observer`: Progress notifications (ITransferObserver)
pub struct TransferEngine {
    backend: Arc<dyn IBackendAdapter>,
    options: TransferOptions,
    skip: SkipFilter,
    policy: Arc<dyn IDecisionPolicy>,
    observer: Arc<dyn ITransferObserver>,
}

impl TransferEngine {
    /// Creates an engine with the default skip rules, an always-confirm
    /// policy and a tracing observer
    pub fn new(backend: Arc<dyn IBackendAdapter>, options: TransferOptions) -> Self {
        Self {
            backend,
            options,
            skip: SkipFilter::default(),
            policy: Arc::new(AlwaysOverwrite),
            observer: Arc::new(TracingObserver),
        }
    }

    #[must_use]
    pub fn with_skip_filter(mut self, skip: SkipFilter) -> Self {
        self.skip = skip;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn IDecisionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ITransferObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn backend(&self) -> &Arc<dyn IBackendAdapter> {
        &self.backend
    }

    pub fn options(&self) -> &TransferOptions {
        &self.options
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Uploads a local file or directory into the remote folder `remote`
    ///
    /// `remote` must name a folder: end it with `/`, or pass `/` for the
    /// namespace root. The folder must already exist.
    ///
    /// # Errors
    /// - `InvalidRequest` if `remote` names a file
    /// - `PathNotFound` / `NameKindConflict` from resolving `remote`
    /// - The first error of the walk; earlier transfers are not undone
    #[instrument(skip(self), fields(backend = self.backend.name()))]
    pub async fn upload(&self, local: &Path, remote: &str) -> Result<TransferReport> {
        let started = Instant::now();
        let dest_path = LogicalPath::parse(remote)?;
        if dest_path.target_kind() != EntryKind::Folder {
            return Err(TransferError::InvalidRequest(format!(
                "upload destination {dest_path} must be a folder (end it with '/')"
            )));
        }

        let root = self.backend.root();
        let dest = PathResolver::new(self.backend.as_ref())
            .resolve(&root, &dest_path)
            .await?;

        let mut report = TransferReport::default();
        let walker = TreeWalker::new(
            self.backend.as_ref(),
            &self.options,
            &self.skip,
            self.policy.as_ref(),
            self.observer.as_ref(),
        );
        let result = walker
            .upload(local, &dest.handle, &dest_path, &mut report)
            .await;
        finish("upload", started, result, report)
    }

    /// Downloads the remote file or folder `remote` into `local_dir`
    ///
    /// A file lands at `local_dir/<name>`. A folder is recreated as
    /// `local_dir/<name>/...`; the namespace root's children land directly
    /// in `local_dir`.
    ///
    /// # Errors
    /// - `InvalidRequest` if `local_dir` is not an existing directory
    /// - `PathNotFound` / `NameKindConflict` from resolving `remote`
    #[instrument(skip(self), fields(backend = self.backend.name()))]
    pub async fn download(&self, local_dir: &Path, remote: &str) -> Result<TransferReport> {
        let started = Instant::now();
        let path = LogicalPath::parse(remote)?;
        let metadata = tokio::fs::metadata(local_dir)
            .await
            .map_err(|e| TransferError::local_io(local_dir, e))?;
        if !metadata.is_dir() {
            return Err(TransferError::InvalidRequest(format!(
                "download destination {} is not a directory",
                local_dir.display()
            )));
        }

        let root = self.backend.root();
        let resolved = PathResolver::new(self.backend.as_ref())
            .resolve(&root, &path)
            .await?;

        let mut report = TransferReport::default();
        let materializer = DownloadMaterializer::new(
            self.backend.as_ref(),
            &self.options,
            &self.skip,
            self.policy.as_ref(),
            self.observer.as_ref(),
        );
        let result = match resolved.entry {
            Some(entry) if entry.is_file() => {
                materializer
                    .download_file(&entry, &path, local_dir, &mut report)
                    .await
            }
            Some(entry) => match local_child(local_dir, &entry.name) {
                Ok(dir) => {
                    materializer
                        .materialize(entry.handle, path, dir, &mut report)
                        .await
                }
                Err(err) => Err(err),
            },
            None => {
                materializer
                    .materialize(root, path, local_dir.to_path_buf(), &mut report)
                    .await
            }
        };
        finish("download", started, result, report)
    }

    /// Deletes the remote entry `remote` and everything below it
    ///
    /// A declined confirmation removes nothing and is not an error.
    ///
    /// # Errors
    /// - `InvalidRequest` for the namespace root
    /// - `PathNotFound` / `NameKindConflict` from resolving `remote`
    #[instrument(skip(self), fields(backend = self.backend.name()))]
    pub async fn delete(&self, remote: &str) -> Result<TransferReport> {
        let started = Instant::now();
        let path = LogicalPath::parse(remote)?;
        if path.is_root() {
            return Err(TransferError::InvalidRequest(
                "refusing to delete the namespace root".to_string(),
            ));
        }

        let root = self.backend.root();
        let resolved = PathResolver::new(self.backend.as_ref())
            .resolve(&root, &path)
            .await?;

        let mut report = TransferReport::default();
        let label = path.to_string();
        if !self.policy.confirm(&Decision::Delete {
            path: label.clone(),
        }) {
            info!(path = %label, "Delete declined");
            self.observer.on_skipped(&label, SkipReason::Declined);
            report.record_skip(label, SkipReason::Declined);
            return Ok(report);
        }

        let result = RecursiveDelete::new(self.backend.as_ref(), self.observer.as_ref())
            .delete_tree(resolved.handle, resolved.kind, path, &mut report)
            .await;
        finish("delete", started, result, report)
    }

    /// Ends the backend's lifecycle
    pub async fn close(&self) -> Result<()> {
        self.backend
            .close()
            .await
            .map_err(|e| TransferError::from_backend(self.backend.name(), e))
    }
}

fn finish(
    operation: &str,
    started: Instant,
    result: Result<()>,
    report: TransferReport,
) -> Result<TransferReport> {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match result {
        Ok(()) => {
            info!(
                operation,
                files = report.files_transferred,
                bytes = report.bytes_transferred,
                folders_created = report.folders_created,
                deleted = report.entries_deleted,
                skipped = report.skipped.len(),
                elapsed_ms,
                "Operation complete"
            );
            Ok(report)
        }
        Err(err) => {
            error!(
                operation,
                files = report.files_transferred,
                elapsed_ms,
                error = %err,
                "Operation failed"
            );
            Err(err)
        }
    }
}
