//! Per-file transfer state machine
//!
//! `Init` picks the mode from the file size. Below the threshold the file
//! moves in a single request and no session exists. At or above it a
//! [`TransferSession`] drives `ActiveChunk -> {ActiveChunk | Retrying |
//! Committed | Failed}` until `offset == total_size`.
//!
//! Uploads negotiate the chunk size with the backend and finish with a
//! commit call that carries the last chunk. Downloads use the configured
//! range size; the local cursor plays the session's role and the commit is
//! the rename of the partial file onto the destination.
//!
//! Every chunk attempt seeks the local file to the last committed offset,
//! so a retry re-sends exactly the bytes that were not acknowledged.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Instant;

use cloudmirror_core::domain::{RemoteEntry, TransferSession};
use cloudmirror_core::ports::{
    BackendError, IBackendAdapter, ITransferObserver, TransferMode, UploadTarget,
};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, instrument, warn};

use crate::digest::RollingDigest;
use crate::options::TransferOptions;
use crate::retry::with_retry;
use crate::{Result, TransferError};

/// Result of one acknowledged upload chunk
enum ChunkOutcome {
    Appended,
    Committed(RemoteEntry),
}

/// Moves the bytes of one file in either direction
pub struct ChunkedTransfer<'a> {
    backend: &'a dyn IBackendAdapter,
    options: &'a TransferOptions,
    observer: &'a dyn ITransferObserver,
}

impl<'a> ChunkedTransfer<'a> {
    pub fn new(
        backend: &'a dyn IBackendAdapter,
        options: &'a TransferOptions,
        observer: &'a dyn ITransferObserver,
    ) -> Self {
        Self {
            backend,
            options,
            observer,
        }
    }

    // ========================================================================
    // Upload
    // ========================================================================

    /// Uploads `local` to `target` in create-or-update mode
    ///
    /// `label` is the remote logical path used in logs and errors. The
    /// local file handle is owned by this call and closed before it returns,
    /// whatever the outcome.
    #[instrument(skip_all, fields(path = label))]
    pub async fn upload(
        &self,
        local: &Path,
        target: &UploadTarget,
        label: &str,
    ) -> Result<RemoteEntry> {
        let mut file = File::open(local)
            .await
            .map_err(|e| TransferError::local_io(local, e))?;
        let total = file
            .metadata()
            .await
            .map_err(|e| TransferError::local_io(local, e))?
            .len();
        let started = Instant::now();

        let (entry, mode) = if total == 0 || total < self.options.threshold {
            let entry = self
                .upload_single(&mut file, local, total, target, label)
                .await?;
            (entry, TransferMode::Single)
        } else {
            let entry = self
                .upload_session(&mut file, local, total, target, label)
                .await?;
            (entry, TransferMode::Chunked)
        };
        drop(file);

        info!(
            path = label,
            size = total,
            mode = %mode,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Upload committed"
        );
        Ok(entry)
    }

    async fn upload_single(
        &self,
        file: &mut File,
        local: &Path,
        total: u64,
        target: &UploadTarget,
        label: &str,
    ) -> Result<RemoteEntry> {
        self.observer
            .on_transfer_started(label, total, TransferMode::Single);

        let mut data = Vec::with_capacity(total as usize);
        file.read_to_end(&mut data)
            .await
            .map_err(|e| TransferError::local_io(local, e))?;
        if data.len() as u64 != total {
            return Err(TransferError::local_io(
                local,
                std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("file changed size while reading ({total} -> {})", data.len()),
                ),
            ));
        }

        let entry = with_retry(&self.options.retry, label, "upload_small", || {
            self.backend.upload_small(target, &data)
        })
        .await?;

        self.observer.on_committed(label, total);
        Ok(entry)
    }

    async fn upload_session(
        &self,
        file: &mut File,
        local: &Path,
        total: u64,
        target: &UploadTarget,
        label: &str,
    ) -> Result<RemoteEntry> {
        self.observer
            .on_transfer_started(label, total, TransferMode::Chunked);

        let remote = self
            .backend
            .start_upload_session(target, total)
            .await
            .map_err(|e| TransferError::from_backend(label, e))?;
        let mut session = TransferSession::new(total);
        session.open(Some(remote.session_id.clone()), remote.chunk_size)?;
        debug!(
            path = label,
            total,
            chunk_size = remote.chunk_size,
            "Upload session opened"
        );

        let mut digest = self.backend.digest_algorithm().map(RollingDigest::new);
        let mut buf = Vec::new();

        loop {
            let offset = session.offset();
            let len = session.next_chunk_len();
            read_chunk(file, local, offset, len, &mut buf).await?;

            let outcome = if session.is_final_chunk() {
                let final_digest = digest.as_ref().map(|d| d.peek_with(&buf));
                self.backend
                    .commit_session(&remote, offset, &buf, total, final_digest.as_deref())
                    .await
                    .map(ChunkOutcome::Committed)
            } else {
                self.backend
                    .append_chunk(&remote, offset, &buf)
                    .await
                    .map(|()| ChunkOutcome::Appended)
            };

            match outcome {
                Ok(outcome) => {
                    if let Some(d) = digest.as_mut() {
                        d.update(&buf);
                    }
                    session.chunk_committed(len)?;
                    self.observer.on_chunk(label, session.offset(), total);

                    if let ChunkOutcome::Committed(entry) = outcome {
                        session.commit()?;
                        self.observer.on_committed(label, total);
                        return Ok(entry);
                    }
                }
                Err(err) if err.is_transient() => {
                    self.retry_chunk(&mut session, label, err).await?;
                }
                Err(err) => {
                    session.fail(err.to_string())?;
                    return Err(TransferError::from_backend(label, err));
                }
            }
        }
    }

    // ========================================================================
    // Download
    // ========================================================================

    /// Downloads `entry` to `dest`, replacing any existing file
    ///
    /// Bytes land in a hidden sibling partial file that is renamed over
    /// `dest` only after the last byte (and the digest, when the backend
    /// reports one) checks out. Returns the number of bytes written.
    #[instrument(skip_all, fields(path = label))]
    pub async fn download(&self, entry: &RemoteEntry, dest: &Path, label: &str) -> Result<u64> {
        let total = match entry.size {
            Some(size) => size,
            None => self
                .backend
                .get_metadata(&entry.handle)
                .await
                .map_err(|e| TransferError::from_backend(label, e))?
                .size
                .unwrap_or(0),
        };
        let partial = partial_path(dest);
        let started = Instant::now();

        let result = match self.download_to(entry, total, &partial, label).await {
            Ok(size) => tokio::fs::rename(&partial, dest)
                .await
                .map(|()| size)
                .map_err(|e| TransferError::local_io(dest, e)),
            Err(err) => Err(err),
        };

        match result {
            Ok(size) => {
                self.observer.on_committed(label, size);
                info!(
                    path = label,
                    size,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Download committed"
                );
                Ok(size)
            }
            Err(err) => {
                if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                    debug!(partial = %partial.display(), error = %cleanup, "No partial file to remove");
                }
                Err(err)
            }
        }
    }

    async fn download_to(
        &self,
        entry: &RemoteEntry,
        total: u64,
        partial: &Path,
        label: &str,
    ) -> Result<u64> {
        let io = |e: std::io::Error| TransferError::local_io(partial, e);
        let mut file = File::create(partial).await.map_err(io)?;

        let mut verifier = match (self.backend.digest_algorithm(), entry.digest.as_deref()) {
            (Some(algorithm), Some(expected)) => Some((RollingDigest::new(algorithm), expected)),
            _ => None,
        };

        let size = if total == 0 || total < self.options.threshold {
            self.observer
                .on_transfer_started(label, total, TransferMode::Single);
            let data = with_retry(&self.options.retry, label, "download_small", || {
                self.backend.download_small(&entry.handle)
            })
            .await?;
            file.write_all(&data).await.map_err(io)?;
            if let Some((digest, _)) = verifier.as_mut() {
                digest.update(&data);
            }
            data.len() as u64
        } else {
            self.observer
                .on_transfer_started(label, total, TransferMode::Chunked);
            self.download_ranges(
                &mut file,
                partial,
                entry,
                total,
                verifier.as_mut().map(|(digest, _)| digest),
                label,
            )
            .await?;
            total
        };

        file.flush().await.map_err(io)?;
        file.sync_all().await.map_err(io)?;
        drop(file);

        if let Some((digest, expected)) = verifier {
            let actual = digest.finalize();
            if actual != expected {
                warn!(path = label, expected, actual = %actual, "Downloaded content digest mismatch");
                return Err(TransferError::IntegrityMismatch {
                    path: label.to_string(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }
        Ok(size)
    }

    async fn download_ranges(
        &self,
        file: &mut File,
        partial: &Path,
        entry: &RemoteEntry,
        total: u64,
        mut digest: Option<&mut RollingDigest>,
        label: &str,
    ) -> Result<()> {
        let io = |e: std::io::Error| TransferError::local_io(partial, e);
        let mut session = TransferSession::new(total);
        session.open(None, self.options.download_chunk_size)?;

        while session.remaining() > 0 {
            let offset = session.offset();
            let len = session.next_chunk_len();

            let fetched = match self.backend.download_range(&entry.handle, offset, len).await {
                Ok(bytes) if bytes.is_empty() => Err(BackendError::Transient(format!(
                    "empty response for range at offset {offset}"
                ))),
                other => other,
            };

            match fetched {
                Ok(mut bytes) => {
                    bytes.truncate(len as usize);
                    file.seek(SeekFrom::Start(offset)).await.map_err(io)?;
                    file.write_all(&bytes).await.map_err(io)?;
                    if let Some(d) = digest.as_deref_mut() {
                        d.update(&bytes);
                    }
                    session.chunk_committed(bytes.len() as u64)?;
                    self.observer.on_chunk(label, session.offset(), total);
                }
                Err(err) if err.is_transient() => {
                    self.retry_chunk(&mut session, label, err).await?;
                }
                Err(err) => {
                    session.fail(err.to_string())?;
                    return Err(TransferError::from_backend(label, err));
                }
            }
        }

        session.commit()?;
        Ok(())
    }

    // ========================================================================
    // Retry
    // ========================================================================

    /// `ActiveChunk -> Retrying -> ActiveChunk` at the same offset, or `Failed`
    async fn retry_chunk(
        &self,
        session: &mut TransferSession,
        label: &str,
        err: BackendError,
    ) -> Result<()> {
        let attempt = session.retry()?;
        let offset = session.offset();

        if !self.options.retry.allows(attempt) {
            warn!(path = label, offset, attempt, error = %err, "Retry budget exhausted");
            session.fail(err.to_string())?;
            return Err(TransferError::RetryExhausted {
                path: label.to_string(),
                attempts: attempt,
                message: err.to_string(),
            });
        }

        warn!(
            path = label,
            offset,
            attempt,
            delay_ms = self.options.retry.delay_after(attempt, &err).as_millis() as u64,
            error = %err,
            "Transient chunk failure, resending from last committed offset"
        );
        self.options.retry.backoff(attempt, &err).await;
        session.resume()?;
        Ok(())
    }
}

/// Reads exactly `len` bytes at `offset` into `buf`
async fn read_chunk(
    file: &mut File,
    local: &Path,
    offset: u64,
    len: u64,
    buf: &mut Vec<u8>,
) -> Result<()> {
    let io = |e: std::io::Error| TransferError::local_io(local, e);
    file.seek(SeekFrom::Start(offset)).await.map_err(io)?;
    buf.resize(len as usize, 0);
    file.read_exact(&mut buf[..]).await.map_err(io)?;
    Ok(())
}

/// Hidden sibling of `dest` that receives bytes until commit
pub fn partial_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{name}.cloudmirror-partial"))
}
