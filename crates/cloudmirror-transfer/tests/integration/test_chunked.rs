//! Chunked sessions: resume after transient faults, retry budget, digests

use cloudmirror_core::ports::{BackendError, DigestAlgorithm, RejectReason};
use cloudmirror_transfer::digest::digest_bytes;
use cloudmirror_transfer::memory::{FaultPoint, MemoryBackend};
use cloudmirror_transfer::TransferError;
use std::sync::Arc;
use tempfile::TempDir;

use crate::common::{backend, engine, patterned, small_options, write_file, KIB};

fn transient() -> BackendError {
    BackendError::Transient("connection reset by peer".into())
}

#[tokio::test]
async fn test_transient_fault_resumes_from_last_committed_offset() {
    let tmp = TempDir::new().unwrap();
    let content = patterned(100 * KIB);
    let file = write_file(tmp.path(), "big.bin", &content);

    let backend = backend();
    backend.inject_fault_at_offset(FaultPoint::AppendChunk, 40 * KIB, transient());

    let report = engine(&backend, small_options())
        .upload(&file, "/")
        .await
        .unwrap();

    let entry = backend.find_path("/big.bin").unwrap();
    assert_eq!(entry.size, Some(100 * KIB));
    assert_eq!(backend.content(&entry.handle).unwrap(), content);
    assert_eq!(report.bytes_transferred, 100 * KIB);

    let calls = backend.calls();
    // nine appends plus the one re-sent at 40 KiB
    assert_eq!(calls.append_chunk, 10);
    assert_eq!(calls.commit_session, 1);
    assert_eq!(calls.start_upload_session, 1);
}

#[tokio::test]
async fn test_faulted_and_clean_uploads_are_identical() {
    let tmp = TempDir::new().unwrap();
    let content = patterned(100 * KIB);
    let file = write_file(tmp.path(), "big.bin", &content);

    let clean = backend();
    engine(&clean, small_options()).upload(&file, "/").await.unwrap();

    let faulted = backend();
    faulted.inject_fault_at_offset(FaultPoint::AppendChunk, 40 * KIB, transient());
    engine(&faulted, small_options()).upload(&file, "/").await.unwrap();

    let a = clean.find_path("/big.bin").unwrap();
    let b = faulted.find_path("/big.bin").unwrap();
    assert_eq!(clean.content(&a.handle), faulted.content(&b.handle));
}

#[tokio::test]
async fn test_transient_commit_is_retried() {
    let tmp = TempDir::new().unwrap();
    let content = patterned(45 * KIB);
    let file = write_file(tmp.path(), "big.bin", &content);

    let backend = backend();
    backend.inject_fault(FaultPoint::CommitSession, transient());

    engine(&backend, small_options())
        .upload(&file, "/")
        .await
        .unwrap();

    assert_eq!(backend.calls().commit_session, 2);
    let entry = backend.find_path("/big.bin").unwrap();
    assert_eq!(backend.content(&entry.handle).unwrap(), content);
}

#[tokio::test]
async fn test_retry_budget_is_bounded() {
    let tmp = TempDir::new().unwrap();
    let file = write_file(tmp.path(), "big.bin", &patterned(64 * KIB));

    let backend = backend();
    backend.inject_persistent_fault(FaultPoint::AppendChunk, transient());

    let err = engine(&backend, small_options())
        .upload(&file, "/")
        .await
        .unwrap_err();

    match err {
        TransferError::RetryExhausted { path, attempts, .. } => {
            assert_eq!(path, "/big.bin");
            assert_eq!(attempts, 4);
        }
        other => panic!("expected RetryExhausted, got {other:?}"),
    }
    // first try plus three retries, all at offset zero
    assert_eq!(backend.calls().append_chunk, 4);
    assert!(backend.find_path("/big.bin").is_none());
}

#[tokio::test]
async fn test_rejected_chunk_is_not_retried() {
    let tmp = TempDir::new().unwrap();
    let file = write_file(tmp.path(), "big.bin", &patterned(64 * KIB));

    let backend = backend();
    backend.inject_fault_at_offset(
        FaultPoint::AppendChunk,
        20 * KIB,
        BackendError::rejected(RejectReason::QuotaExceeded, "drive full"),
    );

    let err = engine(&backend, small_options())
        .upload(&file, "/")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        TransferError::BackendRejected {
            reason: RejectReason::QuotaExceeded,
            ..
        }
    ));
    assert_eq!(backend.calls().append_chunk, 3);
    assert_eq!(backend.calls().commit_session, 0);
}

#[tokio::test]
async fn test_transient_small_upload_is_retried() {
    let tmp = TempDir::new().unwrap();
    let file = write_file(tmp.path(), "a.txt", b"hello");

    let backend = backend();
    backend.inject_fault(FaultPoint::UploadSmall, transient());

    engine(&backend, small_options())
        .upload(&file, "/")
        .await
        .unwrap();

    assert_eq!(backend.calls().upload_small, 2);
    assert!(backend.find_path("/a.txt").is_some());
}

#[tokio::test]
async fn test_session_start_failure_is_fatal() {
    let tmp = TempDir::new().unwrap();
    let file = write_file(tmp.path(), "big.bin", &patterned(64 * KIB));

    let backend = backend();
    backend.inject_fault(FaultPoint::StartUploadSession, transient());

    let err = engine(&backend, small_options())
        .upload(&file, "/")
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::TransientTransport { .. }));
    assert_eq!(backend.calls().append_chunk, 0);
}

// ============================================================================
// Digests
// ============================================================================

#[tokio::test]
async fn test_commit_digest_matches_local_digest() {
    for algorithm in [DigestAlgorithm::Sha256, DigestAlgorithm::QuickXor] {
        let tmp = TempDir::new().unwrap();
        let content = patterned(77 * KIB);
        let file = write_file(tmp.path(), "big.bin", &content);

        let backend = Arc::new(
            MemoryBackend::new()
                .with_chunk_size(10 * KIB)
                .with_digest(algorithm),
        );
        backend.inject_fault_at_offset(FaultPoint::AppendChunk, 30 * KIB, transient());

        engine(&backend, small_options())
            .upload(&file, "/")
            .await
            .unwrap();

        let entry = backend.find_path("/big.bin").unwrap();
        assert_eq!(entry.digest, Some(digest_bytes(algorithm, &content)));
    }
}

#[tokio::test]
async fn test_corrupted_commit_is_integrity_mismatch() {
    let tmp = TempDir::new().unwrap();
    let file = write_file(tmp.path(), "big.bin", &patterned(40 * KIB));

    let backend = Arc::new(
        MemoryBackend::new()
            .with_chunk_size(10 * KIB)
            .with_digest(DigestAlgorithm::Sha256),
    );
    backend.corrupt_next_commit();

    let err = engine(&backend, small_options())
        .upload(&file, "/")
        .await
        .unwrap_err();

    match err {
        TransferError::IntegrityMismatch {
            path,
            expected,
            actual,
        } => {
            assert_eq!(path, "/big.bin");
            assert_ne!(expected, actual);
        }
        other => panic!("expected IntegrityMismatch, got {other:?}"),
    }
    assert_eq!(backend.calls().commit_session, 1);
    assert!(backend.find_path("/big.bin").is_none());
}
