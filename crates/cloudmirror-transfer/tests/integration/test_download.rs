//! Downloads: single files, folder materialization, ranged resume, digests

use std::sync::Arc;

use cloudmirror_core::domain::{EntryKind, SkipReason};
use cloudmirror_core::ports::{
    BackendError, CallbackPolicy, Decision, DigestAlgorithm, IBackendAdapter, NeverOverwrite,
};
use cloudmirror_transfer::chunked::partial_path;
use cloudmirror_transfer::memory::{FaultPoint, MemoryBackend};
use cloudmirror_transfer::TransferError;
use tempfile::TempDir;

use crate::common::{backend, engine, patterned, small_options, KIB};

/// `/docs/{a.txt, big.bin, .cache, sub/c.txt}`
fn seed_docs(backend: &MemoryBackend) -> Vec<u8> {
    let root = backend.root();
    let docs = backend.add_folder(&root, "docs").unwrap();
    backend.add_file(&docs, "a.txt", b"alpha".to_vec()).unwrap();
    let big = patterned(100 * KIB);
    backend.add_file(&docs, "big.bin", big.clone()).unwrap();
    backend.add_file(&docs, ".cache", b"skip me".to_vec()).unwrap();
    let sub = backend.add_folder(&docs, "sub").unwrap();
    backend.add_file(&sub, "c.txt", b"gamma".to_vec()).unwrap();
    big
}

#[tokio::test]
async fn test_folder_is_materialized_under_its_own_name() {
    let tmp = TempDir::new().unwrap();
    let backend = backend();
    let big = seed_docs(&backend);

    let report = engine(&backend, small_options())
        .download(tmp.path(), "/docs/")
        .await
        .unwrap();

    let docs = tmp.path().join("docs");
    assert_eq!(std::fs::read(docs.join("a.txt")).unwrap(), b"alpha");
    assert_eq!(std::fs::read(docs.join("big.bin")).unwrap(), big);
    assert_eq!(std::fs::read(docs.join("sub/c.txt")).unwrap(), b"gamma");
    assert!(!docs.join(".cache").exists());

    assert_eq!(report.files_transferred, 3);
    assert_eq!(report.folders_created, 2);
    assert_eq!(report.skipped_for(SkipReason::DotFile), vec!["/docs/.cache"]);

    let calls = backend.calls();
    assert_eq!(calls.download_small, 2);
    assert_eq!(calls.download_range, 10);
}

#[tokio::test]
async fn test_root_children_land_directly_in_local_dir() {
    let tmp = TempDir::new().unwrap();
    let backend = backend();
    seed_docs(&backend);
    backend
        .add_file(&backend.root(), "top.txt", b"top".to_vec())
        .unwrap();

    engine(&backend, small_options())
        .download(tmp.path(), "/")
        .await
        .unwrap();

    assert_eq!(std::fs::read(tmp.path().join("top.txt")).unwrap(), b"top");
    assert!(tmp.path().join("docs/sub/c.txt").is_file());
}

#[tokio::test]
async fn test_single_file_download() {
    let tmp = TempDir::new().unwrap();
    let backend = backend();
    seed_docs(&backend);

    let report = engine(&backend, small_options())
        .download(tmp.path(), "/docs/sub/c.txt")
        .await
        .unwrap();

    assert_eq!(report.files_transferred, 1);
    assert_eq!(report.bytes_transferred, 5);
    assert_eq!(std::fs::read(tmp.path().join("c.txt")).unwrap(), b"gamma");
    assert!(!partial_path(&tmp.path().join("c.txt")).exists());
}

#[tokio::test]
async fn test_range_fault_resumes_without_gaps() {
    let tmp = TempDir::new().unwrap();
    let backend = backend();
    let big = seed_docs(&backend);
    backend.inject_fault_at_offset(
        FaultPoint::DownloadRange,
        40 * KIB,
        BackendError::Transient("read timed out".into()),
    );

    engine(&backend, small_options())
        .download(tmp.path(), "/docs/big.bin")
        .await
        .unwrap();

    assert_eq!(std::fs::read(tmp.path().join("big.bin")).unwrap(), big);
    assert_eq!(backend.calls().download_range, 11);
}

#[tokio::test]
async fn test_short_range_responses_advance_by_received_length() {
    let tmp = TempDir::new().unwrap();
    let backend = Arc::new(MemoryBackend::new().with_max_range_response(3000));
    let big = seed_docs(&backend);

    engine(&backend, small_options())
        .download(tmp.path(), "/docs/big.bin")
        .await
        .unwrap();

    assert_eq!(std::fs::read(tmp.path().join("big.bin")).unwrap(), big);
    // ceil(100 KiB / 3000 bytes)
    assert_eq!(backend.calls().download_range, 35);
}

#[tokio::test]
async fn test_digest_mismatch_leaves_no_file_behind() {
    let tmp = TempDir::new().unwrap();
    let backend = Arc::new(MemoryBackend::new().with_digest(DigestAlgorithm::Sha256));
    seed_docs(&backend);
    let big = backend.find_path("/docs/big.bin").unwrap();
    backend.override_digest(&big.handle, "0".repeat(64));

    let err = engine(&backend, small_options())
        .download(tmp.path(), "/docs/big.bin")
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::IntegrityMismatch { .. }));
    let dest = tmp.path().join("big.bin");
    assert!(!dest.exists());
    assert!(!partial_path(&dest).exists());
}

#[tokio::test]
async fn test_verified_download_succeeds() {
    let tmp = TempDir::new().unwrap();
    let backend = Arc::new(MemoryBackend::new().with_digest(DigestAlgorithm::QuickXor));
    let big = seed_docs(&backend);

    engine(&backend, small_options())
        .download(tmp.path(), "/docs/")
        .await
        .unwrap();

    assert_eq!(std::fs::read(tmp.path().join("docs/big.bin")).unwrap(), big);
}

#[tokio::test]
async fn test_never_overwrite_keeps_local_file() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("a.txt"), b"local edit").unwrap();
    let backend = backend();
    seed_docs(&backend);

    let report = engine(&backend, small_options())
        .with_policy(Arc::new(NeverOverwrite))
        .download(tmp.path(), "/docs/a.txt")
        .await
        .unwrap();

    assert_eq!(report.files_transferred, 0);
    assert_eq!(report.skipped_for(SkipReason::Declined), vec!["/docs/a.txt"]);
    assert_eq!(std::fs::read(tmp.path().join("a.txt")).unwrap(), b"local edit");
}

#[tokio::test]
async fn test_declined_descend_leaves_subfolder_remote() {
    let tmp = TempDir::new().unwrap();
    let backend = backend();
    seed_docs(&backend);

    let policy = CallbackPolicy::new(|d: &Decision| !matches!(d, Decision::Descend { .. }));
    let report = engine(&backend, small_options())
        .with_policy(Arc::new(policy))
        .download(tmp.path(), "/docs/")
        .await
        .unwrap();

    let docs = tmp.path().join("docs");
    assert!(docs.join("a.txt").exists());
    assert!(!docs.join("sub").exists());
    assert_eq!(report.files_transferred, 2);
    assert_eq!(report.folders_created, 1);
    assert_eq!(report.skipped_for(SkipReason::Declined), vec!["/docs/sub/"]);
}

#[tokio::test]
async fn test_existing_file_is_replaced_by_default() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("a.txt"), b"a much longer local file").unwrap();
    let backend = backend();
    seed_docs(&backend);

    engine(&backend, small_options())
        .download(tmp.path(), "/docs/a.txt")
        .await
        .unwrap();

    assert_eq!(std::fs::read(tmp.path().join("a.txt")).unwrap(), b"alpha");
}

#[tokio::test]
async fn test_local_directory_blocks_file_download() {
    let tmp = TempDir::new().unwrap();
    std::fs::create_dir(tmp.path().join("a.txt")).unwrap();
    let backend = backend();
    seed_docs(&backend);

    let err = engine(&backend, small_options())
        .download(tmp.path(), "/docs/a.txt")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        TransferError::NameKindConflict {
            expected: EntryKind::File,
            found: EntryKind::Folder,
            ..
        }
    ));
}

#[tokio::test]
async fn test_trailing_separator_is_authoritative() {
    let tmp = TempDir::new().unwrap();
    let backend = backend();
    seed_docs(&backend);

    let err = engine(&backend, small_options())
        .download(tmp.path(), "/docs")
        .await
        .unwrap_err();

    match err {
        TransferError::NameKindConflict {
            path,
            expected,
            found,
        } => {
            assert_eq!(path, "/docs");
            assert_eq!(expected, EntryKind::File);
            assert_eq!(found, EntryKind::Folder);
        }
        other => panic!("expected NameKindConflict, got {other:?}"),
    }
    assert_eq!(backend.calls().download_small, 0);
}

#[tokio::test]
async fn test_destination_must_be_a_directory() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("plain");
    std::fs::write(&file, b"x").unwrap();
    let backend = backend();
    seed_docs(&backend);

    let err = engine(&backend, small_options())
        .download(&file, "/docs/")
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::InvalidRequest(_)));
}
