//! Recursive remote deletion

use std::sync::Arc;

use cloudmirror_core::domain::SkipReason;
use cloudmirror_core::ports::{BackendError, CallbackPolicy, Decision, IBackendAdapter, RejectReason};
use cloudmirror_transfer::memory::{FaultPoint, MemoryBackend};
use cloudmirror_transfer::TransferError;

use crate::common::{backend, engine, small_options, Event, RecordingObserver};

/// `/docs/{a.txt, b.txt, sub/{c.txt, deeper/d.txt}}` plus `/keep.txt`
fn seed(backend: &MemoryBackend) {
    let root = backend.root();
    backend.add_file(&root, "keep.txt", b"k".to_vec()).unwrap();
    let docs = backend.add_folder(&root, "docs").unwrap();
    backend.add_file(&docs, "a.txt", b"a".to_vec()).unwrap();
    backend.add_file(&docs, "b.txt", b"b".to_vec()).unwrap();
    let sub = backend.add_folder(&docs, "sub").unwrap();
    backend.add_file(&sub, "c.txt", b"c".to_vec()).unwrap();
    let deeper = backend.add_folder(&sub, "deeper").unwrap();
    backend.add_file(&deeper, "d.txt", b"d".to_vec()).unwrap();
}

#[tokio::test]
async fn test_folder_is_deleted_depth_first() {
    let backend = backend();
    seed(&backend);
    let observer = Arc::new(RecordingObserver::default());

    let report = engine(&backend, small_options())
        .with_observer(observer.clone())
        .delete("/docs/")
        .await
        .unwrap();

    assert_eq!(report.entries_deleted, 7);
    assert_eq!(backend.entry_count(), 1);
    assert!(backend.find_path("/keep.txt").is_some());

    let deleted: Vec<_> = observer
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Deleted(path) => Some(path),
            _ => None,
        })
        .collect();
    assert_eq!(
        deleted,
        vec![
            "/docs/a.txt",
            "/docs/b.txt",
            "/docs/sub/c.txt",
            "/docs/sub/deeper/d.txt",
            "/docs/sub/deeper/",
            "/docs/sub/",
            "/docs/",
        ]
    );
}

#[tokio::test]
async fn test_single_file_delete() {
    let backend = backend();
    seed(&backend);

    let report = engine(&backend, small_options())
        .delete("/docs/sub/c.txt")
        .await
        .unwrap();

    assert_eq!(report.entries_deleted, 1);
    assert!(backend.find_path("/docs/sub/c.txt").is_none());
    assert!(backend.find_path("/docs/sub/").is_some());
}

#[tokio::test]
async fn test_root_delete_is_refused() {
    let backend = backend();
    seed(&backend);

    let err = engine(&backend, small_options())
        .delete("/")
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::InvalidRequest(_)));
    assert_eq!(backend.calls().delete_entry, 0);
}

#[tokio::test]
async fn test_declined_delete_removes_nothing() {
    let backend = backend();
    seed(&backend);
    let policy = CallbackPolicy::new(|d: &Decision| !matches!(d, Decision::Delete { .. }));

    let report = engine(&backend, small_options())
        .with_policy(Arc::new(policy))
        .delete("/docs/")
        .await
        .unwrap();

    assert_eq!(report.entries_deleted, 0);
    assert_eq!(report.skipped_for(SkipReason::Declined), vec!["/docs/"]);
    assert_eq!(backend.entry_count(), 8);
    assert_eq!(backend.calls().delete_entry, 0);
}

#[tokio::test]
async fn test_partial_delete_is_observable() {
    let backend = backend();
    seed(&backend);
    backend.inject_fault_after(
        FaultPoint::DeleteEntry,
        2,
        BackendError::rejected(RejectReason::Forbidden, "locked"),
    );

    let err = engine(&backend, small_options())
        .delete("/docs/")
        .await
        .unwrap_err();

    match err {
        TransferError::BackendRejected { path, .. } => assert_eq!(path, "/docs/sub/c.txt"),
        other => panic!("expected BackendRejected, got {other:?}"),
    }
    let docs = backend.find_path("/docs/").unwrap();
    assert_eq!(backend.children_names(&docs.handle), vec!["sub"]);
}

#[tokio::test]
async fn test_missing_path_is_not_found() {
    let backend = backend();
    seed(&backend);

    let err = engine(&backend, small_options())
        .delete("/docs/nope.txt")
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::PathNotFound { .. }));
}
