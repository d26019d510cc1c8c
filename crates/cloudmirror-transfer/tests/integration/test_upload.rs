//! Upload walks: mirroring, mode selection, skip rules and policies

use std::sync::Arc;

use chrono::{DateTime, Utc};
use cloudmirror_core::config::SkipConfig;
use cloudmirror_core::domain::{EntryKind, SkipReason};
use cloudmirror_core::ports::{
    BackendError, CallbackPolicy, Decision, IBackendAdapter, NeverOverwrite, RejectReason,
    TransferMode,
};
use cloudmirror_transfer::memory::FaultPoint;
use cloudmirror_transfer::{SkipFilter, TransferError};
use tempfile::TempDir;

use crate::common::{
    backend, engine, patterned, small_options, write_file, RecordingObserver, KIB,
};

// ============================================================================
// Tree mirroring
// ============================================================================

#[tokio::test]
async fn test_example_tree_uses_single_and_chunked_paths() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("root");
    write_file(&root, "a.txt", &patterned(5 * KIB));
    let big = patterned(50 * KIB);
    write_file(&root, "sub/b.txt", &big);

    let backend = backend();
    let observer = Arc::new(RecordingObserver::default());
    let engine = engine(&backend, small_options()).with_observer(observer.clone());

    let report = engine.upload(&root, "/").await.unwrap();

    assert_eq!(observer.mode_of("/root/a.txt"), Some(TransferMode::Single));
    assert_eq!(observer.mode_of("/root/sub/b.txt"), Some(TransferMode::Chunked));

    let calls = backend.calls();
    assert_eq!(calls.upload_small, 1);
    assert_eq!(calls.start_upload_session, 1);
    // 50 KiB in 10 KiB chunks: four appends, the fifth chunk rides the commit
    assert_eq!(calls.append_chunk, 4);
    assert_eq!(calls.commit_session, 1);

    assert!(backend.find_path("/root/").unwrap().is_folder());
    assert!(backend.find_path("/root/sub/").unwrap().is_folder());
    assert_eq!(backend.find_path("/root/a.txt").unwrap().size, Some(5 * KIB));
    let b = backend.find_path("/root/sub/b.txt").unwrap();
    assert_eq!(backend.content(&b.handle).unwrap(), big);

    assert_eq!(report.files_transferred, 2);
    assert_eq!(report.bytes_transferred, 55 * KIB);
    assert_eq!(report.folders_created, 2);
    assert!(report.skipped.is_empty());
}

#[tokio::test]
async fn test_reupload_reuses_folders_and_updates_files() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("root");
    write_file(&root, "a.txt", b"first");
    write_file(&root, "sub/b.txt", b"nested");

    let backend = backend();
    let engine = engine(&backend, small_options());
    engine.upload(&root, "/").await.unwrap();
    let entries_after_first = backend.entry_count();

    write_file(&root, "a.txt", b"second version");
    let report = engine.upload(&root, "/").await.unwrap();

    assert_eq!(report.folders_created, 0);
    assert_eq!(report.files_transferred, 2);
    assert_eq!(backend.entry_count(), entries_after_first);
    assert_eq!(backend.children_names(&backend.root()), vec!["root"]);

    let a = backend.find_path("/root/a.txt").unwrap();
    assert_eq!(backend.content(&a.handle).unwrap(), b"second version");
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlinked_directory_is_not_followed() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("root");
    write_file(&root, "a.txt", b"once");
    std::os::unix::fs::symlink(&root, root.join("loop")).unwrap();

    let backend = backend();
    let report = engine(&backend, small_options())
        .upload(&root, "/")
        .await
        .unwrap();

    assert_eq!(report.files_transferred, 1);
    assert_eq!(report.folders_created, 1);
    let root_folder = backend.find_path("/root/").unwrap();
    assert_eq!(backend.children_names(&root_folder.handle), vec!["a.txt"]);
    assert!(backend.find_path("/root/loop/").is_none());
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlinked_root_keeps_link_name() {
    let tmp = TempDir::new().unwrap();
    let target = write_file(tmp.path(), "real-2024.log", b"entries");
    let link = tmp.path().join("latest.log");
    std::os::unix::fs::symlink(&target, &link).unwrap();

    let backend = backend();
    engine(&backend, small_options())
        .upload(&link, "/")
        .await
        .unwrap();

    assert_eq!(backend.children_names(&backend.root()), vec!["latest.log"]);
}

#[tokio::test]
async fn test_dot_root_uses_directory_name() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("site");
    write_file(&root, "index.html", b"<html>");

    let backend = backend();
    engine(&backend, small_options())
        .upload(&root.join("."), "/")
        .await
        .unwrap();

    assert!(backend.find_path("/site/index.html").is_some());
}

#[tokio::test]
async fn test_single_file_lands_in_destination() {
    let tmp = TempDir::new().unwrap();
    let file = write_file(tmp.path(), "report.pdf", b"%PDF");

    let backend = backend();
    let dest = backend.add_folder(&backend.root(), "docs").unwrap();
    let report = engine(&backend, small_options())
        .upload(&file, "/docs/")
        .await
        .unwrap();

    assert_eq!(report.files_transferred, 1);
    assert_eq!(report.folders_created, 0);
    assert_eq!(backend.children_names(&dest), vec!["report.pdf"]);
}

#[tokio::test]
async fn test_below_threshold_never_opens_session() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("small");
    for (i, size) in [0, 1, 4 * KIB, 32 * KIB - 1].into_iter().enumerate() {
        write_file(&root, &format!("f{i}.bin"), &patterned(size));
    }

    let backend = backend();
    let report = engine(&backend, small_options())
        .upload(&root, "/")
        .await
        .unwrap();

    assert_eq!(report.files_transferred, 4);
    let calls = backend.calls();
    assert_eq!(calls.upload_small, 4);
    assert_eq!(calls.start_upload_session, 0);
    assert_eq!(calls.append_chunk, 0);
    assert_eq!(calls.commit_session, 0);
    assert_eq!(backend.find_path("/small/f0.bin").unwrap().size, Some(0));
}

#[tokio::test]
async fn test_threshold_size_exactly_uses_session() {
    let tmp = TempDir::new().unwrap();
    let file = write_file(tmp.path(), "edge.bin", &patterned(32 * KIB));

    let backend = backend();
    engine(&backend, small_options())
        .upload(&file, "/")
        .await
        .unwrap();

    assert_eq!(backend.calls().start_upload_session, 1);
    assert_eq!(backend.calls().upload_small, 0);
}

// ============================================================================
// Conflicts and destinations
// ============================================================================

#[tokio::test]
async fn test_local_file_against_remote_folder_is_conflict() {
    let tmp = TempDir::new().unwrap();
    let notes = write_file(tmp.path(), "notes", b"local notes");

    let backend = backend();
    let dest = backend.add_folder(&backend.root(), "dest").unwrap();
    backend.add_folder(&dest, "notes").unwrap();

    let err = engine(&backend, small_options())
        .upload(&notes, "/dest/")
        .await
        .unwrap_err();

    match err {
        TransferError::NameKindConflict {
            path,
            expected,
            found,
        } => {
            assert_eq!(path, "/dest/notes");
            assert_eq!(expected, EntryKind::File);
            assert_eq!(found, EntryKind::Folder);
        }
        other => panic!("expected NameKindConflict, got {other:?}"),
    }
    let calls = backend.calls();
    assert_eq!(calls.upload_small, 0);
    assert_eq!(calls.start_upload_session, 0);
}

#[tokio::test]
async fn test_local_dir_against_remote_file_is_conflict() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("photos");
    write_file(&root, "cat.jpg", b"meow");

    let backend = backend();
    backend
        .add_file(&backend.root(), "photos", b"not a folder".to_vec())
        .unwrap();

    let err = engine(&backend, small_options())
        .upload(&root, "/")
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::NameKindConflict { .. }));
    assert_eq!(backend.calls().create_folder, 0);
}

#[tokio::test]
async fn test_file_destination_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let file = write_file(tmp.path(), "a.txt", b"a");

    let backend = backend();
    let err = engine(&backend, small_options())
        .upload(&file, "/docs")
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::InvalidRequest(_)));
    assert_eq!(backend.calls().list_children, 0);
}

#[tokio::test]
async fn test_missing_destination_is_path_not_found() {
    let tmp = TempDir::new().unwrap();
    let file = write_file(tmp.path(), "a.txt", b"a");

    let backend = backend();
    let err = engine(&backend, small_options())
        .upload(&file, "/nope/")
        .await
        .unwrap_err();

    match err {
        TransferError::PathNotFound { path } => assert_eq!(path, "/nope/"),
        other => panic!("expected PathNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_local_root_is_local_io() {
    let tmp = TempDir::new().unwrap();
    let backend = backend();

    let err = engine(&backend, small_options())
        .upload(&tmp.path().join("absent"), "/")
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::LocalIo { .. }));
}

// ============================================================================
// Skip rules and policies
// ============================================================================

#[tokio::test]
async fn test_skip_rules_apply_to_files_and_prune_dirs() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("proj");
    write_file(&root, "keep.txt", b"keep");
    write_file(&root, ".hidden", b"x");
    write_file(&root, "mod.pyc", b"x");
    write_file(&root, "backup~", b"x");
    write_file(&root, "@lock", b"x");
    write_file(&root, "scratch.tmp", b"x");
    write_file(&root, "__pycache__/mod.cpython.pyc", b"x");
    write_file(&root, ".git/config", b"x");

    let skip = SkipFilter::from_config(&SkipConfig {
        patterns: vec!["*.tmp".to_string()],
        ..SkipConfig::default()
    })
    .unwrap();

    let backend = backend();
    let report = engine(&backend, small_options())
        .with_skip_filter(skip)
        .upload(&root, "/")
        .await
        .unwrap();

    let proj = backend.find_path("/proj/").unwrap();
    assert_eq!(backend.children_names(&proj.handle), vec!["keep.txt"]);
    assert_eq!(report.files_transferred, 1);

    let dot = report.skipped_for(SkipReason::DotFile);
    assert!(dot.contains(&"/proj/.hidden"));
    assert!(dot.contains(&"/proj/.git/"));
    let generated = report.skipped_for(SkipReason::Generated);
    assert!(generated.contains(&"/proj/mod.pyc"));
    assert!(generated.contains(&"/proj/__pycache__/"));
    assert_eq!(report.skipped_for(SkipReason::Temporary).len(), 2);
    assert_eq!(report.skipped_for(SkipReason::Pattern), vec!["/proj/scratch.tmp"]);
    // Pruned subtrees are not evaluated entry by entry
    assert_eq!(report.skipped.len(), 7);
}

#[tokio::test]
async fn test_never_overwrite_keeps_remote_file() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("root");
    write_file(&root, "a.txt", b"new");
    write_file(&root, "b.txt", b"b");

    let backend = backend();
    let remote_root = backend.add_folder(&backend.root(), "root").unwrap();
    let a = backend.add_file(&remote_root, "a.txt", b"old".to_vec()).unwrap();

    let report = engine(&backend, small_options())
        .with_policy(Arc::new(NeverOverwrite))
        .upload(&root, "/")
        .await
        .unwrap();

    assert_eq!(report.skipped_for(SkipReason::Declined), vec!["/root/a.txt"]);
    assert_eq!(report.files_transferred, 1);
    assert_eq!(backend.content(&a).unwrap(), b"old");
    assert!(backend.find_path("/root/b.txt").is_some());
}

#[tokio::test]
async fn test_declined_descend_prunes_subtree() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("root");
    write_file(&root, "a.txt", b"a");
    write_file(&root, "sub/b.txt", b"b");

    let policy = CallbackPolicy::new(|d: &Decision| !matches!(d, Decision::Descend { .. }));
    let backend = backend();
    let report = engine(&backend, small_options())
        .with_policy(Arc::new(policy))
        .upload(&root, "/")
        .await
        .unwrap();

    assert_eq!(report.skipped_for(SkipReason::Declined), vec!["/root/sub/"]);
    assert!(backend.find_path("/root/sub/").is_none());
    assert!(backend.find_path("/root/a.txt").is_some());
}

#[tokio::test]
async fn test_skip_unchanged_compares_size_and_mtime() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("root");
    let same = write_file(&root, "same.txt", b"same");
    write_file(&root, "grown.txt", b"grown content");
    let mtime: DateTime<Utc> = std::fs::metadata(&same).unwrap().modified().unwrap().into();

    let backend = backend();
    let remote_root = backend.add_folder(&backend.root(), "root").unwrap();
    backend
        .add_file_with_modified(&remote_root, "same.txt", b"same".to_vec(), mtime)
        .unwrap();
    backend
        .add_file_with_modified(&remote_root, "grown.txt", b"grown".to_vec(), mtime)
        .unwrap();

    let mut options = small_options();
    options.skip_unchanged = true;
    let report = engine(&backend, options).upload(&root, "/").await.unwrap();

    assert_eq!(report.skipped_for(SkipReason::Unchanged), vec!["/root/same.txt"]);
    assert_eq!(report.files_transferred, 1);
    assert_eq!(backend.calls().upload_small, 1);
}

// ============================================================================
// Failure propagation
// ============================================================================

#[tokio::test]
async fn test_first_failure_aborts_walk() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("root");
    write_file(&root, "a.txt", b"a");
    write_file(&root, "b.txt", b"b");

    let backend = backend();
    backend.inject_persistent_fault(
        FaultPoint::UploadSmall,
        BackendError::rejected(RejectReason::Forbidden, "read-only drive"),
    );

    let err = engine(&backend, small_options())
        .upload(&root, "/")
        .await
        .unwrap_err();

    match err {
        TransferError::BackendRejected { path, reason, .. } => {
            assert_eq!(path, "/root/a.txt");
            assert_eq!(reason, RejectReason::Forbidden);
        }
        other => panic!("expected BackendRejected, got {other:?}"),
    }
    assert_eq!(backend.calls().upload_small, 1);
    // Folders created before the failure stay
    assert!(backend.find_path("/root/").is_some());
}

#[tokio::test]
async fn test_transient_listing_error_is_not_retried() {
    let tmp = TempDir::new().unwrap();
    let file = write_file(tmp.path(), "a.txt", b"a");

    let backend = backend();
    backend.inject_fault(
        FaultPoint::ListChildren,
        BackendError::Transient("503 Service Unavailable".into()),
    );

    let err = engine(&backend, small_options())
        .upload(&file, "/")
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::TransientTransport { .. }));
    assert!(err.is_transient());
    assert_eq!(backend.calls().list_children, 1);
}
