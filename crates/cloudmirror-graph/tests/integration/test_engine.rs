//! Transfer engine runs over the Graph backend

use cloudmirror_transfer::TransferError;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_bytes, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_upload_tree_mixes_small_and_session_uploads() {
    let (server, backend) = common::setup_graph_mock().await;
    let local = TempDir::new().unwrap();
    let project = local.path().join("proj");
    std::fs::create_dir(&project).unwrap();
    let small = b"small file".to_vec();
    let large: Vec<u8> = (0..2048u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(project.join("a.txt"), &small).unwrap();
    std::fs::write(project.join("big.bin"), &large).unwrap();

    common::mount_children(&server, "root", json!([])).await;

    Mock::given(method("POST"))
        .and(path("/me/drive/items/root/children"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(common::folder_item("proj-id", "proj")),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/me/drive/items/proj-id:/a.txt:/content"))
        .and(body_bytes(small.clone()))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(common::file_item("a-id", "a.txt", &small)),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/me/drive/items/proj-id:/big.bin:/createUploadSession"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "uploadUrl": format!("{}/upload/big", server.uri())
        })))
        .expect(1)
        .mount(&server)
        .await;

    // The whole file fits in one 10 MiB chunk, so the commit carries it all
    Mock::given(method("PUT"))
        .and(path("/upload/big"))
        .and(header("Content-Range", "bytes 0-2047/2048"))
        .and(body_bytes(large.clone()))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(common::file_item("big-id", "big.bin", &large)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let engine = common::engine(backend, 1024);
    let report = engine.upload(&project, "/").await.expect("upload failed");

    assert_eq!(report.folders_created, 1);
    assert_eq!(report.files_transferred, 2);
    assert_eq!(report.bytes_transferred, (small.len() + large.len()) as u64);
    engine.close().await.unwrap();
}

#[tokio::test]
async fn test_download_resolves_path_and_verifies_hash() {
    let (server, backend) = common::setup_graph_mock().await;
    let content = b"quarterly numbers".to_vec();

    common::mount_children(&server, "root", json!([common::folder_item("docs-id", "docs")])).await;
    common::mount_children(
        &server,
        "docs-id",
        json!([common::file_item("r-id", "report.txt", &content)]),
    )
    .await;
    common::mount_content(&server, "r-id", &content).await;

    let local = TempDir::new().unwrap();
    let engine = common::engine(backend, 1024);
    let report = engine
        .download(local.path(), "/docs/report.txt")
        .await
        .expect("download failed");

    assert_eq!(report.files_transferred, 1);
    assert_eq!(std::fs::read(local.path().join("report.txt")).unwrap(), content);
}

#[tokio::test]
async fn test_download_accepts_service_reported_hash() {
    let (server, backend) = common::setup_graph_mock().await;

    // Hash as OneDrive reports it for the one-byte file "a"
    let item = json!({
        "id": "a-id",
        "name": "a.txt",
        "size": 1,
        "file": {"hashes": {"quickXorHash": "YQAAAAAAAAAAAAAAAQAAAAAAAAA="}}
    });
    common::mount_children(&server, "root", json!([item])).await;
    common::mount_content(&server, "a-id", b"a").await;

    let local = TempDir::new().unwrap();
    let engine = common::engine(backend, 1024);
    let report = engine
        .download(local.path(), "/a.txt")
        .await
        .expect("download failed");

    assert_eq!(report.files_transferred, 1);
    assert_eq!(std::fs::read(local.path().join("a.txt")).unwrap(), b"a");
}

#[tokio::test]
async fn test_download_with_wrong_hash_leaves_nothing() {
    let (server, backend) = common::setup_graph_mock().await;

    let item = common::file_item("r-id", "report.txt", b"expected");
    common::mount_children(&server, "root", json!([item])).await;
    common::mount_content(&server, "r-id", b"tampered").await;

    let local = TempDir::new().unwrap();
    let engine = common::engine(backend, 1024);
    let err = engine
        .download(local.path(), "/report.txt")
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::IntegrityMismatch { .. }));
    assert_eq!(std::fs::read_dir(local.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_delete_folder_depth_first() {
    let (server, backend) = common::setup_graph_mock().await;

    common::mount_children(&server, "root", json!([common::folder_item("docs-id", "docs")])).await;
    common::mount_children(
        &server,
        "docs-id",
        json!([common::file_item("a-id", "a.txt", b"a")]),
    )
    .await;
    common::mount_delete(&server, "a-id").await;
    common::mount_delete(&server, "docs-id").await;

    let engine = common::engine(backend, 1024);
    let report = engine.delete("/docs/").await.expect("delete failed");
    assert_eq!(report.entries_deleted, 2);

    let deletes: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == "DELETE")
        .map(|r| r.url.path().to_string())
        .collect();
    assert_eq!(
        deletes,
        vec!["/me/drive/items/a-id", "/me/drive/items/docs-id"]
    );
}

#[tokio::test]
async fn test_missing_remote_path() {
    let (server, backend) = common::setup_graph_mock().await;
    common::mount_children(&server, "root", json!([])).await;

    let local = TempDir::new().unwrap();
    let engine = common::engine(backend, 1024);
    let err = engine.download(local.path(), "/nope.txt").await.unwrap_err();
    assert!(matches!(err, TransferError::PathNotFound { ref path } if path == "/nope.txt"));
}
