mod common;

use bytes::Bytes;
use common::{PROJECT, USER, USER_COOKIE, can_bind_localhost, http_gateway};
use httpmock::Method::{GET, PUT};
use httpmock::MockServer;
use notary_core::{FileKind, Provider};
use notary_gateway::{GatewayError, StorageGateway};
use serde_json::json;

#[tokio::test]
async fn metadata_sends_session_cookie_and_unwraps_envelope() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/v1/resources/abc12/providers/osfstorage/5f0a")
            .header("cookie", format!("osf={USER_COOKIE}"));
        then.status(200).json_body(json!({
            "data": {
                "attributes": {
                    "path": "/5f0a",
                    "name": "a.txt",
                    "materialized": "/docs/a.txt",
                    "kind": "file",
                    "size": "12",
                    "modified_utc": "2024-05-01T10:00:00+00:00",
                    "extra": { "version": 3 }
                }
            }
        }));
    });

    let gateway = http_gateway(&server.base_url());
    let meta = gateway
        .metadata(USER, PROJECT, &Provider::OsfStorage, "/5f0a")
        .await
        .unwrap();

    mock.assert();
    assert_eq!(meta.materialized_path(), "/docs/a.txt");
    assert_eq!(meta.provider_path(), "/5f0a");
    assert_eq!(meta.parsed_size(), Some(12));
    assert_eq!(meta.extra.version.as_deref(), Some("3"));
    assert!(meta.modified_at().is_some());
}

#[tokio::test]
async fn list_folder_returns_children() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET)
            .path("/v1/resources/abc12/providers/nextcloud/docs/");
        then.status(200).json_body(json!({
            "data": [
                { "attributes": { "path": "/docs/a.txt", "materialized": "/docs/a.txt", "kind": "file", "size": 1 } },
                { "attributes": { "path": "/docs/sub/", "materialized": "/docs/sub/", "kind": "folder" } }
            ]
        }));
    });

    let gateway = http_gateway(&server.base_url());
    let children = gateway
        .list_folder(USER, PROJECT, &Provider::Nextcloud, "/docs")
        .await
        .unwrap();

    assert_eq!(children.len(), 2);
    assert_eq!(children[0].kind, FileKind::File);
    assert_eq!(children[1].materialized_path(), "/docs/sub/");
}

#[tokio::test]
async fn non_200_is_unavailable_with_status() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET)
            .path("/v1/resources/abc12/providers/nextcloud/gone.txt");
        then.status(404).body("not here");
    });
    server.mock(|when, then| {
        when.method(GET)
            .path("/v1/resources/abc12/providers/nextcloud/broken.txt");
        then.status(502).body("bad gateway");
    });

    let gateway = http_gateway(&server.base_url());

    let err = gateway
        .metadata(USER, PROJECT, &Provider::Nextcloud, "/gone.txt")
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = gateway
        .metadata(USER, PROJECT, &Provider::Nextcloud, "/broken.txt")
        .await
        .unwrap_err();
    match err {
        GatewayError::Unavailable { status, message } => {
            assert_eq!(status, Some(502));
            assert!(message.contains("bad gateway"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn envelope_without_data_is_unavailable() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET)
            .path("/v1/resources/abc12/providers/nextcloud/a.txt");
        then.status(200).json_body(json!({ "errors": [] }));
    });

    let gateway = http_gateway(&server.base_url());
    let err = gateway
        .metadata(USER, PROJECT, &Provider::Nextcloud, "/a.txt")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GatewayError::Unavailable {
            status: Some(200),
            ..
        }
    ));
}

#[tokio::test]
async fn download_streams_to_disk() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET)
            .path("/v1/resources/abc12/providers/nextcloud/data.bin");
        then.status(200).body(vec![7u8; 4096]);
    });

    let gateway = http_gateway(&server.base_url());
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("data.bin");

    let written = gateway
        .download(USER, PROJECT, &Provider::Nextcloud, "/data.bin", &dest)
        .await
        .unwrap();
    assert_eq!(written, 4096);
    assert_eq!(std::fs::read(&dest).unwrap().len(), 4096);
}

#[tokio::test]
async fn upload_puts_into_folder() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(PUT)
            .path("/v1/resources/abc12/providers/osfstorage/")
            .query_param("kind", "file")
            .query_param("name", "report.csv")
            .body("a,b\n");
        then.status(200).json_body(json!({
            "data": {
                "attributes": {
                    "path": "/77aa",
                    "name": "report.csv",
                    "materialized": "/report.csv",
                    "kind": "file",
                    "size": 4
                }
            }
        }));
    });

    let gateway = http_gateway(&server.base_url());
    let meta = gateway
        .upload(
            USER,
            PROJECT,
            &Provider::OsfStorage,
            "/",
            "report.csv",
            Bytes::from_static(b"a,b\n"),
        )
        .await
        .unwrap();

    mock.assert();
    assert_eq!(meta.provider_path(), "/77aa");
}
