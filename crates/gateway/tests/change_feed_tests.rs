mod common;

use common::can_bind_localhost;
use httpmock::Method::GET;
use httpmock::MockServer;
use notary_core::FileKind;
use notary_gateway::{ChangeFeed, GatewayError, NextcloudChangeFeed};
use serde_json::json;
use std::time::Duration;
use time::macros::datetime;

const ACTIVITY_PATH: &str = "/ocs/v2.php/apps/activity/api/v2/activity/files";

fn feed(base_url: &str, page_limit: u32) -> NextcloudChangeFeed {
    NextcloudChangeFeed::new(
        base_url,
        "alice",
        Some("secret".to_string()),
        page_limit,
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn changed_since_filters_dedupes_and_orders_oldest_first() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path(ACTIVITY_PATH)
            .query_param("format", "json")
            .query_param("sort", "desc")
            .header("ocs-apirequest", "true")
            .header("authorization", "Basic YWxpY2U6c2VjcmV0");
        then.status(200).json_body(json!({
            "ocs": {
                "data": [
                    { "activity_id": 14, "object_type": "files", "object_name": "/proj/a.txt", "datetime": "2024-05-01T10:05:00+00:00" },
                    { "activity_id": 13, "object_type": "calendar", "object_name": "meeting", "datetime": "2024-05-01T10:04:00+00:00" },
                    { "activity_id": 12, "object_type": "files", "object_name": "/proj/b.txt", "datetime": "2024-05-01T10:03:00+00:00" },
                    { "activity_id": 11, "object_type": "files", "object_name": "/proj/a.txt", "datetime": "2024-05-01T10:02:00+00:00" },
                    { "activity_id": 10, "object_type": "files", "object_name": "/proj/old.txt", "datetime": "2024-05-01T09:00:00+00:00" }
                ]
            }
        }));
    });

    let changes = feed(&server.base_url(), 50)
        .changed_since(datetime!(2024-05-01 10:00 UTC))
        .await
        .unwrap();

    mock.assert();
    let paths: Vec<_> = changes.iter().map(|c| c.path.as_str()).collect();
    assert_eq!(paths, vec!["/proj/b.txt", "/proj/a.txt"]);
    assert_eq!(changes[1].changed_at, datetime!(2024-05-01 10:05 UTC));
    assert!(changes.iter().all(|c| c.kind == FileKind::File));
}

#[tokio::test]
async fn not_modified_means_no_changes() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path(ACTIVITY_PATH);
        then.status(304);
    });

    let changes = feed(&server.base_url(), 50)
        .changed_since(datetime!(2024-05-01 10:00 UTC))
        .await
        .unwrap();
    assert!(changes.is_empty());
}

#[tokio::test]
async fn server_error_is_unavailable() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path(ACTIVITY_PATH);
        then.status(503).body("maintenance");
    });

    let err = feed(&server.base_url(), 50)
        .changed_since(datetime!(2024-05-01 10:00 UTC))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GatewayError::Unavailable {
            status: Some(503),
            ..
        }
    ));
}

#[test]
fn zero_page_limit_rejected() {
    let result = NextcloudChangeFeed::new(
        "https://cloud.example.org",
        "alice",
        None,
        0,
        Duration::from_secs(5),
    );
    assert!(matches!(result, Err(GatewayError::Config(_))));
}
