//! Timestamp tokens and ledger checks against the local authority.

mod common;

use common::{ADMIN, PROJECT, TestEnv, event_json};
use notary_core::{FileMetadata, InspectionStatus, Provider};
use notary_metadata::models::FileRecordRow;
use notary_worker::timestamp::{self, FileDescriptor};
use notary_worker::{handle_payload, keys, reconcile, records};

async fn created(env: &TestEnv, provider: &Provider, path: &str, content: &[u8]) -> FileRecordRow {
    let meta = env.put(provider, path, content);
    handle_payload(&env.state, ADMIN, PROJECT, &event_json("create", provider, &meta))
        .await
        .unwrap();
    env.metadata
        .find_live_record(PROJECT, provider.as_str(), path)
        .await
        .unwrap()
        .expect("record created")
}

#[tokio::test]
async fn test_keypair_is_created_once() {
    let env = TestEnv::new().await;
    assert!(!keys::has_keypair(&env.state, ADMIN).await.unwrap());

    let first = keys::ensure_keypair(&env.state, ADMIN).await.unwrap();
    let second = keys::ensure_keypair(&env.state, ADMIN).await.unwrap();
    assert_eq!(first, second);
    assert!(keys::has_keypair(&env.state, ADMIN).await.unwrap());

    let rows = env.metadata.get_user_keys(ADMIN).await.unwrap();
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert!(env.state.config.timestamp.key_dir.join(&row.key_name).exists());
    }
}

#[tokio::test]
async fn test_created_file_is_stamped_and_verified() {
    let env = TestEnv::new().await;
    env.project(PROJECT, None, &[Provider::OsfStorage]).await;

    let meta = env.put(&Provider::OsfStorage, "/docs/report.txt", b"quarterly figures");
    let summary = handle_payload(
        &env.state,
        ADMIN,
        PROJECT,
        &event_json("create", &Provider::OsfStorage, &meta),
    )
    .await
    .unwrap();

    assert_eq!(summary.outcomes.len(), 1);
    let outcome = &summary.outcomes[0];
    assert_eq!(outcome.status(), InspectionStatus::Success);
    assert_eq!(outcome.filepath, "/osfstorage/docs/report.txt");

    let record = env
        .metadata
        .find_live_record(PROJECT, "osfstorage", "/docs/report.txt")
        .await
        .unwrap()
        .unwrap();
    assert_ne!(record.provider_path, record.materialized_path);

    let row = env.metadata.get_verification(record.file_id).await.unwrap().unwrap();
    assert_eq!(row.status(), InspectionStatus::Success);
    assert!(row.timestamp_token.as_ref().is_some_and(|t| !t.is_empty()));
    let key = keys::ensure_keypair(&env.state, ADMIN).await.unwrap();
    assert_eq!(row.key_file_name.as_deref(), Some(key.as_str()));
    assert_eq!(row.upload_file_size, Some(17));
    assert_eq!(row.verify_file_size, Some(17));
    assert_eq!(row.verify_user.as_deref(), Some(ADMIN));
}

#[tokio::test]
async fn test_tampered_content_is_ng() {
    let env = TestEnv::new().await;
    env.project(PROJECT, None, &[Provider::OsfStorage]).await;
    let record = created(&env, &Provider::OsfStorage, "/a.txt", b"original").await;

    // Content changed behind the worker's back, no event.
    env.put(&Provider::OsfStorage, "/a.txt", b"tampered");
    let outcome = timestamp::check_file_timestamp(&env.state, ADMIN, &FileDescriptor::from_record(&record))
        .await
        .unwrap();
    assert_eq!(outcome.status(), InspectionStatus::Ng);

    // Primary storage is re-verified, so restoring the content recovers.
    env.put(&Provider::OsfStorage, "/a.txt", b"original");
    let outcome = timestamp::check_file_timestamp(&env.state, ADMIN, &FileDescriptor::from_record(&record))
        .await
        .unwrap();
    assert_eq!(outcome.status(), InspectionStatus::Success);
}

#[tokio::test]
async fn test_ng_is_sticky_off_primary_storage() {
    let env = TestEnv::new().await;
    let provider = Provider::NextcloudInstitutions;
    env.project(PROJECT, None, &[provider.clone()]).await;
    let record = created(&env, &provider, "/a.txt", b"original").await;
    let descriptor = FileDescriptor::from_record(&record);

    env.put(&provider, "/a.txt", b"tampered");
    let outcome = timestamp::check_file_timestamp(&env.state, ADMIN, &descriptor)
        .await
        .unwrap();
    assert_eq!(outcome.status(), InspectionStatus::Ng);

    env.put(&provider, "/a.txt", b"original");
    let outcome = timestamp::check_file_timestamp(&env.state, ADMIN, &descriptor)
        .await
        .unwrap();
    assert_eq!(outcome.status(), InspectionStatus::Ng);
}

#[tokio::test]
async fn test_undownloadable_file_is_not_found() {
    let env = TestEnv::new().await;
    env.project(PROJECT, None, &[Provider::OsfStorage]).await;
    let record = created(&env, &Provider::OsfStorage, "/a.txt", b"content").await;

    env.gateway.remove(PROJECT, &Provider::OsfStorage, "/a.txt");
    let outcome = timestamp::check_file_timestamp(&env.state, ADMIN, &FileDescriptor::from_record(&record))
        .await
        .unwrap();
    assert_eq!(outcome.status(), InspectionStatus::FileNotFound);

    let row = env.metadata.get_verification(record.file_id).await.unwrap().unwrap();
    assert_eq!(row.status(), InspectionStatus::FileNotFound);
}

#[tokio::test]
async fn test_deleted_marker_survives_failed_download() {
    let env = TestEnv::new().await;
    env.project(PROJECT, None, &[Provider::OsfStorage]).await;
    let record = created(&env, &Provider::OsfStorage, "/a.txt", b"content").await;

    reconcile::file_node_deleted(&env.state, PROJECT, &Provider::OsfStorage, "/a.txt")
        .await
        .unwrap();
    env.gateway.set_unreachable(PROJECT, &Provider::OsfStorage, true);

    let outcome = timestamp::check_file_timestamp(&env.state, ADMIN, &FileDescriptor::from_record(&record))
        .await
        .unwrap();
    assert_eq!(outcome.status(), InspectionStatus::FileNotExists);
}

#[tokio::test]
async fn test_file_without_ledger_row_is_token_missing() {
    let env = TestEnv::new().await;
    env.project(PROJECT, None, &[Provider::OsfStorage]).await;

    let meta = env.put(&Provider::OsfStorage, "/untracked.txt", b"never stamped");
    let record = records::upsert_from_metadata(&env.state, PROJECT, &Provider::OsfStorage, &meta)
        .await
        .unwrap();

    let outcome = timestamp::check_file_timestamp(&env.state, ADMIN, &FileDescriptor::from_record(&record))
        .await
        .unwrap();
    assert_eq!(outcome.status(), InspectionStatus::TokenMissing);
    assert!(env.metadata.get_verification(record.file_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_failed_stamp_leaves_no_data_row() {
    let env = TestEnv::new().await;
    env.project(PROJECT, None, &[Provider::OsfStorage]).await;

    // The event names a file the gateway does not hold.
    let meta = FileMetadata::file("/phantom.txt", 12);
    let summary = handle_payload(
        &env.state,
        ADMIN,
        PROJECT,
        &event_json("create", &Provider::OsfStorage, &meta),
    )
    .await
    .unwrap();
    assert!(summary.outcomes.is_empty());

    let record = env
        .metadata
        .find_live_record(PROJECT, "osfstorage", "/phantom.txt")
        .await
        .unwrap()
        .unwrap();
    let row = env.metadata.get_verification(record.file_id).await.unwrap().unwrap();
    assert_eq!(row.status(), InspectionStatus::NoData);
    assert!(row.timestamp_token.is_none());

    let outcome = timestamp::timestamp_check(
        &env.state,
        ADMIN,
        &FileDescriptor::from_record(&record),
        std::path::Path::new("/nonexistent"),
    )
    .await
    .unwrap();
    assert_eq!(outcome.status(), InspectionStatus::NoData);
}

#[tokio::test]
async fn test_updated_file_gets_new_token() {
    let env = TestEnv::new().await;
    env.project(PROJECT, None, &[Provider::OsfStorage]).await;
    let record = created(&env, &Provider::OsfStorage, "/a.txt", b"v1").await;
    let first = env
        .metadata
        .get_verification(record.file_id)
        .await
        .unwrap()
        .unwrap()
        .timestamp_token;

    let meta = env.put(&Provider::OsfStorage, "/a.txt", b"version two");
    let summary = handle_payload(
        &env.state,
        ADMIN,
        PROJECT,
        &event_json("update", &Provider::OsfStorage, &meta),
    )
    .await
    .unwrap();
    assert_eq!(summary.outcomes[0].status(), InspectionStatus::Success);

    let row = env.metadata.get_verification(record.file_id).await.unwrap().unwrap();
    assert_ne!(row.timestamp_token, first);
    assert_eq!(row.upload_file_size, Some(11));
}

#[tokio::test]
async fn test_local_check_reports_stored_intentional_status() {
    let env = TestEnv::new().await;
    env.project(PROJECT, None, &[Provider::OsfStorage]).await;

    // Stamping fails, leaving a row without a token.
    let meta = FileMetadata::file("/detached.txt", 5);
    handle_payload(
        &env.state,
        ADMIN,
        PROJECT,
        &event_json("create", &Provider::OsfStorage, &meta),
    )
    .await
    .unwrap();
    let record = env
        .metadata
        .find_live_record(PROJECT, "osfstorage", "/detached.txt")
        .await
        .unwrap()
        .unwrap();
    env.metadata
        .set_verification_status(record.file_id, InspectionStatus::StorageDisconnected.code(), &[])
        .await
        .unwrap();

    let outcome = timestamp::timestamp_check(
        &env.state,
        ADMIN,
        &FileDescriptor::from_record(&record),
        std::path::Path::new("/nonexistent"),
    )
    .await
    .unwrap();
    assert_eq!(outcome.status(), InspectionStatus::StorageDisconnected);
    let row = env.metadata.get_verification(record.file_id).await.unwrap().unwrap();
    assert_eq!(row.status(), InspectionStatus::StorageDisconnected);
}
