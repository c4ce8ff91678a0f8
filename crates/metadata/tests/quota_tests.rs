//! Integration tests for quota counters, key rows and directory data.

mod common;

use common::{TestMetadata, file_record, project};
use notary_metadata::models::*;
use notary_metadata::repos::*;
use time::OffsetDateTime;
use uuid::Uuid;

const MAX: i64 = 1024;

#[tokio::test]
async fn test_apply_delta_creates_then_clamps() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();

    let entry = store.apply_quota_delta("u1", 2, 1200, MAX).await.unwrap();
    assert_eq!(entry.used, 1200);
    assert_eq!(entry.max_quota, MAX);

    let entry = store.apply_quota_delta("u1", 2, 500, MAX).await.unwrap();
    assert_eq!(entry.used, 1700);

    let entry = store.apply_quota_delta("u1", 2, -5000, MAX).await.unwrap();
    assert_eq!(entry.used, 0);

    let entries = store.list_quotas("u1").await.unwrap();
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn test_release_missing_entry_is_none() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();

    assert!(store.release_quota("nobody", 1, 10).await.unwrap().is_none());

    store.apply_quota_delta("u1", 1, 100, MAX).await.unwrap();
    let entry = store.release_quota("u1", 1, 250).await.unwrap().unwrap();
    assert_eq!(entry.used, 0);
}

#[tokio::test]
async fn test_replace_used_overwrites() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();

    store.apply_quota_delta("u1", 1, 900, MAX).await.unwrap();
    let entry = store.replace_quota_used("u1", 1, 300, MAX).await.unwrap();
    assert_eq!(entry.used, 300);
}

#[tokio::test]
async fn test_live_usage_excludes_trashed_files_and_other_owners() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();

    store.upsert_project(&project("p1", "u1", Some(2))).await.unwrap();
    store.upsert_project(&project("p2", "u2", None)).await.unwrap();

    let live = file_record("p1", "osfstorage", "/a.txt");
    let mut trashed = file_record("p1", "osfstorage", "/b.txt");
    trashed.trashed_at = Some(OffsetDateTime::now_utc());
    let foreign = file_record("p2", "osfstorage", "/c.txt");
    for record in [&live, &trashed, &foreign] {
        store.upsert_file_record(record).await.unwrap();
        store.upsert_file_usage(record.file_id, 100).await.unwrap();
    }

    let usage = store.list_live_usage("u1").await.unwrap();
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].file_id, live.file_id);
    assert_eq!(usage[0].project_storage_type, Some(2));
}

#[tokio::test]
async fn test_file_usage_upsert() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();
    let file_id = Uuid::new_v4();

    store.upsert_file_usage(file_id, 10).await.unwrap();
    store.upsert_file_usage(file_id, 25).await.unwrap();
    assert_eq!(store.get_file_usage(file_id).await.unwrap().unwrap().file_size, 25);

    store.delete_file_usage(file_id).await.unwrap();
    assert!(store.get_file_usage(file_id).await.unwrap().is_none());
    // Deleting a missing row is fine.
    store.delete_file_usage(file_id).await.unwrap();
}

fn key_row(user_id: &str, kind: KeyKind, name: &str) -> UserKeyRow {
    UserKeyRow {
        key_id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        key_kind: kind.as_str().to_string(),
        key_name: name.to_string(),
        created_at: OffsetDateTime::now_utc(),
    }
}

#[tokio::test]
async fn test_insert_user_keys_is_idempotent() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();

    let first = store
        .insert_user_keys(
            &key_row("u1", KeyKind::Private, "k1_priv"),
            &key_row("u1", KeyKind::Public, "k1_pub"),
        )
        .await
        .unwrap();
    assert!(first);

    let second = store
        .insert_user_keys(
            &key_row("u1", KeyKind::Private, "k2_priv"),
            &key_row("u1", KeyKind::Public, "k2_pub"),
        )
        .await
        .unwrap();
    assert!(!second);

    let keys = store.get_user_keys("u1").await.unwrap();
    assert_eq!(keys.len(), 2);
    assert!(keys.iter().all(|k| k.key_name.starts_with("k1")));

    assert_eq!(store.delete_user_keys("u1").await.unwrap(), 2);
}

#[tokio::test]
async fn test_storages_by_account_and_contributor_order() {
    let metadata = TestMetadata::in_memory().await.unwrap();
    let store = metadata.store();
    store.upsert_project(&project("p1", "u1", None)).await.unwrap();

    store
        .attach_storage(&ProjectStorageRow {
            project_id: "p1".to_string(),
            provider: "nextcloudinstitutions".to_string(),
            account_id: Some("acct".to_string()),
            root_folder: Some("/Projects/p1/".to_string()),
        })
        .await
        .unwrap();

    for (user, position) in [("late", 2), ("early", 1)] {
        store
            .upsert_contributor(&ContributorRow {
                project_id: "p1".to_string(),
                user_id: user.to_string(),
                position,
                is_admin: true,
                is_disabled: false,
                identity: None,
            })
            .await
            .unwrap();
    }

    let storages = store
        .list_storages_by_account("nextcloudinstitutions", "acct")
        .await
        .unwrap();
    assert_eq!(storages.len(), 1);

    let contributors = store.list_contributors("p1").await.unwrap();
    assert_eq!(contributors[0].user_id, "early");

    store.detach_storage("p1", "nextcloudinstitutions").await.unwrap();
    assert!(store.list_project_storages("p1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_poll_state_roundtrip_on_disk() {
    let metadata = TestMetadata::on_disk().await.unwrap();
    let store = metadata.store();

    assert!(store.get_poll_state("acct").await.unwrap().is_none());
    store
        .put_poll_state(&PollStateRow {
            account_id: "acct".to_string(),
            settings: r#"{"since":"2024-01-01T00:00:00Z"}"#.to_string(),
            updated_at: OffsetDateTime::now_utc(),
        })
        .await
        .unwrap();
    let state = store.get_poll_state("acct").await.unwrap().unwrap();
    assert!(state.settings.contains("since"));
}
