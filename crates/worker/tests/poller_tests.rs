//! Institutional change poller.

mod common;

use common::{ADMIN, PROJECT, TestEnv};
use notary_core::config::InstitutionAccountConfig;
use notary_core::{FileKind, InspectionStatus, Provider};
use notary_gateway::InMemoryChangeFeed;
use notary_metadata::models::PollStateRow;
use notary_worker::{DirLock, WorkerError, poller};
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

const ACCOUNT: &str = "acct-1";

fn account() -> InstitutionAccountConfig {
    InstitutionAccountConfig {
        account_id: ACCOUNT.to_string(),
        provider: "nextcloudinstitutions".to_string(),
        base_url: "https://files.inst1.example.org".to_string(),
        username: "poller".to_string(),
        password: None,
        page_limit: 100,
    }
}

async fn setup() -> (TestEnv, DirLock) {
    let env = TestEnv::with_config(|c| c.poller.lock_retries = 1).await;
    env.project(PROJECT, None, &[]).await;
    env.attach(PROJECT, &Provider::NextcloudInstitutions, Some(ACCOUNT), Some("/groups/lab/"))
        .await;
    let lock = DirLock::new(&env.state.config.poller.lock_dir);
    (env, lock)
}

#[tokio::test]
async fn test_poll_stamps_changed_files_as_admin() {
    let (env, lock) = setup().await;
    env.put(&Provider::NextcloudInstitutions, "/data/a.csv", b"1,2,3");

    let feed = InMemoryChangeFeed::new();
    let recent = OffsetDateTime::now_utc() - Duration::milliseconds(200);
    feed.record("/groups/lab/data/a.csv", FileKind::File, recent);
    feed.record("/groups/lab/data/", FileKind::Folder, recent);
    feed.record("/elsewhere/b.csv", FileKind::File, recent);

    let stats = poller::poll_account(&env.state, &account(), &feed, &lock)
        .await
        .unwrap()
        .expect("lease was free");
    assert_eq!(stats.changes, 3);
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.skipped, 2);
    assert_eq!(stats.errors, 0);

    let record = env
        .metadata
        .find_live_record(PROJECT, "nextcloudinstitutions", "/data/a.csv")
        .await
        .unwrap()
        .unwrap();
    let row = env.metadata.get_verification(record.file_id).await.unwrap().unwrap();
    assert_eq!(row.status(), InspectionStatus::Success);
    assert_eq!(row.verify_user.as_deref(), Some(ADMIN));
}

#[tokio::test]
async fn test_poll_persists_watermark_and_keeps_settings() {
    let (env, lock) = setup().await;
    let old = OffsetDateTime::now_utc() - Duration::hours(1);
    env.metadata
        .put_poll_state(&PollStateRow {
            account_id: ACCOUNT.to_string(),
            settings: serde_json::json!({
                "since": old.format(&Rfc3339).unwrap(),
                "page": 3,
            })
            .to_string(),
            updated_at: old,
        })
        .await
        .unwrap();

    // Older than the default window but newer than the stored watermark.
    env.put(&Provider::NextcloudInstitutions, "/late.csv", b"late");
    let feed = InMemoryChangeFeed::new();
    feed.record(
        "/groups/lab/late.csv",
        FileKind::File,
        OffsetDateTime::now_utc() - Duration::minutes(10),
    );

    let stats = poller::poll_account(&env.state, &account(), &feed, &lock)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stats.processed, 1);

    let row = env.metadata.get_poll_state(ACCOUNT).await.unwrap().unwrap();
    let settings: serde_json::Value = serde_json::from_str(&row.settings).unwrap();
    assert_eq!(settings["page"], 3);
    let since = OffsetDateTime::parse(settings["since"].as_str().unwrap(), &Rfc3339).unwrap();
    assert!(since > old);
    assert_eq!(Some(since), stats.watermark);
}

#[tokio::test]
async fn test_per_file_errors_do_not_stop_the_poll() {
    let (env, lock) = setup().await;
    env.put(&Provider::NextcloudInstitutions, "/good.csv", b"ok");

    let feed = InMemoryChangeFeed::new();
    let recent = OffsetDateTime::now_utc() - Duration::milliseconds(100);
    feed.record("/groups/lab/missing.csv", FileKind::File, recent);
    feed.record("/groups/lab/good.csv", FileKind::File, recent);

    let stats = poller::poll_account(&env.state, &account(), &feed, &lock)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.processed, 1);
}

#[tokio::test]
async fn test_held_lease_skips_poll() {
    let (env, lock) = setup().await;
    let _held = lock.try_acquire(&format!("poll-{ACCOUNT}")).unwrap().unwrap();

    let feed = InMemoryChangeFeed::new();
    let result = poller::poll_account(&env.state, &account(), &feed, &lock)
        .await
        .unwrap();
    assert!(result.is_none());
    assert!(env.metadata.get_poll_state(ACCOUNT).await.unwrap().is_none());

    let blocking = poller::poll_account_blocking(&env.state, &account(), &feed, &lock).await;
    assert!(matches!(blocking, Err(WorkerError::LockHeld(_))));
}

#[tokio::test]
async fn test_failing_feed_releases_lease() {
    let (env, lock) = setup().await;
    let feed = InMemoryChangeFeed::new();
    feed.set_failing(true);

    let result = poller::poll_account(&env.state, &account(), &feed, &lock).await;
    assert!(matches!(result, Err(WorkerError::Gateway(_))));
    assert!(env.metadata.get_poll_state(ACCOUNT).await.unwrap().is_none());

    let lease = lock.try_acquire(&format!("poll-{ACCOUNT}")).unwrap();
    assert!(lease.is_some());
}
