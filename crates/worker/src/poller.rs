//! Institutional storage change poller.
//!
//! One poll of an account: take the account's lease, read the watermark,
//! process everything changed since, sleep out the interval, process what
//! landed on the boundary in a second pass, persist the new watermark and
//! give the lease back. A poll that finds the lease held does nothing.

use crate::error::{WorkerError, WorkerResult};
use crate::lock::DirLock;
use crate::state::AppState;
use crate::timestamp;
use notary_core::config::InstitutionAccountConfig;
use notary_core::{FileKind, Provider, path};
use notary_gateway::{ChangeFeed, ChangedFile};
use notary_metadata::models::{ContributorRow, PollStateRow, ProjectStorageRow};
use serde::Serialize;
use std::collections::HashSet;
use std::time::Instant;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio_util::sync::CancellationToken;

/// Settings key holding the watermark.
const SINCE_KEY: &str = "since";

/// Counters of one poll.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PollStats {
    pub changes: usize,
    pub processed: usize,
    pub skipped: usize,
    pub errors: usize,
    #[serde(with = "time::serde::rfc3339::option")]
    pub watermark: Option<OffsetDateTime>,
}

/// Poll one account once. `Ok(None)` when another poll holds its lease.
pub async fn poll_account(
    state: &AppState,
    account: &InstitutionAccountConfig,
    feed: &dyn ChangeFeed,
    lock: &DirLock,
) -> WorkerResult<Option<PollStats>> {
    let key = format!("poll-{}", account.account_id);
    let Some(lease) = lock.try_acquire(&key)? else {
        tracing::info!(account_id = %account.account_id, "poll already running, skipping");
        return Ok(None);
    };

    let result = run_passes(state, account, feed).await;
    if let Err(e) = lease.release() {
        tracing::warn!(account_id = %account.account_id, error = %e, "failed to release poll lease");
    }
    result.map(Some)
}

/// Poll one account, waiting for the lease with bounded retries.
pub async fn poll_account_blocking(
    state: &AppState,
    account: &InstitutionAccountConfig,
    feed: &dyn ChangeFeed,
    lock: &DirLock,
) -> WorkerResult<PollStats> {
    let key = format!("poll-{}", account.account_id);
    let config = &state.config.poller;
    let lease = lock
        .acquire_with_retry(&key, config.lock_retries, config.interval())
        .await?
        .ok_or_else(|| WorkerError::LockHeld(key.clone()))?;

    let result = run_passes(state, account, feed).await;
    if let Err(e) = lease.release() {
        tracing::warn!(account_id = %account.account_id, error = %e, "failed to release poll lease");
    }
    result
}

async fn run_passes(
    state: &AppState,
    account: &InstitutionAccountConfig,
    feed: &dyn ChangeFeed,
) -> WorkerResult<PollStats> {
    let interval = state.config.poller.interval();
    let mut stats = PollStats::default();

    let first_start = OffsetDateTime::now_utc();
    let started = Instant::now();
    let since = load_watermark(state, &account.account_id)
        .await?
        .unwrap_or(first_start - interval);

    let mut done = HashSet::new();
    let changes = feed.changed_since(since).await?;
    process_changes(state, account, &changes, &mut done, &mut stats).await?;

    if let Some(remaining) = interval.checked_sub(started.elapsed()) {
        tokio::time::sleep(remaining).await;
    }

    let second_start = OffsetDateTime::now_utc();
    let changes = feed.changed_since(first_start).await?;
    process_changes(state, account, &changes, &mut done, &mut stats).await?;

    save_watermark(state, &account.account_id, second_start).await?;
    stats.watermark = Some(second_start);

    tracing::info!(
        account_id = %account.account_id,
        changes = stats.changes,
        processed = stats.processed,
        skipped = stats.skipped,
        errors = stats.errors,
        "poll finished"
    );
    Ok(stats)
}

async fn process_changes(
    state: &AppState,
    account: &InstitutionAccountConfig,
    changes: &[ChangedFile],
    done: &mut HashSet<(String, OffsetDateTime)>,
    stats: &mut PollStats,
) -> WorkerResult<()> {
    let provider = Provider::from(account.provider.clone());
    let storages = state
        .metadata
        .list_storages_by_account(provider.as_str(), &account.account_id)
        .await?;

    for change in changes {
        if !done.insert((change.path.clone(), change.changed_at)) {
            continue;
        }
        stats.changes += 1;
        if change.kind == FileKind::Folder {
            stats.skipped += 1;
            continue;
        }
        match process_change(state, &provider, &storages, change).await {
            Ok(true) => stats.processed += 1,
            Ok(false) => stats.skipped += 1,
            Err(e) => {
                stats.errors += 1;
                tracing::warn!(
                    account_id = %account.account_id,
                    path = %change.path,
                    code = e.code(),
                    error = %e,
                    "failed to process changed file"
                );
            }
        }
    }
    Ok(())
}

/// Returns whether the change was handed to the timestamp service.
async fn process_change(
    state: &AppState,
    provider: &Provider,
    storages: &[ProjectStorageRow],
    change: &ChangedFile,
) -> WorkerResult<bool> {
    let Some((storage, relative)) = owning_storage(storages, &change.path) else {
        tracing::debug!(path = %change.path, "changed file belongs to no project");
        return Ok(false);
    };
    let project_id = &storage.project_id;

    let contributors = state.metadata.list_contributors(project_id).await?;
    let Some(admin) = acting_admin(&contributors) else {
        tracing::warn!(project_id = %project_id, "no eligible administrator to act as");
        return Ok(false);
    };

    let metadata = state
        .gateway
        .metadata(&admin.user_id, project_id, provider, &relative)
        .await?;
    timestamp::file_created_or_updated(state, &admin.user_id, project_id, provider, &metadata)
        .await?;

    tracing::debug!(
        project_id = %project_id,
        user_id = %admin.user_id,
        path = %relative,
        "processed changed file"
    );
    Ok(true)
}

/// The storage whose root folder is the longest prefix of `changed_path`,
/// with the path relative to that root.
pub fn owning_storage<'a>(
    storages: &'a [ProjectStorageRow],
    changed_path: &str,
) -> Option<(&'a ProjectStorageRow, String)> {
    storages
        .iter()
        .filter_map(|s| {
            let root = s.root_folder.as_deref()?;
            let relative = path::relative_to(changed_path, root)?;
            Some((s, relative, path::normalize(root).trim_end_matches('/').len()))
        })
        .max_by_key(|(_, _, depth)| *depth)
        .map(|(s, relative, _)| (s, relative))
}

/// First enabled administrator with a recognized identity, in contributor
/// order.
pub fn acting_admin(contributors: &[ContributorRow]) -> Option<&ContributorRow> {
    contributors
        .iter()
        .find(|c| c.is_admin && !c.is_disabled && c.identity.as_deref().is_some_and(|i| !i.is_empty()))
}

async fn load_watermark(state: &AppState, account_id: &str) -> WorkerResult<Option<OffsetDateTime>> {
    let Some(row) = state.metadata.get_poll_state(account_id).await? else {
        return Ok(None);
    };
    let settings: serde_json::Value = match serde_json::from_str(&row.settings) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(account_id = %account_id, error = %e, "unreadable poll settings, starting fresh");
            return Ok(None);
        }
    };
    Ok(settings
        .get(SINCE_KEY)
        .and_then(|v| v.as_str())
        .and_then(|s| OffsetDateTime::parse(s, &Rfc3339).ok()))
}

/// Store the watermark, keeping any other settings of the account.
async fn save_watermark(state: &AppState, account_id: &str, since: OffsetDateTime) -> WorkerResult<()> {
    let mut settings = match state.metadata.get_poll_state(account_id).await? {
        Some(row) => serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(&row.settings)
            .unwrap_or_default(),
        None => serde_json::Map::new(),
    };
    let formatted = since
        .format(&Rfc3339)
        .map_err(|e| WorkerError::Config(format!("cannot format watermark: {e}")))?;
    settings.insert(SINCE_KEY.to_string(), serde_json::Value::String(formatted));

    state
        .metadata
        .put_poll_state(&PollStateRow {
            account_id: account_id.to_string(),
            settings: serde_json::Value::Object(settings).to_string(),
            updated_at: OffsetDateTime::now_utc(),
        })
        .await?;
    Ok(())
}

/// Poll every configured account on the poller interval until cancelled.
pub async fn run(
    state: &AppState,
    feeds: &[(InstitutionAccountConfig, std::sync::Arc<dyn ChangeFeed>)],
    cancel: &CancellationToken,
) -> WorkerResult<()> {
    let lock = DirLock::new(&state.config.poller.lock_dir);
    loop {
        for (account, feed) in feeds {
            if cancel.is_cancelled() {
                return Ok(());
            }
            if let Err(e) = poll_account(state, account, feed.as_ref(), &lock).await {
                tracing::error!(account_id = %account.account_id, error = %e, "poll failed");
            }
        }
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(state.config.poller.interval()) => {}
        }
    }
}
