//! Quota accounting.
//!
//! Keeps a running byte counter per (user, storage class), charged to the
//! project creator. Events apply deltas; [`recount_user`] recomputes the
//! counters from the per-file audit rows and wins over anything the events
//! accumulated.

use crate::error::WorkerResult;
use crate::records;
use crate::state::AppState;
use notary_core::{DEFAULT_REGION_ID, FileMetadata, Provider, StorageType, format_size};
use notary_metadata::models::{FileRecordRow, QuotaLedgerRow, RegionRow};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Whose counter an event charges, and which one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChargeTarget {
    pub owner_id: String,
    pub storage_type: StorageType,
}

fn default_max_quota(state: &AppState) -> i64 {
    i64::try_from(state.config.quota.default_max_quota_bytes()).unwrap_or(i64::MAX)
}

/// Resolve the counter charged for files of `provider` in a project.
/// `None` when the provider is not charged or the project is unknown.
pub async fn resolve_charge(
    state: &AppState,
    project_id: &str,
    provider: &Provider,
) -> WorkerResult<Option<ChargeTarget>> {
    if provider.charged_storage_type(None).is_none() {
        return Ok(None);
    }
    let Some(project) = state.metadata.get_project(project_id).await? else {
        tracing::warn!(project_id = %project_id, "quota event for unknown project");
        return Ok(None);
    };
    Ok(provider
        .charged_storage_type(project.storage_type())
        .map(|storage_type| ChargeTarget {
            owner_id: project.creator_id,
            storage_type,
        }))
}

/// Charge a newly added file. Folders and sizes that are missing or negative
/// charge nothing.
pub async fn file_added(
    state: &AppState,
    project_id: &str,
    provider: &Provider,
    metadata: &FileMetadata,
    record: &FileRecordRow,
) -> WorkerResult<Option<QuotaLedgerRow>> {
    if metadata.is_folder() {
        return Ok(None);
    }
    let Some(size) = event_size(metadata) else {
        return Ok(None);
    };
    let Some(target) = resolve_charge(state, project_id, provider).await? else {
        return Ok(None);
    };

    let entry = state
        .metadata
        .apply_quota_delta(
            &target.owner_id,
            target.storage_type.code(),
            size,
            default_max_quota(state),
        )
        .await?;
    state.metadata.upsert_file_usage(record.file_id, size).await?;

    tracing::debug!(
        user_id = %target.owner_id,
        storage_type = %target.storage_type,
        file_id = %record.file_id,
        size,
        used = entry.used,
        "charged added file"
    );
    Ok(Some(entry))
}

/// Apply the size change of a modified file against its last charged size.
pub async fn file_modified(
    state: &AppState,
    project_id: &str,
    provider: &Provider,
    metadata: &FileMetadata,
    record: &FileRecordRow,
) -> WorkerResult<Option<QuotaLedgerRow>> {
    if metadata.is_folder() {
        return Ok(None);
    }
    let Some(size) = event_size(metadata) else {
        return Ok(None);
    };
    let Some(target) = resolve_charge(state, project_id, provider).await? else {
        return Ok(None);
    };

    let previous = state
        .metadata
        .get_file_usage(record.file_id)
        .await?
        .map(|u| u.file_size)
        .unwrap_or(0);
    let delta = size - previous;

    let entry = state
        .metadata
        .apply_quota_delta(
            &target.owner_id,
            target.storage_type.code(),
            delta,
            default_max_quota(state),
        )
        .await?;
    state.metadata.upsert_file_usage(record.file_id, size).await?;

    tracing::debug!(
        user_id = %target.owner_id,
        storage_type = %target.storage_type,
        file_id = %record.file_id,
        delta,
        used = entry.used,
        "charged modified file"
    );
    Ok(Some(entry))
}

/// Release the charge of a removed file or folder subtree.
///
/// The record must already be trashed. Each file releases at most what is
/// still recorded as used. A missing counter or audit row is logged and
/// skipped. Returns the number of bytes released.
pub async fn node_removed(
    state: &AppState,
    project_id: &str,
    provider: &Provider,
    record: &FileRecordRow,
) -> WorkerResult<i64> {
    if !record.is_trashed() {
        tracing::warn!(
            file_id = %record.file_id,
            path = %record.materialized_path,
            "refusing to release quota of a live record"
        );
        return Ok(0);
    }
    let Some(target) = resolve_charge(state, project_id, provider).await? else {
        return Ok(0);
    };
    let Some(entry) = state
        .metadata
        .get_quota(&target.owner_id, target.storage_type.code())
        .await?
    else {
        tracing::error!(
            user_id = %target.owner_id,
            storage_type = %target.storage_type,
            "no quota entry to release from"
        );
        return Ok(0);
    };

    let files: Vec<Uuid> = records::subtree(state, record)
        .await?
        .into_iter()
        .filter(|r| !r.is_folder())
        .map(|r| r.file_id)
        .collect();

    let mut remaining = entry.used;
    let mut released = 0;
    for file_id in files {
        let Some(usage) = state.metadata.get_file_usage(file_id).await? else {
            tracing::error!(file_id = %file_id, "no usage row for removed file");
            continue;
        };
        let amount = usage.file_size.min(remaining);
        if amount <= 0 {
            continue;
        }
        if let Some(updated) = state
            .metadata
            .release_quota(&target.owner_id, target.storage_type.code(), amount)
            .await?
        {
            remaining = updated.used;
            released += amount;
        }
    }

    tracing::debug!(
        user_id = %target.owner_id,
        storage_type = %target.storage_type,
        path = %record.materialized_path,
        released,
        used = remaining,
        "released removed files"
    );
    Ok(released)
}

/// Move the charge of moved files when the move crosses counters.
pub async fn file_moved(
    state: &AppState,
    src_project: &str,
    src_provider: &Provider,
    dest_project: &str,
    dest_provider: &Provider,
    file_ids: &[Uuid],
) -> WorkerResult<()> {
    let src = resolve_charge(state, src_project, src_provider).await?;
    let dest = resolve_charge(state, dest_project, dest_provider).await?;
    if src == dest {
        return Ok(());
    }

    let max = default_max_quota(state);
    for file_id in file_ids {
        let Some(usage) = state.metadata.get_file_usage(*file_id).await? else {
            continue;
        };
        if let Some(src) = &src {
            state
                .metadata
                .release_quota(&src.owner_id, src.storage_type.code(), usage.file_size)
                .await?;
        }
        if let Some(dest) = &dest {
            state
                .metadata
                .apply_quota_delta(&dest.owner_id, dest.storage_type.code(), usage.file_size, max)
                .await?;
        }
    }
    Ok(())
}

/// Release the files of a destination that a move or copy is about to
/// clobber and drop their audit rows. Trashed records were released when
/// they were removed and only lose the audit row. Returns the bytes released.
pub async fn node_overwritten(
    state: &AppState,
    project_id: &str,
    provider: &Provider,
    file_ids: &[Uuid],
) -> WorkerResult<i64> {
    let target = resolve_charge(state, project_id, provider).await?;
    let mut released = 0;
    for file_id in file_ids {
        let Some(usage) = state.metadata.get_file_usage(*file_id).await? else {
            continue;
        };
        let live = state
            .metadata
            .get_file_record(*file_id)
            .await?
            .is_some_and(|r| !r.is_trashed() && !r.is_folder());
        if live
            && usage.file_size > 0
            && let Some(target) = &target
            && let Some(updated) = state
                .metadata
                .release_quota(&target.owner_id, target.storage_type.code(), usage.file_size)
                .await?
        {
            released += usage.file_size;
            tracing::debug!(
                user_id = %target.owner_id,
                storage_type = %target.storage_type,
                file_id = %file_id,
                used = updated.used,
                "released overwritten file"
            );
        }
        state.metadata.delete_file_usage(*file_id).await?;
    }
    Ok(released)
}

/// Point the user at the region of their first affiliated institution, or
/// the default region when none of their institutions has one.
pub async fn update_default_storage(state: &AppState, user_id: &str) -> WorkerResult<RegionRow> {
    let mut region = None;
    for affiliation in state.metadata.list_affiliations(user_id).await? {
        if let Some(found) = state
            .metadata
            .get_institution_region(&affiliation.institution_id)
            .await?
        {
            region = Some(found);
            break;
        }
    }

    let region = match region {
        Some(region) => region,
        None => match state.metadata.get_region(DEFAULT_REGION_ID).await? {
            Some(region) => region,
            None => {
                let region = RegionRow {
                    region_id: DEFAULT_REGION_ID.to_string(),
                    name: "United States".to_string(),
                    institution_id: None,
                    gateway_url: None,
                };
                state.metadata.upsert_region(&region).await?;
                region
            }
        },
    };

    state.metadata.set_user_region(user_id, &region.region_id).await?;
    tracing::info!(user_id = %user_id, region_id = %region.region_id, "updated default storage");
    Ok(region)
}

/// Recompute every counter of a user from the live files of their projects
/// and overwrite the ledger.
pub async fn recount_user(state: &AppState, user_id: &str) -> WorkerResult<Vec<QuotaLedgerRow>> {
    let mut totals: BTreeMap<StorageType, i64> = BTreeMap::new();
    for usage in state.metadata.list_live_usage(user_id).await? {
        let project_class = usage
            .project_storage_type
            .and_then(|code| StorageType::from_code(code).ok());
        if let Some(class) = Provider::from(usage.provider).charged_storage_type(project_class) {
            *totals.entry(class).or_default() += usage.file_size;
        }
    }

    let max = default_max_quota(state);
    let mut out = Vec::new();
    for class in StorageType::ALL {
        let existing = state.metadata.get_quota(user_id, class.code()).await?;
        let total = totals.get(&class).copied().unwrap_or(0);
        if existing.is_none() && total == 0 {
            continue;
        }
        let max_quota = existing.as_ref().map(|e| e.max_quota).unwrap_or(max);
        let row = state
            .metadata
            .replace_quota_used(user_id, class.code(), total, max_quota)
            .await?;
        if let Some(previous) = existing
            && previous.used != row.used
        {
            tracing::info!(
                user_id = %user_id,
                storage_type = %class,
                incremental = previous.used,
                recounted = row.used,
                "quota recount corrected drift"
            );
        }
        out.push(row);
    }
    Ok(out)
}

/// One counter, formatted for display.
#[derive(Clone, Debug, Serialize)]
pub struct QuotaSummary {
    pub storage_type: StorageType,
    pub used: i64,
    pub max_quota: i64,
    pub used_display: String,
    pub max_display: String,
    pub percent: f64,
}

/// Display view of every counter a user has.
pub async fn quota_summary(state: &AppState, user_id: &str) -> WorkerResult<Vec<QuotaSummary>> {
    Ok(state
        .metadata
        .list_quotas(user_id)
        .await?
        .into_iter()
        .filter_map(|row| {
            let storage_type = row.storage_type()?;
            let used = u64::try_from(row.used).unwrap_or(0);
            let max = u64::try_from(row.max_quota).unwrap_or(0);
            let percent = if max == 0 {
                0.0
            } else {
                used as f64 / max as f64 * 100.0
            };
            Some(QuotaSummary {
                storage_type,
                used: row.used,
                max_quota: row.max_quota,
                used_display: format_size(used),
                max_display: format_size(max),
                percent,
            })
        })
        .collect())
}

/// Size carried by an event, if it can be charged.
fn event_size(metadata: &FileMetadata) -> Option<i64> {
    match metadata.size {
        Some(size) if size >= 0 => Some(size),
        Some(size) => {
            tracing::warn!(path = %metadata.materialized_path(), size, "ignoring negative file size");
            None
        }
        None => {
            tracing::warn!(path = %metadata.materialized_path(), "ignoring event without file size");
            None
        }
    }
}
