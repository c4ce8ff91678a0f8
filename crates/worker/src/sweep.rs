//! Project-wide verification sweeps and the administrator error report.

use crate::error::WorkerResult;
use crate::reconcile;
use crate::records;
use crate::state::AppState;
use crate::throttle::Throttle;
use crate::timestamp::{self, FileDescriptor};
use notary_core::{FileMetadata, InspectionStatus, Provider, path};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

/// Counters of one sweep.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SweepStats {
    /// Files checked, by status title.
    pub by_status: BTreeMap<String, u64>,
    pub checked: u64,
    /// Per-file failures that did not stop the sweep.
    pub errors: u64,
    /// Ledger rows marked not found because their file no longer appears.
    pub gone: u64,
    /// Ledger rows of providers no longer attached to the project.
    pub disconnected: u64,
    /// Ledger rows of providers whose root could not be listed.
    pub not_accessible: u64,
    pub cancelled: bool,
}

impl SweepStats {
    fn record(&mut self, status: InspectionStatus) {
        self.checked += 1;
        *self.by_status.entry(status.title().to_string()).or_default() += 1;
    }
}

/// Re-check every file of every provider attached to a project.
///
/// Checks are paced by `timestamp.requests_per_minute`. Cancellation is
/// honoured between files; a file already being checked finishes first.
pub async fn verify_project(
    state: &AppState,
    user_id: &str,
    project_id: &str,
    cancel: &CancellationToken,
) -> WorkerResult<SweepStats> {
    let mut stats = SweepStats::default();
    let intentional = InspectionStatus::intentional_codes();

    let attached: Vec<Provider> = state
        .metadata
        .list_project_storages(project_id)
        .await?
        .iter()
        .map(|s| s.provider())
        .collect();

    for name in state.metadata.list_ledger_providers(project_id).await? {
        let provider = Provider::from(name);
        if !attached.contains(&provider) {
            stats.disconnected += state
                .metadata
                .update_status_under(
                    project_id,
                    provider.as_str(),
                    "/",
                    InspectionStatus::StorageDisconnected.code(),
                    &intentional,
                )
                .await?;
        }
    }

    let throttle = Throttle::per_minute(state.config.timestamp.requests_per_minute);

    'providers: for provider in &attached {
        let files = match list_files(state, user_id, project_id, provider, &mut stats).await {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(
                    project_id = %project_id,
                    provider = %provider,
                    error = %e,
                    "storage root not accessible"
                );
                stats.not_accessible += state
                    .metadata
                    .update_status_under(
                        project_id,
                        provider.as_str(),
                        "/",
                        InspectionStatus::StorageNotAccessible.code(),
                        &intentional,
                    )
                    .await?;
                continue;
            }
        };

        let mut seen = HashSet::new();
        for file in &files {
            if cancel.is_cancelled() {
                stats.cancelled = true;
                break 'providers;
            }
            throttle.wait().await;

            seen.insert(file.materialized_path());
            match check_one(state, user_id, project_id, provider, file).await {
                Ok(status) => stats.record(status),
                Err(e) => {
                    stats.errors += 1;
                    tracing::warn!(
                        project_id = %project_id,
                        provider = %provider,
                        path = %file.materialized_path(),
                        error = %e,
                        "file check failed"
                    );
                }
            }
        }

        for row in state
            .metadata
            .list_verifications(project_id, Some(provider.as_str()))
            .await?
        {
            if seen.contains(&row.path) || path::is_folder(&row.path) {
                continue;
            }
            stats.gone += reconcile::file_node_gone(state, project_id, provider, &row.path).await?;
        }
    }

    tracing::info!(
        project_id = %project_id,
        checked = stats.checked,
        errors = stats.errors,
        gone = stats.gone,
        disconnected = stats.disconnected,
        not_accessible = stats.not_accessible,
        cancelled = stats.cancelled,
        "verification sweep finished"
    );
    Ok(stats)
}

/// Every file under the provider root, walked with an explicit worklist.
/// Only a failure to list the root itself is an error.
async fn list_files(
    state: &AppState,
    user_id: &str,
    project_id: &str,
    provider: &Provider,
    stats: &mut SweepStats,
) -> WorkerResult<Vec<FileMetadata>> {
    let mut files = Vec::new();
    let mut pending = state
        .gateway
        .list_folder(user_id, project_id, provider, "/")
        .await?;

    while let Some(node) = pending.pop() {
        if !node.is_folder() {
            files.push(node);
            continue;
        }
        let folder = node.provider_path();
        match state
            .gateway
            .list_folder(user_id, project_id, provider, &folder)
            .await
        {
            Ok(children) => pending.extend(children),
            Err(e) => {
                stats.errors += 1;
                tracing::warn!(
                    project_id = %project_id,
                    provider = %provider,
                    folder = %node.materialized_path(),
                    error = %e,
                    "skipping folder that could not be listed"
                );
            }
        }
    }

    files.sort_by_key(|f| f.materialized_path());
    Ok(files)
}

async fn check_one(
    state: &AppState,
    user_id: &str,
    project_id: &str,
    provider: &Provider,
    file: &FileMetadata,
) -> WorkerResult<InspectionStatus> {
    let record = records::upsert_from_metadata(state, project_id, provider, file).await?;
    let outcome =
        timestamp::check_file_timestamp(state, user_id, &FileDescriptor::from_record(&record)).await?;
    Ok(outcome.status())
}

/// One unresolved ledger row.
#[derive(Clone, Debug, Serialize)]
pub struct ReportEntry {
    pub path: String,
    pub status: i64,
    pub status_title: String,
    pub verify_user: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub verify_date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub upload_file_created_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub upload_file_modified_at: Option<OffsetDateTime>,
    pub upload_file_size: Option<i64>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub verify_file_created_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub verify_file_modified_at: Option<OffsetDateTime>,
    pub verify_file_size: Option<i64>,
}

/// Unresolved rows of one provider, ordered by path.
#[derive(Clone, Debug, Serialize)]
pub struct ProviderReport {
    pub provider: String,
    pub entries: Vec<ReportEntry>,
}

/// Every ledger row of a project that is not a success, grouped by provider
/// then path.
pub async fn error_report(state: &AppState, project_id: &str) -> WorkerResult<Vec<ProviderReport>> {
    let mut grouped: BTreeMap<String, Vec<ReportEntry>> = BTreeMap::new();
    for row in state.metadata.list_verifications(project_id, None).await? {
        let status = row.status();
        if status == InspectionStatus::Success {
            continue;
        }
        grouped.entry(row.provider.clone()).or_default().push(ReportEntry {
            path: row.path,
            status: status.code(),
            status_title: status.title().to_string(),
            verify_user: row.verify_user,
            verify_date: row.verify_date,
            upload_file_created_at: row.upload_file_created_at,
            upload_file_modified_at: row.upload_file_modified_at,
            upload_file_size: row.upload_file_size,
            verify_file_created_at: row.verify_file_created_at,
            verify_file_modified_at: row.verify_file_modified_at,
            verify_file_size: row.verify_file_size,
        });
    }

    Ok(grouped
        .into_iter()
        .map(|(provider, mut entries)| {
            entries.sort_by(|a, b| a.path.cmp(&b.path));
            ProviderReport { provider, entries }
        })
        .collect())
}
