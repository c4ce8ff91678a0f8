//! Path reconciliation.
//!
//! Keeps ledger paths and file records in step with moves, renames, copies
//! and deletions without rebuilding anything from scratch. A path ending in
//! `/` addresses a whole subtree; any other path addresses one file.

use crate::error::WorkerResult;
use crate::quota;
use crate::records;
use crate::state::AppState;
use crate::timestamp::{self, CheckOutcome, FileDescriptor};
use notary_core::{FileMetadata, InspectionStatus, Provider, path};
use serde::Serialize;
use std::collections::HashMap;

/// What a move changed.
#[derive(Clone, Debug, Default, Serialize)]
pub struct MoveSummary {
    /// Ledger rows deleted because the destination was overwritten.
    pub overwritten: usize,
    /// Ledger rows rewritten to the destination.
    pub ledger_rows: u64,
    /// File records moved (folders included).
    pub records: usize,
    /// Ids of the moved file (not folder) records.
    #[serde(skip)]
    pub moved_files: Vec<uuid::Uuid>,
    /// Results of re-stamping files that landed on primary storage.
    pub restamped: Vec<CheckOutcome>,
}

/// Normalize a move endpoint; folders always end in `/`.
fn endpoint_path(raw: &str, is_folder: bool) -> String {
    let mut p = path::normalize(raw);
    if is_folder && !path::is_folder(&p) {
        p.push('/');
    }
    p
}

/// Reported provider paths of every node in a destination tree, by
/// materialized path.
fn reported_paths(metadata: &FileMetadata) -> HashMap<String, String> {
    let mut out = HashMap::new();
    let mut stack = vec![metadata];
    while let Some(node) = stack.pop() {
        out.insert(node.materialized_path(), node.provider_path());
        stack.extend(node.children.iter());
    }
    out
}

/// Move the ledger rows and records under `src_path` to `dest_path`.
///
/// Anything already at the destination is clobbered first. Files that land on
/// primary storage get a fresh token; files moved anywhere else keep theirs.
#[allow(clippy::too_many_arguments)]
pub async fn file_node_moved(
    state: &AppState,
    user_id: &str,
    project_id: &str,
    src_provider: &Provider,
    dest_provider: &Provider,
    src_path: &str,
    dest_path: &str,
    metadata: &FileMetadata,
) -> WorkerResult<MoveSummary> {
    let folder = metadata.is_folder() || path::is_folder(src_path) || path::is_folder(dest_path);
    let src = endpoint_path(src_path, folder);
    let dest = endpoint_path(dest_path, folder);

    let mut summary = MoveSummary::default();
    if src_provider == dest_provider && src == dest {
        return Ok(summary);
    }

    summary.overwritten = file_node_overwritten(state, project_id, dest_provider, &dest).await?;

    summary.ledger_rows = state
        .metadata
        .rewrite_verification_paths(
            project_id,
            src_provider.as_str(),
            &src,
            dest_provider.as_str(),
            &dest,
        )
        .await?;

    let reported = reported_paths(metadata);
    let moved = state
        .metadata
        .list_live_records_under(project_id, src_provider.as_str(), &src)
        .await?;
    let dest_parent = records::ensure_folder_chain(state, project_id, dest_provider, &dest).await?;

    for mut record in moved {
        let Some(new_path) = path::rebase(&record.materialized_path, &src, &dest) else {
            continue;
        };
        let reported_path = reported.get(&new_path).map(String::as_str);
        records::reclassify(&mut record, dest_provider, &new_path, reported_path);
        if new_path == dest {
            record.parent_id = dest_parent;
        }
        state.metadata.upsert_file_record(&record).await?;
        summary.records += 1;
        if !record.is_folder() {
            summary.moved_files.push(record.file_id);
        }
    }

    // Objects never seen before the move are recorded at the destination.
    if summary.records == 0 {
        for (record, _) in records::upsert_tree(state, project_id, dest_provider, metadata).await? {
            summary.moved_files.push(record.file_id);
        }
    }

    tracing::info!(
        project_id = %project_id,
        src_provider = %src_provider,
        dest_provider = %dest_provider,
        src = %src,
        dest = %dest,
        ledger_rows = summary.ledger_rows,
        records = summary.records,
        "reconciled move"
    );

    if dest_provider.is_primary() {
        for file_id in &summary.moved_files {
            let Some(record) = state.metadata.get_file_record(*file_id).await? else {
                continue;
            };
            if let Some(outcome) =
                timestamp::add_token(state, user_id, &FileDescriptor::from_record(&record)).await
            {
                summary.restamped.push(outcome);
            }
        }
    }

    Ok(summary)
}

/// Clear the destination of a move or copy: its ledger rows are deleted, the
/// quota of the clobbered files is released, and the records they belonged
/// to, plus any live records at the path, are hard-deleted. Returns how many
/// ledger rows went away.
pub async fn file_node_overwritten(
    state: &AppState,
    project_id: &str,
    provider: &Provider,
    dest: &str,
) -> WorkerResult<usize> {
    let mut clobbered = state
        .metadata
        .delete_verifications_under(project_id, provider.as_str(), dest)
        .await?;
    let rows = clobbered.len();

    for record in state
        .metadata
        .list_live_records_under(project_id, provider.as_str(), dest)
        .await?
    {
        if !clobbered.contains(&record.file_id) {
            clobbered.push(record.file_id);
        }
    }
    quota::node_overwritten(state, project_id, provider, &clobbered).await?;
    for file_id in &clobbered {
        state.metadata.delete_file_record(*file_id).await?;
    }

    if !clobbered.is_empty() {
        tracing::debug!(
            project_id = %project_id,
            provider = %provider,
            path = %dest,
            rows,
            records = clobbered.len(),
            "cleared overwritten destination"
        );
    }
    Ok(rows)
}

/// The object at `pattern` was deleted on purpose. Rows already marked as
/// never existing stay as they are.
pub async fn file_node_deleted(
    state: &AppState,
    project_id: &str,
    provider: &Provider,
    pattern: &str,
) -> WorkerResult<u64> {
    let changed = state
        .metadata
        .update_status_under(
            project_id,
            provider.as_str(),
            pattern,
            InspectionStatus::FileNotExists.code(),
            &[InspectionStatus::FileNotExists.code()],
        )
        .await?;
    tracing::debug!(
        project_id = %project_id,
        provider = %provider,
        path = %pattern,
        changed,
        "marked deleted files"
    );
    Ok(changed)
}

/// The object at `pattern` could not be found. Rows carrying an intentional
/// absence marker, or already marked lost, are left alone.
pub async fn file_node_gone(
    state: &AppState,
    project_id: &str,
    provider: &Provider,
    pattern: &str,
) -> WorkerResult<u64> {
    let [not_exists, disconnected] = InspectionStatus::intentional_codes();
    let skip = [not_exists, disconnected, InspectionStatus::FileNotFound.code()];
    let changed = state
        .metadata
        .update_status_under(
            project_id,
            provider.as_str(),
            pattern,
            InspectionStatus::FileNotFound.code(),
            &skip,
        )
        .await?;
    tracing::debug!(
        project_id = %project_id,
        provider = %provider,
        path = %pattern,
        changed,
        "marked lost files"
    );
    Ok(changed)
}
