//! Storage gateway event dispatch.
//!
//! Each event updates the file records first, then the quota counters, the
//! ledger paths and finally the tokens.

use crate::error::{WorkerError, WorkerResult};
use crate::quota;
use crate::reconcile;
use crate::records;
use crate::state::AppState;
use crate::timestamp::{self, CheckOutcome, FileDescriptor};
use notary_core::{EventPayload, FileEvent, MoveEndpoint, Provider};
use serde::Serialize;

/// What handling one event did.
#[derive(Clone, Debug, Default, Serialize)]
pub struct EventSummary {
    pub action: &'static str,
    /// File records created, updated or moved.
    pub records: usize,
    /// Ledger rows touched by path reconciliation.
    pub ledger_rows: u64,
    /// Bytes released from quota.
    pub released: i64,
    pub outcomes: Vec<CheckOutcome>,
}

/// Parse and handle a raw webhook payload.
pub async fn handle_payload(
    state: &AppState,
    user_id: &str,
    project_id: &str,
    payload: &[u8],
) -> WorkerResult<EventSummary> {
    let event = EventPayload::from_json(payload)
        .and_then(EventPayload::into_event)
        .map_err(|e| {
            tracing::warn!(project_id = %project_id, error = %e, "ignoring malformed event");
            WorkerError::InvalidEvent(e.to_string())
        })?;
    handle_event(state, user_id, project_id, event).await
}

/// Handle a validated event for `project_id`. Move and copy endpoints may
/// name their own project.
pub async fn handle_event(
    state: &AppState,
    user_id: &str,
    project_id: &str,
    event: FileEvent,
) -> WorkerResult<EventSummary> {
    match event {
        FileEvent::Created { provider, metadata } => {
            let mut summary = EventSummary {
                action: "create",
                ..EventSummary::default()
            };
            for (record, file) in records::upsert_tree(state, project_id, &provider, &metadata).await? {
                quota::file_added(state, project_id, &provider, file, &record).await?;
                summary.records += 1;
                if let Some(outcome) =
                    timestamp::add_token(state, user_id, &FileDescriptor::from_record(&record)).await
                {
                    summary.outcomes.push(outcome);
                }
            }
            Ok(summary)
        }
        FileEvent::Updated { provider, metadata } => {
            let mut summary = EventSummary {
                action: "update",
                ..EventSummary::default()
            };
            for (record, file) in records::upsert_tree(state, project_id, &provider, &metadata).await? {
                quota::file_modified(state, project_id, &provider, file, &record).await?;
                summary.records += 1;
                if let Some(outcome) =
                    timestamp::add_token(state, user_id, &FileDescriptor::from_record(&record)).await
                {
                    summary.outcomes.push(outcome);
                }
            }
            Ok(summary)
        }
        FileEvent::Deleted { provider, metadata } => {
            let pattern = metadata.materialized_path();
            remove(state, project_id, &provider, &pattern).await
        }
        FileEvent::Moved {
            source,
            destination,
        } => {
            let (src_project, src_provider) = endpoint(&source, project_id)?;
            let (dest_project, dest_provider) = endpoint(&destination, project_id)?;
            if src_project != dest_project {
                tracing::debug!(
                    src_project = %src_project,
                    dest_project = %dest_project,
                    "cross-project move handled as delete plus copy"
                );
                let removed = remove(
                    state,
                    &src_project,
                    &src_provider,
                    &source.metadata.materialized_path(),
                )
                .await?;
                let mut summary =
                    copy(state, user_id, &dest_project, &dest_provider, &destination).await?;
                summary.action = "move";
                summary.released = removed.released;
                summary.ledger_rows += removed.ledger_rows;
                return Ok(summary);
            }

            let moved = reconcile::file_node_moved(
                state,
                user_id,
                &dest_project,
                &src_provider,
                &dest_provider,
                &source.metadata.materialized_path(),
                &destination.metadata.materialized_path(),
                &destination.metadata,
            )
            .await?;
            quota::file_moved(
                state,
                &src_project,
                &src_provider,
                &dest_project,
                &dest_provider,
                &moved.moved_files,
            )
            .await?;

            Ok(EventSummary {
                action: "move",
                records: moved.records,
                ledger_rows: moved.ledger_rows,
                released: 0,
                outcomes: moved.restamped,
            })
        }
        FileEvent::Copied {
            source: _,
            destination,
        } => {
            let (dest_project, dest_provider) = endpoint(&destination, project_id)?;
            copy(state, user_id, &dest_project, &dest_provider, &destination).await
        }
    }
}

fn endpoint(endpoint: &MoveEndpoint, default_project: &str) -> WorkerResult<(String, Provider)> {
    let project = endpoint
        .node
        .as_ref()
        .map(|n| n.id.clone())
        .unwrap_or_else(|| default_project.to_string());
    Ok((project, endpoint.provider()?))
}

/// Trash the records at `pattern`, release their quota and mark their
/// ledger rows deleted.
async fn remove(
    state: &AppState,
    project_id: &str,
    provider: &Provider,
    pattern: &str,
) -> WorkerResult<EventSummary> {
    let mut summary = EventSummary {
        action: "delete",
        ..EventSummary::default()
    };
    if let Some(root) = records::trash_path(state, project_id, provider, pattern).await? {
        summary.records = 1;
        summary.released = quota::node_removed(state, project_id, provider, &root).await?;
    }
    summary.ledger_rows = reconcile::file_node_deleted(state, project_id, provider, pattern).await?;
    Ok(summary)
}

/// Clear the destination, then treat every copied file as created.
async fn copy(
    state: &AppState,
    user_id: &str,
    project_id: &str,
    provider: &Provider,
    destination: &MoveEndpoint,
) -> WorkerResult<EventSummary> {
    let dest = destination.metadata.materialized_path();
    let overwritten = reconcile::file_node_overwritten(state, project_id, provider, &dest).await?;

    let mut summary = EventSummary {
        action: "copy",
        ledger_rows: overwritten as u64,
        ..EventSummary::default()
    };
    for (record, file) in
        records::upsert_tree(state, project_id, provider, &destination.metadata).await?
    {
        quota::file_added(state, project_id, provider, file, &record).await?;
        summary.records += 1;
        if let Some(outcome) =
            timestamp::add_token(state, user_id, &FileDescriptor::from_record(&record)).await
        {
            summary.outcomes.push(outcome);
        }
    }
    Ok(summary)
}
