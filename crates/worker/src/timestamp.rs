//! Timestamp token service.
//!
//! Obtains tokens for file content and re-verifies them later. Every
//! operation downloads into its own scratch directory, which is removed when
//! the operation returns, on success or failure.

use crate::error::{WorkerError, WorkerResult};
use crate::keys;
use crate::ledger::{LocalCheck, classify_local};
use crate::records;
use crate::state::AppState;
use notary_core::{FileMetadata, InspectionStatus, Provider};
use notary_metadata::models::{FileRecordRow, VerificationResultRow};
use notary_signer::Verification;
use serde::Serialize;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use uuid::Uuid;

/// The file a timestamp operation works on.
#[derive(Clone, Debug)]
pub struct FileDescriptor {
    pub file_id: Uuid,
    pub project_id: String,
    pub provider: Provider,
    pub materialized_path: String,
    /// Path to ask the gateway for.
    pub provider_path: String,
    pub size: Option<i64>,
    pub created_at: Option<OffsetDateTime>,
    pub modified_at: Option<OffsetDateTime>,
}

impl FileDescriptor {
    pub fn from_record(record: &FileRecordRow) -> Self {
        Self {
            file_id: record.file_id,
            project_id: record.project_id.clone(),
            provider: record.provider(),
            materialized_path: record.materialized_path.clone(),
            provider_path: record.provider_path.clone(),
            size: record.size,
            created_at: record.file_created_at,
            modified_at: record.file_modified_at,
        }
    }
}

/// Result of one check, as shown to users.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    pub verify_result: i64,
    pub verify_result_title: String,
    pub filepath: String,
}

impl CheckOutcome {
    fn new(status: InspectionStatus, descriptor: &FileDescriptor) -> Self {
        Self {
            verify_result: status.code(),
            verify_result_title: status.title().to_string(),
            filepath: format!(
                "/{}{}",
                descriptor.provider, descriptor.materialized_path
            ),
        }
    }

    pub fn status(&self) -> InspectionStatus {
        InspectionStatus::from_code(self.verify_result).unwrap_or(InspectionStatus::Unchecked)
    }
}

/// Obtain a fresh token for a file and check it immediately.
///
/// Never fails: on any error the ledger row is left without a token in the
/// no-data state, the error is logged and `None` is returned.
pub async fn add_token(
    state: &AppState,
    user_id: &str,
    descriptor: &FileDescriptor,
) -> Option<CheckOutcome> {
    match try_add_token(state, user_id, descriptor).await {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            tracing::warn!(
                user_id = %user_id,
                project_id = %descriptor.project_id,
                provider = %descriptor.provider,
                path = %descriptor.materialized_path,
                code = e.code(),
                error = %e,
                "failed to obtain timestamp token"
            );
            if let Err(e) = mark_no_data(state, descriptor).await {
                tracing::error!(
                    file_id = %descriptor.file_id,
                    error = %e,
                    "failed to reset ledger row after token failure"
                );
            }
            None
        }
    }
}

async fn try_add_token(
    state: &AppState,
    user_id: &str,
    descriptor: &FileDescriptor,
) -> WorkerResult<CheckOutcome> {
    let key_file_name = keys::ensure_keypair(state, user_id).await?;

    let scratch = state.scratch_dir()?;
    let local = download(state, user_id, descriptor, scratch.path()).await?;
    let local_size = tokio::fs::metadata(&local).await?.len();

    let backend = &state.timestamp;
    let request = backend.crypto.build_request(&local, scratch.path()).await?;
    let token = backend
        .authority
        .stamp(&request, &local, scratch.path())
        .await?;

    let mut row = current_row(state, descriptor).await?;
    row.key_file_name = Some(key_file_name);
    row.timestamp_token = Some(token);
    row.set_status(InspectionStatus::Unchecked);
    row.upload_file_created_at = descriptor.created_at;
    row.upload_file_modified_at = descriptor.modified_at;
    row.upload_file_size = i64::try_from(local_size).ok();
    row.updated_at = OffsetDateTime::now_utc();
    state.metadata.upsert_verification(&row).await?;

    tracing::info!(
        project_id = %descriptor.project_id,
        provider = %descriptor.provider,
        path = %descriptor.materialized_path,
        authority = backend.authority.name(),
        "stored timestamp token"
    );

    timestamp_check(state, user_id, descriptor, &local).await
}

/// The existing ledger row of the file, repointed at its current location,
/// or a fresh one.
async fn current_row(
    state: &AppState,
    descriptor: &FileDescriptor,
) -> WorkerResult<VerificationResultRow> {
    Ok(match state.metadata.get_verification(descriptor.file_id).await? {
        Some(mut row) => {
            row.project_id = descriptor.project_id.clone();
            row.provider = descriptor.provider.to_string();
            row.path = descriptor.materialized_path.clone();
            row
        }
        None => VerificationResultRow::new(
            descriptor.file_id,
            &descriptor.project_id,
            &descriptor.provider,
            &descriptor.materialized_path,
            InspectionStatus::Unchecked,
        ),
    })
}

async fn mark_no_data(state: &AppState, descriptor: &FileDescriptor) -> WorkerResult<()> {
    let mut row = current_row(state, descriptor).await?;
    row.timestamp_token = None;
    row.set_status(InspectionStatus::NoData);
    row.updated_at = OffsetDateTime::now_utc();
    state.metadata.upsert_verification(&row).await?;
    Ok(())
}

async fn download(
    state: &AppState,
    user_id: &str,
    descriptor: &FileDescriptor,
    scratch: &Path,
) -> WorkerResult<PathBuf> {
    let local = scratch.join("content");
    let bytes = state
        .gateway
        .download(
            user_id,
            &descriptor.project_id,
            &descriptor.provider,
            &descriptor.provider_path,
            &local,
        )
        .await?;
    tracing::debug!(
        project_id = %descriptor.project_id,
        path = %descriptor.materialized_path,
        bytes,
        "downloaded file for timestamping"
    );
    Ok(local)
}

/// Check a file whose content is already at `local_path`.
///
/// The local ledger checks run first; the token is only verified when they
/// are inconclusive. A verifier that cannot run yields the verification
/// error status rather than an `Err`.
pub async fn timestamp_check(
    state: &AppState,
    user_id: &str,
    descriptor: &FileDescriptor,
    local_path: &Path,
) -> WorkerResult<CheckOutcome> {
    let record = state.metadata.get_file_record(descriptor.file_id).await?;
    let existing = state.metadata.get_verification(descriptor.file_id).await?;

    let (mut row, token) = match classify_local(record.as_ref(), existing.as_ref(), &descriptor.provider) {
        LocalCheck::Conclusive(status) => {
            // An intentional marker already on the row outranks the local result.
            let reported = match &existing {
                Some(row) if row.status() != status => {
                    let changed = state
                        .metadata
                        .set_verification_status(
                            descriptor.file_id,
                            status.code(),
                            &InspectionStatus::intentional_codes(),
                        )
                        .await?;
                    if changed { status } else { row.status() }
                }
                _ => status,
            };
            return Ok(CheckOutcome::new(reported, descriptor));
        }
        LocalCheck::NeedsVerification => match existing {
            Some(row) => {
                let token = row.timestamp_token.clone().unwrap_or_default();
                (row, token)
            }
            None => return Err(WorkerError::NotFound(format!("ledger row {}", descriptor.file_id))),
        },
    };

    let scratch = state.scratch_dir()?;
    let status = match state
        .timestamp
        .crypto
        .verify(local_path, &token, scratch.path())
        .await
    {
        Ok(Verification::Valid) => InspectionStatus::Success,
        Ok(Verification::Invalid(reason)) => {
            tracing::info!(
                project_id = %descriptor.project_id,
                provider = %descriptor.provider,
                path = %descriptor.materialized_path,
                reason = %reason,
                "timestamp token does not match content"
            );
            InspectionStatus::Ng
        }
        Err(e) => {
            tracing::warn!(
                project_id = %descriptor.project_id,
                path = %descriptor.materialized_path,
                error = %e,
                "timestamp verification could not run"
            );
            InspectionStatus::VerificationError
        }
    };

    let now = OffsetDateTime::now_utc();
    let local_size = tokio::fs::metadata(local_path).await?.len();
    row.set_status(status);
    row.verify_user = Some(user_id.to_string());
    row.verify_date = Some(now);
    row.verify_file_created_at = descriptor.created_at;
    row.verify_file_modified_at = descriptor.modified_at;
    row.verify_file_size = i64::try_from(local_size).ok();
    row.updated_at = now;
    state.metadata.upsert_verification(&row).await?;

    Ok(CheckOutcome::new(status, descriptor))
}

/// Download a file and check its token.
///
/// A file the gateway cannot deliver is recorded as not found, unless its
/// row already carries an intentional absence marker.
pub async fn check_file_timestamp(
    state: &AppState,
    user_id: &str,
    descriptor: &FileDescriptor,
) -> WorkerResult<CheckOutcome> {
    let scratch = state.scratch_dir()?;
    let local = match download(state, user_id, descriptor, scratch.path()).await {
        Ok(local) => local,
        Err(WorkerError::Gateway(e)) => {
            tracing::warn!(
                project_id = %descriptor.project_id,
                provider = %descriptor.provider,
                path = %descriptor.materialized_path,
                error = %e,
                "file could not be downloaded for checking"
            );
            state
                .metadata
                .set_verification_status(
                    descriptor.file_id,
                    InspectionStatus::FileNotFound.code(),
                    &InspectionStatus::intentional_codes(),
                )
                .await?;
            let status = state
                .metadata
                .get_verification(descriptor.file_id)
                .await?
                .map(|row| row.status())
                .unwrap_or(InspectionStatus::FileNotFound);
            return Ok(CheckOutcome::new(status, descriptor));
        }
        Err(e) => return Err(e),
    };

    timestamp_check(state, user_id, descriptor, &local).await
}

/// Record a created or updated object and stamp every file in it.
pub async fn file_created_or_updated(
    state: &AppState,
    user_id: &str,
    project_id: &str,
    provider: &Provider,
    metadata: &FileMetadata,
) -> WorkerResult<Vec<(FileRecordRow, Option<CheckOutcome>)>> {
    let files = records::upsert_tree(state, project_id, provider, metadata).await?;
    let mut out = Vec::with_capacity(files.len());
    for (record, _) in files {
        let outcome = add_token(state, user_id, &FileDescriptor::from_record(&record)).await;
        out.push((record, outcome));
    }
    Ok(out)
}
