//! Verification ledger repository trait.

use crate::error::MetadataResult;
use crate::models::VerificationResultRow;
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for the verification ledger.
///
/// Path arguments are patterns: a trailing `/` matches the whole subtree,
/// anything else matches exactly.
#[async_trait]
pub trait VerificationRepo: Send + Sync {
    /// Get the ledger row of a file.
    async fn get_verification(&self, file_id: Uuid) -> MetadataResult<Option<VerificationResultRow>>;

    /// Insert the row, or replace every column of the existing row for the file.
    async fn upsert_verification(&self, row: &VerificationResultRow) -> MetadataResult<()>;

    /// All rows of a project, optionally limited to one provider, ordered by provider and path.
    async fn list_verifications(
        &self,
        project_id: &str,
        provider: Option<&str>,
    ) -> MetadataResult<Vec<VerificationResultRow>>;

    /// Rows matched by a path pattern.
    async fn list_verifications_under(
        &self,
        project_id: &str,
        provider: &str,
        pattern: &str,
    ) -> MetadataResult<Vec<VerificationResultRow>>;

    /// Set the status of one row unless its current status is in `skip`.
    /// Returns whether the row was changed.
    async fn set_verification_status(
        &self,
        file_id: Uuid,
        status: i64,
        skip: &[i64],
    ) -> MetadataResult<bool>;

    /// Set the status of every matched row whose current status is not in `skip`.
    async fn update_status_under(
        &self,
        project_id: &str,
        provider: &str,
        pattern: &str,
        status: i64,
        skip: &[i64],
    ) -> MetadataResult<u64>;

    /// Rewrite matched rows to a new path prefix and provider in one transaction.
    async fn rewrite_verification_paths(
        &self,
        project_id: &str,
        src_provider: &str,
        src_pattern: &str,
        dest_provider: &str,
        dest_pattern: &str,
    ) -> MetadataResult<u64>;

    /// Delete matched rows, returning the file ids they belonged to.
    async fn delete_verifications_under(
        &self,
        project_id: &str,
        provider: &str,
        pattern: &str,
    ) -> MetadataResult<Vec<Uuid>>;

    /// Distinct providers with ledger rows in a project.
    async fn list_ledger_providers(&self, project_id: &str) -> MetadataResult<Vec<String>>;
}
