//! Quota ledger repository trait.

use crate::error::MetadataResult;
use crate::models::{FileUsageRow, LiveUsageRow, QuotaLedgerRow};
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for quota counters and per-file usage audit rows.
#[async_trait]
pub trait QuotaRepo: Send + Sync {
    /// Get a ledger entry.
    async fn get_quota(&self, user_id: &str, storage_type: i64) -> MetadataResult<Option<QuotaLedgerRow>>;

    /// All ledger entries of a user.
    async fn list_quotas(&self, user_id: &str) -> MetadataResult<Vec<QuotaLedgerRow>>;

    /// Add `delta` to `used` of an existing entry, clamped at zero, in one
    /// statement. Creates the entry with `max_quota` when it is missing.
    async fn apply_quota_delta(
        &self,
        user_id: &str,
        storage_type: i64,
        delta: i64,
        max_quota: i64,
    ) -> MetadataResult<QuotaLedgerRow>;

    /// Subtract from an existing entry, clamped at zero. Returns `None` when
    /// the entry does not exist.
    async fn release_quota(
        &self,
        user_id: &str,
        storage_type: i64,
        amount: i64,
    ) -> MetadataResult<Option<QuotaLedgerRow>>;

    /// Overwrite `used` (full recount), creating the entry if needed.
    async fn replace_quota_used(
        &self,
        user_id: &str,
        storage_type: i64,
        used: i64,
        max_quota: i64,
    ) -> MetadataResult<QuotaLedgerRow>;

    /// Get the audit row of a file.
    async fn get_file_usage(&self, file_id: Uuid) -> MetadataResult<Option<FileUsageRow>>;

    /// Insert or update the audit row of a file.
    async fn upsert_file_usage(&self, file_id: Uuid, size: i64) -> MetadataResult<()>;

    /// Drop the audit row of a file.
    async fn delete_file_usage(&self, file_id: Uuid) -> MetadataResult<()>;

    /// Charged sizes of every live file in projects created by `user_id`.
    async fn list_live_usage(&self, user_id: &str) -> MetadataResult<Vec<LiveUsageRow>>;
}
