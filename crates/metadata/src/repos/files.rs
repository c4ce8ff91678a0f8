//! File record repository trait.

use crate::error::MetadataResult;
use crate::models::FileRecordRow;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for cached file records.
#[async_trait]
pub trait FileRecordRepo: Send + Sync {
    /// Insert or replace a file record.
    async fn upsert_file_record(&self, record: &FileRecordRow) -> MetadataResult<()>;

    /// Get a file record by id.
    async fn get_file_record(&self, file_id: Uuid) -> MetadataResult<Option<FileRecordRow>>;

    /// Find the live (non-trashed) record at a materialized path.
    async fn find_live_record(
        &self,
        project_id: &str,
        provider: &str,
        materialized_path: &str,
    ) -> MetadataResult<Option<FileRecordRow>>;

    /// Live records matched by a path pattern (trailing `/` = subtree).
    async fn list_live_records_under(
        &self,
        project_id: &str,
        provider: &str,
        pattern: &str,
    ) -> MetadataResult<Vec<FileRecordRow>>;

    /// Direct children of a folder record, trashed or not.
    async fn list_children(&self, parent_id: Uuid) -> MetadataResult<Vec<FileRecordRow>>;

    /// Soft-delete records.
    async fn trash_file_records(&self, file_ids: &[Uuid], at: OffsetDateTime) -> MetadataResult<u64>;

    /// Hard-delete a record.
    async fn delete_file_record(&self, file_id: Uuid) -> MetadataResult<()>;
}
