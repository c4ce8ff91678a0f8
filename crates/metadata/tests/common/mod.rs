//! Common test utilities and fixtures.

use notary_metadata::models::*;
use notary_metadata::{MetadataResult, MetadataStore, SqliteStore};
use std::sync::Arc;
use tempfile::TempDir;
use time::OffsetDateTime;
use uuid::Uuid;

/// A test metadata store wrapper that cleans up on drop.
#[allow(dead_code)]
pub struct TestMetadata {
    pub store: Arc<dyn MetadataStore>,
    _temp_dir: Option<TempDir>,
}

#[allow(dead_code)]
impl TestMetadata {
    /// Create a store backed by a file in a temp directory.
    pub async fn on_disk() -> MetadataResult<Self> {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let store = SqliteStore::new(temp_dir.path().join("test.db"), None).await?;
        Ok(Self {
            store: Arc::new(store),
            _temp_dir: Some(temp_dir),
        })
    }

    /// Create a new in-memory SQLite store (faster for tests).
    pub async fn in_memory() -> MetadataResult<Self> {
        let store = SqliteStore::new(":memory:", None).await?;
        Ok(Self {
            store: Arc::new(store),
            _temp_dir: None,
        })
    }

    pub fn store(&self) -> Arc<dyn MetadataStore> {
        self.store.clone()
    }
}

#[allow(dead_code)]
pub fn file_record(project_id: &str, provider: &str, path: &str) -> FileRecordRow {
    let now = OffsetDateTime::now_utc();
    let kind = if path.ends_with('/') { "folder" } else { "file" };
    FileRecordRow {
        file_id: Uuid::new_v4(),
        project_id: project_id.to_string(),
        provider: provider.to_string(),
        kind: kind.to_string(),
        name: notary_core::path::file_name(path).to_string(),
        provider_path: path.to_string(),
        materialized_path: path.to_string(),
        parent_id: None,
        size: Some(10),
        version: None,
        file_created_at: Some(now),
        file_modified_at: Some(now),
        trashed_at: None,
        created_at: now,
        updated_at: now,
    }
}

#[allow(dead_code)]
pub fn project(project_id: &str, creator_id: &str, storage_type: Option<i64>) -> ProjectRow {
    ProjectRow {
        project_id: project_id.to_string(),
        title: format!("Project {project_id}"),
        creator_id: creator_id.to_string(),
        storage_type,
        created_at: OffsetDateTime::now_utc(),
    }
}
