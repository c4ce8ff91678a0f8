//! Common test utilities and fixtures.

use notary_core::config::AppConfig;
use notary_core::{FileMetadata, Provider, StorageType};
use notary_gateway::{InMemoryGateway, StorageGateway};
use notary_metadata::models::{ContributorRow, ProjectRow, ProjectStorageRow};
use notary_metadata::{MetadataStore, SqliteStore};
use notary_worker::AppState;
use std::sync::Arc;
use tempfile::TempDir;
use time::OffsetDateTime;

#[allow(dead_code)]
pub const PROJECT: &str = "abc12";
#[allow(dead_code)]
pub const OWNER: &str = "owner1";
#[allow(dead_code)]
pub const ADMIN: &str = "admin1";

/// Worker state over in-memory SQLite, the in-memory gateway and the local
/// authority, with keys and scratch space in a temp directory.
#[allow(dead_code)]
pub struct TestEnv {
    pub state: AppState,
    pub gateway: Arc<InMemoryGateway>,
    pub metadata: Arc<dyn MetadataStore>,
    pub dir: TempDir,
}

#[allow(dead_code)]
impl TestEnv {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp directory");
        let mut config = AppConfig::for_testing();
        config.timestamp.key_dir = dir.path().join("keys");
        config.timestamp.scratch_dir = Some(dir.path().join("scratch"));
        config.poller.lock_dir = dir.path().join("locks");
        adjust(&mut config);

        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(":memory:", None)
                .await
                .expect("Failed to open metadata store"),
        );
        let gateway = Arc::new(InMemoryGateway::new());
        let timestamp = notary_signer::from_config(&config.timestamp)
            .await
            .expect("Failed to build timestamp backend");

        let state = AppState::new(
            config,
            metadata.clone(),
            gateway.clone() as Arc<dyn StorageGateway>,
            timestamp,
        );
        Self {
            state,
            gateway,
            metadata,
            dir,
        }
    }

    /// A project created by [`OWNER`] with [`ADMIN`] as its first eligible
    /// administrator and `providers` attached.
    pub async fn project(&self, project_id: &str, storage_type: Option<StorageType>, providers: &[Provider]) {
        self.metadata
            .upsert_project(&ProjectRow {
                project_id: project_id.to_string(),
                title: format!("Project {project_id}"),
                creator_id: OWNER.to_string(),
                storage_type: storage_type.map(StorageType::code),
                created_at: OffsetDateTime::now_utc(),
            })
            .await
            .unwrap();
        for (position, (user, admin)) in [(OWNER, true), (ADMIN, true)].into_iter().enumerate() {
            self.metadata
                .upsert_contributor(&ContributorRow {
                    project_id: project_id.to_string(),
                    user_id: user.to_string(),
                    position: position as i64,
                    is_admin: admin,
                    is_disabled: user == OWNER,
                    identity: Some(format!("{user}@idp.example.org")),
                })
                .await
                .unwrap();
        }
        for provider in providers {
            self.attach(project_id, provider, None, None).await;
        }
    }

    pub async fn attach(
        &self,
        project_id: &str,
        provider: &Provider,
        account_id: Option<&str>,
        root_folder: Option<&str>,
    ) {
        self.metadata
            .attach_storage(&ProjectStorageRow {
                project_id: project_id.to_string(),
                provider: provider.to_string(),
                account_id: account_id.map(str::to_string),
                root_folder: root_folder.map(str::to_string),
            })
            .await
            .unwrap();
    }

    /// Put a file on the gateway and return its metadata.
    pub fn put(&self, provider: &Provider, path: &str, content: &[u8]) -> FileMetadata {
        self.gateway.put_file(PROJECT, provider, path, content.to_vec())
    }
}

/// A create event payload for `metadata`.
#[allow(dead_code)]
pub fn event_json(action: &str, provider: &Provider, metadata: &FileMetadata) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "action": action,
        "provider": provider.as_str(),
        "metadata": metadata,
    }))
    .unwrap()
}

/// A move/copy payload.
#[allow(dead_code)]
pub fn move_json(
    action: &str,
    src_provider: &Provider,
    src: &FileMetadata,
    dest_provider: &Provider,
    dest: &FileMetadata,
) -> Vec<u8> {
    let mut source = serde_json::to_value(src).unwrap();
    source["provider"] = serde_json::json!(src_provider.as_str());
    let mut destination = serde_json::to_value(dest).unwrap();
    destination["provider"] = serde_json::json!(dest_provider.as_str());
    serde_json::to_vec(&serde_json::json!({
        "action": action,
        "source": source,
        "destination": destination,
    }))
    .unwrap()
}
