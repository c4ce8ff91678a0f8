//! Shared service state.

use crate::error::{WorkerError, WorkerResult};
use notary_core::config::AppConfig;
use notary_gateway::StorageGateway;
use notary_metadata::MetadataStore;
use notary_signer::TimestampBackend;
use std::sync::Arc;
use tempfile::TempDir;

/// Everything the services need, cheap to clone into tasks.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub metadata: Arc<dyn MetadataStore>,
    pub gateway: Arc<dyn StorageGateway>,
    pub timestamp: TimestampBackend,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        metadata: Arc<dyn MetadataStore>,
        gateway: Arc<dyn StorageGateway>,
        timestamp: TimestampBackend,
    ) -> Self {
        Self {
            config: Arc::new(config),
            metadata,
            gateway,
            timestamp,
        }
    }

    /// Build every backend from configuration.
    pub async fn from_config(config: AppConfig) -> WorkerResult<Self> {
        config.validate().map_err(WorkerError::Config)?;

        let metadata = notary_metadata::from_config(&config.metadata).await?;
        let gateway = notary_gateway::from_config(&config.gateway)?;
        let timestamp = notary_signer::from_config(&config.timestamp).await?;

        tokio::fs::create_dir_all(&config.timestamp.key_dir).await?;

        tracing::info!(
            gateway = gateway.backend_name(),
            authority = timestamp.authority.name(),
            verifier = timestamp.crypto.name(),
            "worker state initialized"
        );

        Ok(Self::new(config, metadata, gateway, timestamp))
    }

    /// Private working directory for one operation, removed on drop.
    pub fn scratch_dir(&self) -> WorkerResult<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("notary-");
        let dir = match &self.config.timestamp.scratch_dir {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        Ok(dir)
    }
}
