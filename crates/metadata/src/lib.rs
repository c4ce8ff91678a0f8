//! Metadata store abstraction and SQLite implementation for notary.
//!
//! This crate holds the durable state of the timestamp and quota core:
//! - Cached file records and their parent/child tree
//! - The verification ledger (one row per file)
//! - Per-user key file names
//! - Quota counters and per-file usage audit rows
//! - Institutional poller watermarks
//! - Project, contributor and institution directory data

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use store::{MetadataStore, SqliteStore};

use notary_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    let store = SqliteStore::new(&config.path, config.query_timeout_secs).await?;
    Ok(Arc::new(store) as Arc<dyn MetadataStore>)
}
