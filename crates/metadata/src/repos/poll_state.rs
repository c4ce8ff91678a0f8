//! Poller state repository trait.

use crate::error::MetadataResult;
use crate::models::PollStateRow;
use async_trait::async_trait;

/// Repository for per-account poller settings.
#[async_trait]
pub trait PollStateRepo: Send + Sync {
    async fn get_poll_state(&self, account_id: &str) -> MetadataResult<Option<PollStateRow>>;

    /// Insert or replace the settings blob.
    async fn put_poll_state(&self, state: &PollStateRow) -> MetadataResult<()>;
}
