//! User key pair repository trait.

use crate::error::MetadataResult;
use crate::models::UserKeyRow;
use async_trait::async_trait;

/// Repository for per-user key file names.
#[async_trait]
pub trait KeyRepo: Send + Sync {
    /// Key rows of a user (zero or two).
    async fn get_user_keys(&self, user_id: &str) -> MetadataResult<Vec<UserKeyRow>>;

    /// Insert the private and public rows together.
    ///
    /// Returns `false` without changing anything when the user already has keys.
    async fn insert_user_keys(&self, private: &UserKeyRow, public: &UserKeyRow) -> MetadataResult<bool>;

    /// Delete a user's key rows (account purge).
    async fn delete_user_keys(&self, user_id: &str) -> MetadataResult<u64>;
}
