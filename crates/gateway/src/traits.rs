//! Gateway trait definitions.

use crate::error::GatewayResult;
use async_trait::async_trait;
use bytes::Bytes;
use notary_core::{FileKind, FileMetadata, Provider};
use std::path::Path;
use time::OffsetDateTime;

/// Remote file-storage proxy unifying every provider behind one API.
#[async_trait]
pub trait StorageGateway: Send + Sync + 'static {
    /// Metadata of one file or folder.
    async fn metadata(
        &self,
        user_id: &str,
        project_id: &str,
        provider: &Provider,
        path: &str,
    ) -> GatewayResult<FileMetadata>;

    /// Direct children of a folder.
    async fn list_folder(
        &self,
        user_id: &str,
        project_id: &str,
        provider: &Provider,
        folder: &str,
    ) -> GatewayResult<Vec<FileMetadata>>;

    /// Stream a file's content into `dest`. Returns the number of bytes written.
    async fn download(
        &self,
        user_id: &str,
        project_id: &str,
        provider: &Provider,
        path: &str,
        dest: &Path,
    ) -> GatewayResult<u64>;

    /// Upload `data` as `name` inside `folder`.
    async fn upload(
        &self,
        user_id: &str,
        project_id: &str,
        provider: &Provider,
        folder: &str,
        name: &str,
        data: Bytes,
    ) -> GatewayResult<FileMetadata>;

    /// Backend identifier for logging.
    fn backend_name(&self) -> &'static str;
}

/// Session cookie lookup for gateway calls made on behalf of a user.
pub trait SessionStore: Send + Sync {
    /// Cookie value for `user_id`, if one is known.
    fn cookie_for(&self, user_id: &str) -> Option<String>;
}

/// A file reported changed by an institutional storage account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangedFile {
    /// Path on the external account, starting with `/`.
    pub path: String,
    pub kind: FileKind,
    pub changed_at: OffsetDateTime,
}

/// Change listing of one institutional storage account.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Files changed at or after `since`, oldest first, one entry per path.
    async fn changed_since(&self, since: OffsetDateTime) -> GatewayResult<Vec<ChangedFile>>;
}
