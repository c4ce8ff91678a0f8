//! Database models mapping to the metadata schema.

use notary_core::{FileKind, InspectionStatus, Provider, StorageType};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// File records
// =============================================================================

/// Cached view of a storage object, keyed by a stable id that survives moves.
#[derive(Debug, Clone, FromRow)]
pub struct FileRecordRow {
    pub file_id: Uuid,
    pub project_id: String,
    pub provider: String,
    pub kind: String,
    pub name: String,
    /// Provider's own path (opaque id on primary storage).
    pub provider_path: String,
    pub materialized_path: String,
    pub parent_id: Option<Uuid>,
    pub size: Option<i64>,
    pub version: Option<String>,
    pub file_created_at: Option<OffsetDateTime>,
    pub file_modified_at: Option<OffsetDateTime>,
    /// Set when the file is soft-deleted.
    pub trashed_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl FileRecordRow {
    pub fn provider(&self) -> Provider {
        Provider::from(self.provider.clone())
    }

    pub fn kind(&self) -> FileKind {
        FileKind::parse(&self.kind).unwrap_or_default()
    }

    pub fn is_folder(&self) -> bool {
        self.kind() == FileKind::Folder
    }

    pub fn is_trashed(&self) -> bool {
        self.trashed_at.is_some()
    }
}

// =============================================================================
// Verification ledger
// =============================================================================

/// Last known timestamp status of one file. At most one row per file_id.
#[derive(Debug, Clone, FromRow)]
pub struct VerificationResultRow {
    pub file_id: Uuid,
    pub project_id: String,
    pub provider: String,
    /// Materialized path.
    pub path: String,
    pub key_file_name: Option<String>,
    pub inspection_status: i64,
    pub timestamp_token: Option<Vec<u8>>,
    pub verify_user: Option<String>,
    pub verify_date: Option<OffsetDateTime>,
    pub upload_file_created_at: Option<OffsetDateTime>,
    pub upload_file_modified_at: Option<OffsetDateTime>,
    pub upload_file_size: Option<i64>,
    pub verify_file_created_at: Option<OffsetDateTime>,
    pub verify_file_modified_at: Option<OffsetDateTime>,
    pub verify_file_size: Option<i64>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl VerificationResultRow {
    /// A fresh row with no token and no snapshots.
    pub fn new(
        file_id: Uuid,
        project_id: &str,
        provider: &Provider,
        path: &str,
        status: InspectionStatus,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            file_id,
            project_id: project_id.to_string(),
            provider: provider.to_string(),
            path: path.to_string(),
            key_file_name: None,
            inspection_status: status.code(),
            timestamp_token: None,
            verify_user: None,
            verify_date: None,
            upload_file_created_at: None,
            upload_file_modified_at: None,
            upload_file_size: None,
            verify_file_created_at: None,
            verify_file_modified_at: None,
            verify_file_size: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Decoded status. Unknown codes read as unchecked.
    pub fn status(&self) -> InspectionStatus {
        InspectionStatus::from_code(self.inspection_status).unwrap_or(InspectionStatus::Unchecked)
    }

    pub fn set_status(&mut self, status: InspectionStatus) {
        self.inspection_status = status.code();
    }

    pub fn provider(&self) -> Provider {
        Provider::from(self.provider.clone())
    }
}

// =============================================================================
// Key store
// =============================================================================

/// Which half of a user's keypair a row names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyKind {
    Private,
    Public,
}

impl KeyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
        }
    }
}

/// One half of a user's keypair.
#[derive(Debug, Clone, FromRow)]
pub struct UserKeyRow {
    pub key_id: Uuid,
    pub user_id: String,
    pub key_kind: String,
    pub key_name: String,
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Quota
// =============================================================================

/// Running byte counter for one (user, storage class).
#[derive(Debug, Clone, FromRow)]
pub struct QuotaLedgerRow {
    pub user_id: String,
    pub storage_type: i64,
    pub max_quota: i64,
    pub used: i64,
    pub updated_at: OffsetDateTime,
}

impl QuotaLedgerRow {
    pub fn storage_type(&self) -> Option<StorageType> {
        StorageType::from_code(self.storage_type).ok()
    }
}

/// Last charged size of one file.
#[derive(Debug, Clone, FromRow)]
pub struct FileUsageRow {
    pub file_id: Uuid,
    pub file_size: i64,
    pub updated_at: OffsetDateTime,
}

/// A live file's charged size together with what decides its quota class.
#[derive(Debug, Clone, FromRow)]
pub struct LiveUsageRow {
    pub file_id: Uuid,
    pub provider: String,
    pub project_storage_type: Option<i64>,
    pub file_size: i64,
}

// =============================================================================
// Poller state
// =============================================================================

/// Extensible settings blob of one institutional account.
#[derive(Debug, Clone, FromRow)]
pub struct PollStateRow {
    pub account_id: String,
    /// JSON object.
    pub settings: String,
    pub updated_at: OffsetDateTime,
}

// =============================================================================
// Projects, contributors and institutions
// =============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct ProjectRow {
    pub project_id: String,
    pub title: String,
    pub creator_id: String,
    /// Quota class code; unset means the default class.
    pub storage_type: Option<i64>,
    pub created_at: OffsetDateTime,
}

impl ProjectRow {
    pub fn storage_type(&self) -> Option<StorageType> {
        self.storage_type.and_then(|c| StorageType::from_code(c).ok())
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ContributorRow {
    pub project_id: String,
    pub user_id: String,
    /// Ordering of contributors within the project.
    pub position: i64,
    pub is_admin: bool,
    pub is_disabled: bool,
    /// Recognized external identity (e.g. an institutional login), if any.
    pub identity: Option<String>,
}

/// A storage provider attached to a project.
#[derive(Debug, Clone, FromRow)]
pub struct ProjectStorageRow {
    pub project_id: String,
    pub provider: String,
    /// External account the storage belongs to (institutional providers).
    pub account_id: Option<String>,
    /// Folder on the external account that is the project's root.
    pub root_folder: Option<String>,
}

impl ProjectStorageRow {
    pub fn provider(&self) -> Provider {
        Provider::from(self.provider.clone())
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AffiliationRow {
    pub user_id: String,
    pub institution_id: String,
    pub position: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct RegionRow {
    pub region_id: String,
    pub name: String,
    /// Institution that owns this region, if not global.
    pub institution_id: Option<String>,
    pub gateway_url: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct UserRegionRow {
    pub user_id: String,
    pub region_id: String,
    pub updated_at: OffsetDateTime,
}
