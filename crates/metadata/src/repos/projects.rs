//! Project, contributor and institution repository trait.

use crate::error::MetadataResult;
use crate::models::{
    AffiliationRow, ContributorRow, ProjectRow, ProjectStorageRow, RegionRow, UserRegionRow,
};
use async_trait::async_trait;

/// Repository for the directory data the core reads from the host application.
#[async_trait]
pub trait ProjectRepo: Send + Sync {
    async fn upsert_project(&self, project: &ProjectRow) -> MetadataResult<()>;

    async fn get_project(&self, project_id: &str) -> MetadataResult<Option<ProjectRow>>;

    async fn upsert_contributor(&self, contributor: &ContributorRow) -> MetadataResult<()>;

    /// Contributors ordered by position.
    async fn list_contributors(&self, project_id: &str) -> MetadataResult<Vec<ContributorRow>>;

    async fn attach_storage(&self, storage: &ProjectStorageRow) -> MetadataResult<()>;

    async fn detach_storage(&self, project_id: &str, provider: &str) -> MetadataResult<()>;

    async fn list_project_storages(&self, project_id: &str) -> MetadataResult<Vec<ProjectStorageRow>>;

    /// Storages of every project configured on an external account.
    async fn list_storages_by_account(
        &self,
        provider: &str,
        account_id: &str,
    ) -> MetadataResult<Vec<ProjectStorageRow>>;

    async fn upsert_affiliation(&self, affiliation: &AffiliationRow) -> MetadataResult<()>;

    /// Affiliations ordered by position.
    async fn list_affiliations(&self, user_id: &str) -> MetadataResult<Vec<AffiliationRow>>;

    async fn upsert_region(&self, region: &RegionRow) -> MetadataResult<()>;

    async fn get_region(&self, region_id: &str) -> MetadataResult<Option<RegionRow>>;

    /// Region owned by an institution, if it has one.
    async fn get_institution_region(&self, institution_id: &str) -> MetadataResult<Option<RegionRow>>;

    async fn set_user_region(&self, user_id: &str, region_id: &str) -> MetadataResult<()>;

    async fn get_user_region(&self, user_id: &str) -> MetadataResult<Option<UserRegionRow>>;
}
