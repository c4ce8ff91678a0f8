//! Metadata store trait and SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{
    FileRecordRepo, KeyRepo, PollStateRepo, ProjectRepo, QuotaRepo, VerificationRepo,
};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore:
    FileRecordRepo + VerificationRepo + KeyRepo + QuotaRepo + PollStateRepo + ProjectRepo + Send + Sync
{
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if needed) a SQLite store and run migrations.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // A single connection keeps `:memory:` databases alive and avoids
            // "database is locked" failures between concurrent tasks.
            .max_connections(1)
            .min_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        tracing::debug!(
            path = %path.display(),
            query_timeout_secs = query_timeout_secs.unwrap_or(600),
            "opened sqlite metadata store"
        );

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// SQL condition matching `column` against a path pattern: a trailing `/`
/// matches the subtree, anything else matches exactly. Takes one bind.
fn path_condition(column: &str, pattern: &str) -> String {
    if notary_core::path::is_folder(pattern) {
        format!("instr({column}, ?) = 1")
    } else {
        format!("{column} = ?")
    }
}

/// `AND inspection_status NOT IN (?, ..)`, or nothing when `skip` is empty.
fn skip_condition(skip: &[i64]) -> String {
    if skip.is_empty() {
        return String::new();
    }
    let placeholders = vec!["?"; skip.len()].join(", ");
    format!(" AND inspection_status NOT IN ({placeholders})")
}

mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[async_trait]
    impl FileRecordRepo for SqliteStore {
        async fn upsert_file_record(&self, record: &FileRecordRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO file_nodes (
                    file_id, project_id, provider, kind, name, provider_path, materialized_path,
                    parent_id, size, version, file_created_at, file_modified_at, trashed_at,
                    created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(file_id) DO UPDATE SET
                    project_id = excluded.project_id,
                    provider = excluded.provider,
                    kind = excluded.kind,
                    name = excluded.name,
                    provider_path = excluded.provider_path,
                    materialized_path = excluded.materialized_path,
                    parent_id = excluded.parent_id,
                    size = excluded.size,
                    version = excluded.version,
                    file_created_at = excluded.file_created_at,
                    file_modified_at = excluded.file_modified_at,
                    trashed_at = excluded.trashed_at,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(record.file_id)
            .bind(&record.project_id)
            .bind(&record.provider)
            .bind(&record.kind)
            .bind(&record.name)
            .bind(&record.provider_path)
            .bind(&record.materialized_path)
            .bind(record.parent_id)
            .bind(record.size)
            .bind(&record.version)
            .bind(record.file_created_at)
            .bind(record.file_modified_at)
            .bind(record.trashed_at)
            .bind(record.created_at)
            .bind(record.updated_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn get_file_record(&self, file_id: Uuid) -> MetadataResult<Option<FileRecordRow>> {
            let row = sqlx::query_as::<_, FileRecordRow>("SELECT * FROM file_nodes WHERE file_id = ?")
                .bind(file_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn find_live_record(
            &self,
            project_id: &str,
            provider: &str,
            materialized_path: &str,
        ) -> MetadataResult<Option<FileRecordRow>> {
            let row = sqlx::query_as::<_, FileRecordRow>(
                r#"
                SELECT * FROM file_nodes
                WHERE project_id = ? AND provider = ? AND materialized_path = ? AND trashed_at IS NULL
                ORDER BY updated_at DESC
                LIMIT 1
                "#,
            )
            .bind(project_id)
            .bind(provider)
            .bind(materialized_path)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn list_live_records_under(
            &self,
            project_id: &str,
            provider: &str,
            pattern: &str,
        ) -> MetadataResult<Vec<FileRecordRow>> {
            let sql = format!(
                "SELECT * FROM file_nodes WHERE project_id = ? AND provider = ? AND trashed_at IS NULL AND {} ORDER BY materialized_path",
                path_condition("materialized_path", pattern)
            );
            let rows = sqlx::query_as::<_, FileRecordRow>(&sql)
                .bind(project_id)
                .bind(provider)
                .bind(pattern)
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }

        async fn list_children(&self, parent_id: Uuid) -> MetadataResult<Vec<FileRecordRow>> {
            let rows = sqlx::query_as::<_, FileRecordRow>(
                "SELECT * FROM file_nodes WHERE parent_id = ? ORDER BY materialized_path",
            )
            .bind(parent_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn trash_file_records(
            &self,
            file_ids: &[Uuid],
            at: OffsetDateTime,
        ) -> MetadataResult<u64> {
            let mut tx = self.pool.begin().await?;
            let mut affected = 0;
            for file_id in file_ids {
                let result = sqlx::query(
                    "UPDATE file_nodes SET trashed_at = ?, updated_at = ? WHERE file_id = ? AND trashed_at IS NULL",
                )
                .bind(at)
                .bind(at)
                .bind(file_id)
                .execute(&mut *tx)
                .await?;
                affected += result.rows_affected();
            }
            tx.commit().await?;
            Ok(affected)
        }

        async fn delete_file_record(&self, file_id: Uuid) -> MetadataResult<()> {
            sqlx::query("DELETE FROM file_nodes WHERE file_id = ?")
                .bind(file_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }
    }

    #[async_trait]
    impl VerificationRepo for SqliteStore {
        async fn get_verification(
            &self,
            file_id: Uuid,
        ) -> MetadataResult<Option<VerificationResultRow>> {
            let row = sqlx::query_as::<_, VerificationResultRow>(
                "SELECT * FROM verification_results WHERE file_id = ?",
            )
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn upsert_verification(&self, row: &VerificationResultRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO verification_results (
                    file_id, project_id, provider, path, key_file_name, inspection_status,
                    timestamp_token, verify_user, verify_date,
                    upload_file_created_at, upload_file_modified_at, upload_file_size,
                    verify_file_created_at, verify_file_modified_at, verify_file_size,
                    created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(file_id) DO UPDATE SET
                    project_id = excluded.project_id,
                    provider = excluded.provider,
                    path = excluded.path,
                    key_file_name = excluded.key_file_name,
                    inspection_status = excluded.inspection_status,
                    timestamp_token = excluded.timestamp_token,
                    verify_user = excluded.verify_user,
                    verify_date = excluded.verify_date,
                    upload_file_created_at = excluded.upload_file_created_at,
                    upload_file_modified_at = excluded.upload_file_modified_at,
                    upload_file_size = excluded.upload_file_size,
                    verify_file_created_at = excluded.verify_file_created_at,
                    verify_file_modified_at = excluded.verify_file_modified_at,
                    verify_file_size = excluded.verify_file_size,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(row.file_id)
            .bind(&row.project_id)
            .bind(&row.provider)
            .bind(&row.path)
            .bind(&row.key_file_name)
            .bind(row.inspection_status)
            .bind(&row.timestamp_token)
            .bind(&row.verify_user)
            .bind(row.verify_date)
            .bind(row.upload_file_created_at)
            .bind(row.upload_file_modified_at)
            .bind(row.upload_file_size)
            .bind(row.verify_file_created_at)
            .bind(row.verify_file_modified_at)
            .bind(row.verify_file_size)
            .bind(row.created_at)
            .bind(row.updated_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn list_verifications(
            &self,
            project_id: &str,
            provider: Option<&str>,
        ) -> MetadataResult<Vec<VerificationResultRow>> {
            let rows = match provider {
                Some(provider) => {
                    sqlx::query_as::<_, VerificationResultRow>(
                        "SELECT * FROM verification_results WHERE project_id = ? AND provider = ? ORDER BY provider, path",
                    )
                    .bind(project_id)
                    .bind(provider)
                    .fetch_all(&self.pool)
                    .await?
                }
                None => {
                    sqlx::query_as::<_, VerificationResultRow>(
                        "SELECT * FROM verification_results WHERE project_id = ? ORDER BY provider, path",
                    )
                    .bind(project_id)
                    .fetch_all(&self.pool)
                    .await?
                }
            };
            Ok(rows)
        }

        async fn list_verifications_under(
            &self,
            project_id: &str,
            provider: &str,
            pattern: &str,
        ) -> MetadataResult<Vec<VerificationResultRow>> {
            let sql = format!(
                "SELECT * FROM verification_results WHERE project_id = ? AND provider = ? AND {} ORDER BY path",
                path_condition("path", pattern)
            );
            let rows = sqlx::query_as::<_, VerificationResultRow>(&sql)
                .bind(project_id)
                .bind(provider)
                .bind(pattern)
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }

        async fn set_verification_status(
            &self,
            file_id: Uuid,
            status: i64,
            skip: &[i64],
        ) -> MetadataResult<bool> {
            let sql = format!(
                "UPDATE verification_results SET inspection_status = ?, updated_at = ? WHERE file_id = ?{}",
                skip_condition(skip)
            );
            let mut query = sqlx::query(&sql)
                .bind(status)
                .bind(OffsetDateTime::now_utc())
                .bind(file_id);
            for code in skip {
                query = query.bind(*code);
            }
            let result = query.execute(&self.pool).await?;
            Ok(result.rows_affected() > 0)
        }

        async fn update_status_under(
            &self,
            project_id: &str,
            provider: &str,
            pattern: &str,
            status: i64,
            skip: &[i64],
        ) -> MetadataResult<u64> {
            let sql = format!(
                "UPDATE verification_results SET inspection_status = ?, updated_at = ? WHERE project_id = ? AND provider = ? AND {}{}",
                path_condition("path", pattern),
                skip_condition(skip)
            );
            let mut query = sqlx::query(&sql)
                .bind(status)
                .bind(OffsetDateTime::now_utc())
                .bind(project_id)
                .bind(provider)
                .bind(pattern);
            for code in skip {
                query = query.bind(*code);
            }
            let result = query.execute(&self.pool).await?;
            Ok(result.rows_affected())
        }

        async fn rewrite_verification_paths(
            &self,
            project_id: &str,
            src_provider: &str,
            src_pattern: &str,
            dest_provider: &str,
            dest_pattern: &str,
        ) -> MetadataResult<u64> {
            let mut tx = self.pool.begin().await?;

            let sql = format!(
                "SELECT file_id, path FROM verification_results WHERE project_id = ? AND provider = ? AND {}",
                path_condition("path", src_pattern)
            );
            let rows: Vec<(Uuid, String)> = sqlx::query_as(&sql)
                .bind(project_id)
                .bind(src_provider)
                .bind(src_pattern)
                .fetch_all(&mut *tx)
                .await?;

            let now = OffsetDateTime::now_utc();
            let mut rewritten = 0;
            for (file_id, path) in rows {
                let Some(new_path) = notary_core::path::rebase(&path, src_pattern, dest_pattern)
                else {
                    continue;
                };
                sqlx::query(
                    "UPDATE verification_results SET provider = ?, path = ?, updated_at = ? WHERE file_id = ?",
                )
                .bind(dest_provider)
                .bind(&new_path)
                .bind(now)
                .bind(file_id)
                .execute(&mut *tx)
                .await?;
                rewritten += 1;
            }

            tx.commit().await?;
            Ok(rewritten)
        }

        async fn delete_verifications_under(
            &self,
            project_id: &str,
            provider: &str,
            pattern: &str,
        ) -> MetadataResult<Vec<Uuid>> {
            let mut tx = self.pool.begin().await?;
            let condition = path_condition("path", pattern);

            let select = format!(
                "SELECT file_id FROM verification_results WHERE project_id = ? AND provider = ? AND {condition}"
            );
            let ids: Vec<Uuid> = sqlx::query_scalar(&select)
                .bind(project_id)
                .bind(provider)
                .bind(pattern)
                .fetch_all(&mut *tx)
                .await?;

            let delete = format!(
                "DELETE FROM verification_results WHERE project_id = ? AND provider = ? AND {condition}"
            );
            sqlx::query(&delete)
                .bind(project_id)
                .bind(provider)
                .bind(pattern)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(ids)
        }

        async fn list_ledger_providers(&self, project_id: &str) -> MetadataResult<Vec<String>> {
            let providers = sqlx::query_scalar(
                "SELECT DISTINCT provider FROM verification_results WHERE project_id = ? ORDER BY provider",
            )
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(providers)
        }
    }

    #[async_trait]
    impl KeyRepo for SqliteStore {
        async fn get_user_keys(&self, user_id: &str) -> MetadataResult<Vec<UserKeyRow>> {
            let rows = sqlx::query_as::<_, UserKeyRow>(
                "SELECT * FROM user_keys WHERE user_id = ? ORDER BY key_kind",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn insert_user_keys(
            &self,
            private: &UserKeyRow,
            public: &UserKeyRow,
        ) -> MetadataResult<bool> {
            if private.user_id != public.user_id {
                return Err(MetadataError::Constraint(
                    "key pair rows must belong to one user".to_string(),
                ));
            }

            let mut tx = self.pool.begin().await?;
            let mut inserted = 0;
            for key in [private, public] {
                let result = sqlx::query(
                    "INSERT OR IGNORE INTO user_keys (key_id, user_id, key_kind, key_name, created_at) VALUES (?, ?, ?, ?, ?)",
                )
                .bind(key.key_id)
                .bind(&key.user_id)
                .bind(&key.key_kind)
                .bind(&key.key_name)
                .bind(key.created_at)
                .execute(&mut *tx)
                .await?;
                inserted += result.rows_affected();
            }

            if inserted < 2 {
                tx.rollback().await?;
                return Ok(false);
            }
            tx.commit().await?;
            Ok(true)
        }

        async fn delete_user_keys(&self, user_id: &str) -> MetadataResult<u64> {
            let result = sqlx::query("DELETE FROM user_keys WHERE user_id = ?")
                .bind(user_id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected())
        }
    }

    #[async_trait]
    impl QuotaRepo for SqliteStore {
        async fn get_quota(
            &self,
            user_id: &str,
            storage_type: i64,
        ) -> MetadataResult<Option<QuotaLedgerRow>> {
            let row = sqlx::query_as::<_, QuotaLedgerRow>(
                "SELECT * FROM quota_ledger WHERE user_id = ? AND storage_type = ?",
            )
            .bind(user_id)
            .bind(storage_type)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn list_quotas(&self, user_id: &str) -> MetadataResult<Vec<QuotaLedgerRow>> {
            let rows = sqlx::query_as::<_, QuotaLedgerRow>(
                "SELECT * FROM quota_ledger WHERE user_id = ? ORDER BY storage_type",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn apply_quota_delta(
            &self,
            user_id: &str,
            storage_type: i64,
            delta: i64,
            max_quota: i64,
        ) -> MetadataResult<QuotaLedgerRow> {
            let row = sqlx::query_as::<_, QuotaLedgerRow>(
                r#"
                INSERT INTO quota_ledger (user_id, storage_type, max_quota, used, updated_at)
                VALUES (?, ?, ?, MAX(0, ?), ?)
                ON CONFLICT(user_id, storage_type) DO UPDATE SET
                    used = MAX(0, quota_ledger.used + ?),
                    updated_at = excluded.updated_at
                RETURNING *
                "#,
            )
            .bind(user_id)
            .bind(storage_type)
            .bind(max_quota)
            .bind(delta)
            .bind(OffsetDateTime::now_utc())
            .bind(delta)
            .fetch_one(&self.pool)
            .await?;
            Ok(row)
        }

        async fn release_quota(
            &self,
            user_id: &str,
            storage_type: i64,
            amount: i64,
        ) -> MetadataResult<Option<QuotaLedgerRow>> {
            let row = sqlx::query_as::<_, QuotaLedgerRow>(
                r#"
                UPDATE quota_ledger SET used = MAX(0, used - ?), updated_at = ?
                WHERE user_id = ? AND storage_type = ?
                RETURNING *
                "#,
            )
            .bind(amount)
            .bind(OffsetDateTime::now_utc())
            .bind(user_id)
            .bind(storage_type)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn replace_quota_used(
            &self,
            user_id: &str,
            storage_type: i64,
            used: i64,
            max_quota: i64,
        ) -> MetadataResult<QuotaLedgerRow> {
            let row = sqlx::query_as::<_, QuotaLedgerRow>(
                r#"
                INSERT INTO quota_ledger (user_id, storage_type, max_quota, used, updated_at)
                VALUES (?, ?, ?, MAX(0, ?), ?)
                ON CONFLICT(user_id, storage_type) DO UPDATE SET
                    used = excluded.used,
                    updated_at = excluded.updated_at
                RETURNING *
                "#,
            )
            .bind(user_id)
            .bind(storage_type)
            .bind(max_quota)
            .bind(used)
            .bind(OffsetDateTime::now_utc())
            .fetch_one(&self.pool)
            .await?;
            Ok(row)
        }

        async fn get_file_usage(&self, file_id: Uuid) -> MetadataResult<Option<FileUsageRow>> {
            let row = sqlx::query_as::<_, FileUsageRow>("SELECT * FROM file_usage WHERE file_id = ?")
                .bind(file_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn upsert_file_usage(&self, file_id: Uuid, size: i64) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO file_usage (file_id, file_size, updated_at) VALUES (?, ?, ?)
                ON CONFLICT(file_id) DO UPDATE SET
                    file_size = excluded.file_size,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(file_id)
            .bind(size)
            .bind(OffsetDateTime::now_utc())
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn delete_file_usage(&self, file_id: Uuid) -> MetadataResult<()> {
            sqlx::query("DELETE FROM file_usage WHERE file_id = ?")
                .bind(file_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        async fn list_live_usage(&self, user_id: &str) -> MetadataResult<Vec<LiveUsageRow>> {
            let rows = sqlx::query_as::<_, LiveUsageRow>(
                r#"
                SELECT u.file_id AS file_id, f.provider AS provider,
                       p.storage_type AS project_storage_type, u.file_size AS file_size
                FROM file_usage u
                JOIN file_nodes f ON f.file_id = u.file_id
                JOIN projects p ON p.project_id = f.project_id
                WHERE p.creator_id = ? AND f.trashed_at IS NULL AND f.kind = 'file'
                "#,
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl PollStateRepo for SqliteStore {
        async fn get_poll_state(&self, account_id: &str) -> MetadataResult<Option<PollStateRow>> {
            let row =
                sqlx::query_as::<_, PollStateRow>("SELECT * FROM poll_state WHERE account_id = ?")
                    .bind(account_id)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }

        async fn put_poll_state(&self, state: &PollStateRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO poll_state (account_id, settings, updated_at) VALUES (?, ?, ?)
                ON CONFLICT(account_id) DO UPDATE SET
                    settings = excluded.settings,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&state.account_id)
            .bind(&state.settings)
            .bind(state.updated_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }
    }

    #[async_trait]
    impl ProjectRepo for SqliteStore {
        async fn upsert_project(&self, project: &ProjectRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO projects (project_id, title, creator_id, storage_type, created_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(project_id) DO UPDATE SET
                    title = excluded.title,
                    creator_id = excluded.creator_id,
                    storage_type = excluded.storage_type
                "#,
            )
            .bind(&project.project_id)
            .bind(&project.title)
            .bind(&project.creator_id)
            .bind(project.storage_type)
            .bind(project.created_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn get_project(&self, project_id: &str) -> MetadataResult<Option<ProjectRow>> {
            let row = sqlx::query_as::<_, ProjectRow>("SELECT * FROM projects WHERE project_id = ?")
                .bind(project_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn upsert_contributor(&self, contributor: &ContributorRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO project_contributors (project_id, user_id, position, is_admin, is_disabled, identity)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(project_id, user_id) DO UPDATE SET
                    position = excluded.position,
                    is_admin = excluded.is_admin,
                    is_disabled = excluded.is_disabled,
                    identity = excluded.identity
                "#,
            )
            .bind(&contributor.project_id)
            .bind(&contributor.user_id)
            .bind(contributor.position)
            .bind(contributor.is_admin)
            .bind(contributor.is_disabled)
            .bind(&contributor.identity)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn list_contributors(&self, project_id: &str) -> MetadataResult<Vec<ContributorRow>> {
            let rows = sqlx::query_as::<_, ContributorRow>(
                "SELECT * FROM project_contributors WHERE project_id = ? ORDER BY position, user_id",
            )
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn attach_storage(&self, storage: &ProjectStorageRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO project_storages (project_id, provider, account_id, root_folder)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(project_id, provider) DO UPDATE SET
                    account_id = excluded.account_id,
                    root_folder = excluded.root_folder
                "#,
            )
            .bind(&storage.project_id)
            .bind(&storage.provider)
            .bind(&storage.account_id)
            .bind(&storage.root_folder)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn detach_storage(&self, project_id: &str, provider: &str) -> MetadataResult<()> {
            sqlx::query("DELETE FROM project_storages WHERE project_id = ? AND provider = ?")
                .bind(project_id)
                .bind(provider)
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        async fn list_project_storages(
            &self,
            project_id: &str,
        ) -> MetadataResult<Vec<ProjectStorageRow>> {
            let rows = sqlx::query_as::<_, ProjectStorageRow>(
                "SELECT * FROM project_storages WHERE project_id = ? ORDER BY provider",
            )
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn list_storages_by_account(
            &self,
            provider: &str,
            account_id: &str,
        ) -> MetadataResult<Vec<ProjectStorageRow>> {
            let rows = sqlx::query_as::<_, ProjectStorageRow>(
                "SELECT * FROM project_storages WHERE provider = ? AND account_id = ? ORDER BY project_id",
            )
            .bind(provider)
            .bind(account_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn upsert_affiliation(&self, affiliation: &AffiliationRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO user_institutions (user_id, institution_id, position) VALUES (?, ?, ?)
                ON CONFLICT(user_id, institution_id) DO UPDATE SET position = excluded.position
                "#,
            )
            .bind(&affiliation.user_id)
            .bind(&affiliation.institution_id)
            .bind(affiliation.position)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn list_affiliations(&self, user_id: &str) -> MetadataResult<Vec<AffiliationRow>> {
            let rows = sqlx::query_as::<_, AffiliationRow>(
                "SELECT * FROM user_institutions WHERE user_id = ? ORDER BY position, institution_id",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn upsert_region(&self, region: &RegionRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO regions (region_id, name, institution_id, gateway_url) VALUES (?, ?, ?, ?)
                ON CONFLICT(region_id) DO UPDATE SET
                    name = excluded.name,
                    institution_id = excluded.institution_id,
                    gateway_url = excluded.gateway_url
                "#,
            )
            .bind(&region.region_id)
            .bind(&region.name)
            .bind(&region.institution_id)
            .bind(&region.gateway_url)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn get_region(&self, region_id: &str) -> MetadataResult<Option<RegionRow>> {
            let row = sqlx::query_as::<_, RegionRow>("SELECT * FROM regions WHERE region_id = ?")
                .bind(region_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_institution_region(
            &self,
            institution_id: &str,
        ) -> MetadataResult<Option<RegionRow>> {
            let row = sqlx::query_as::<_, RegionRow>(
                "SELECT * FROM regions WHERE institution_id = ? ORDER BY region_id LIMIT 1",
            )
            .bind(institution_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn set_user_region(&self, user_id: &str, region_id: &str) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO user_regions (user_id, region_id, updated_at) VALUES (?, ?, ?)
                ON CONFLICT(user_id) DO UPDATE SET
                    region_id = excluded.region_id,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(user_id)
            .bind(region_id)
            .bind(OffsetDateTime::now_utc())
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn get_user_region(&self, user_id: &str) -> MetadataResult<Option<UserRegionRow>> {
            let row = sqlx::query_as::<_, UserRegionRow>("SELECT * FROM user_regions WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }
    }
}

impl std::convert::From<std::io::Error> for crate::MetadataError {
    fn from(e: std::io::Error) -> Self {
        crate::MetadataError::Internal(format!("io error: {e}"))
    }
}

const SCHEMA_SQL: &str = r#"
-- Cached storage objects. parent_id is not a foreign key: clobbered records
-- are hard-deleted while their former children may still point at them.
CREATE TABLE IF NOT EXISTS file_nodes (
    file_id BLOB PRIMARY KEY,
    project_id TEXT NOT NULL,
    provider TEXT NOT NULL,
    kind TEXT NOT NULL CHECK (kind IN ('file', 'folder')),
    name TEXT NOT NULL,
    provider_path TEXT NOT NULL,
    materialized_path TEXT NOT NULL,
    parent_id BLOB,
    size INTEGER,
    version TEXT,
    file_created_at TEXT,
    file_modified_at TEXT,
    trashed_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_file_nodes_path ON file_nodes(project_id, provider, materialized_path);
CREATE INDEX IF NOT EXISTS idx_file_nodes_parent ON file_nodes(parent_id);

-- Verification ledger: one row per file.
CREATE TABLE IF NOT EXISTS verification_results (
    file_id BLOB PRIMARY KEY,
    project_id TEXT NOT NULL,
    provider TEXT NOT NULL,
    path TEXT NOT NULL,
    key_file_name TEXT,
    inspection_status INTEGER NOT NULL DEFAULT 0,
    timestamp_token BLOB,
    verify_user TEXT,
    verify_date TEXT,
    upload_file_created_at TEXT,
    upload_file_modified_at TEXT,
    upload_file_size INTEGER,
    verify_file_created_at TEXT,
    verify_file_modified_at TEXT,
    verify_file_size INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_verification_results_path ON verification_results(project_id, provider, path);

-- Per-user key files.
CREATE TABLE IF NOT EXISTS user_keys (
    key_id BLOB PRIMARY KEY,
    user_id TEXT NOT NULL,
    key_kind TEXT NOT NULL CHECK (key_kind IN ('private', 'public')),
    key_name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (user_id, key_kind)
);

-- Quota counters.
CREATE TABLE IF NOT EXISTS quota_ledger (
    user_id TEXT NOT NULL,
    storage_type INTEGER NOT NULL,
    max_quota INTEGER NOT NULL,
    used INTEGER NOT NULL DEFAULT 0 CHECK (used >= 0),
    updated_at TEXT NOT NULL,
    PRIMARY KEY (user_id, storage_type)
);

-- Last charged size per file.
CREATE TABLE IF NOT EXISTS file_usage (
    file_id BLOB PRIMARY KEY,
    file_size INTEGER NOT NULL CHECK (file_size >= 0),
    updated_at TEXT NOT NULL
);

-- Institutional poller settings.
CREATE TABLE IF NOT EXISTS poll_state (
    account_id TEXT PRIMARY KEY,
    settings TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Directory data mirrored from the host application.
CREATE TABLE IF NOT EXISTS projects (
    project_id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    creator_id TEXT NOT NULL,
    storage_type INTEGER,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_projects_creator ON projects(creator_id);

CREATE TABLE IF NOT EXISTS project_contributors (
    project_id TEXT NOT NULL REFERENCES projects(project_id) ON DELETE CASCADE,
    user_id TEXT NOT NULL,
    position INTEGER NOT NULL DEFAULT 0,
    is_admin INTEGER NOT NULL DEFAULT 0,
    is_disabled INTEGER NOT NULL DEFAULT 0,
    identity TEXT,
    PRIMARY KEY (project_id, user_id)
);

CREATE TABLE IF NOT EXISTS project_storages (
    project_id TEXT NOT NULL REFERENCES projects(project_id) ON DELETE CASCADE,
    provider TEXT NOT NULL,
    account_id TEXT,
    root_folder TEXT,
    PRIMARY KEY (project_id, provider)
);
CREATE INDEX IF NOT EXISTS idx_project_storages_account ON project_storages(provider, account_id);

CREATE TABLE IF NOT EXISTS user_institutions (
    user_id TEXT NOT NULL,
    institution_id TEXT NOT NULL,
    position INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (user_id, institution_id)
);

CREATE TABLE IF NOT EXISTS regions (
    region_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    institution_id TEXT,
    gateway_url TEXT
);

CREATE TABLE IF NOT EXISTS user_regions (
    user_id TEXT PRIMARY KEY,
    region_id TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;
