//! Cached file records.
//!
//! Records carry a stable `file_id` across moves. The provider tag on a record
//! decides how its provider path is derived; [`path_for`] and [`reclassify`]
//! are the only places that know about it.

use crate::error::WorkerResult;
use crate::state::AppState;
use notary_core::{FileKind, FileMetadata, Provider, path};
use notary_metadata::models::FileRecordRow;
use std::collections::HashSet;
use time::OffsetDateTime;
use uuid::Uuid;

/// Provider path a record on `provider` should carry.
///
/// Providers addressed by materialized path ignore what the gateway reported;
/// providers with opaque ids use the reported id and fall back to the
/// materialized path until one is known.
pub fn path_for(provider: &Provider, materialized: &str, reported: Option<&str>) -> String {
    if !provider.has_opaque_paths() {
        return materialized.to_string();
    }
    match reported {
        Some(p) if !p.is_empty() && p != "/" => path::normalize(p),
        _ => materialized.to_string(),
    }
}

/// Re-tag a record for a new provider and materialized path.
pub fn reclassify(
    record: &mut FileRecordRow,
    provider: &Provider,
    materialized: &str,
    reported: Option<&str>,
) {
    record.provider = provider.to_string();
    record.materialized_path = materialized.to_string();
    record.name = path::file_name(materialized).to_string();
    record.provider_path = path_for(provider, materialized, reported);
    record.updated_at = OffsetDateTime::now_utc();
}

fn new_record(
    project_id: &str,
    provider: &Provider,
    kind: FileKind,
    materialized: &str,
    parent_id: Option<Uuid>,
) -> FileRecordRow {
    let now = OffsetDateTime::now_utc();
    FileRecordRow {
        file_id: Uuid::new_v4(),
        project_id: project_id.to_string(),
        provider: provider.to_string(),
        kind: kind.as_str().to_string(),
        name: path::file_name(materialized).to_string(),
        provider_path: path_for(provider, materialized, None),
        materialized_path: materialized.to_string(),
        parent_id,
        size: None,
        version: None,
        file_created_at: None,
        file_modified_at: None,
        trashed_at: None,
        created_at: now,
        updated_at: now,
    }
}

/// Make sure a live folder record exists for every ancestor of `materialized`.
/// Returns the id of the immediate parent, or `None` at the root.
pub async fn ensure_folder_chain(
    state: &AppState,
    project_id: &str,
    provider: &Provider,
    materialized: &str,
) -> WorkerResult<Option<Uuid>> {
    let mut parent_id = None;
    for folder in path::ancestors(materialized) {
        let existing = state
            .metadata
            .find_live_record(project_id, provider.as_str(), &folder)
            .await?;
        parent_id = Some(match existing {
            Some(record) => record.file_id,
            None => {
                let record = new_record(project_id, provider, FileKind::Folder, &folder, parent_id);
                state.metadata.upsert_file_record(&record).await?;
                tracing::debug!(
                    project_id = %project_id,
                    provider = %provider,
                    path = %folder,
                    "created folder record"
                );
                record.file_id
            }
        });
    }
    Ok(parent_id)
}

/// Insert or refresh the record for one gateway object, keeping its id when a
/// live record already sits at the same materialized path.
pub async fn upsert_from_metadata(
    state: &AppState,
    project_id: &str,
    provider: &Provider,
    metadata: &FileMetadata,
) -> WorkerResult<FileRecordRow> {
    let materialized = metadata.materialized_path();
    let parent_id = ensure_folder_chain(state, project_id, provider, &materialized).await?;

    let mut record = match state
        .metadata
        .find_live_record(project_id, provider.as_str(), &materialized)
        .await?
    {
        Some(existing) => existing,
        None => new_record(project_id, provider, metadata.kind, &materialized, parent_id),
    };

    let reported = metadata.provider_path();
    record.parent_id = parent_id;
    record.kind = metadata.kind.as_str().to_string();
    record.name = path::file_name(&materialized).to_string();
    record.provider_path = path_for(provider, &materialized, Some(&reported));
    record.size = metadata.size;
    record.version = metadata.extra.version.clone();
    record.file_created_at = metadata.created_at().or(record.file_created_at);
    record.file_modified_at = metadata.modified_at().or(record.file_modified_at);
    record.updated_at = OffsetDateTime::now_utc();

    state.metadata.upsert_file_record(&record).await?;
    Ok(record)
}

/// Upsert `metadata` and every node beneath it. Returns the file records
/// paired with the metadata they came from.
pub async fn upsert_tree<'a>(
    state: &AppState,
    project_id: &str,
    provider: &Provider,
    metadata: &'a FileMetadata,
) -> WorkerResult<Vec<(FileRecordRow, &'a FileMetadata)>> {
    let mut files = Vec::new();
    let mut stack = vec![metadata];
    while let Some(node) = stack.pop() {
        let record = upsert_from_metadata(state, project_id, provider, node).await?;
        if node.is_folder() {
            stack.extend(node.children.iter().rev());
        } else {
            files.push((record, node));
        }
    }
    Ok(files)
}

/// `root` and every record beneath it, trashed or not, via the parent links.
pub async fn subtree(state: &AppState, root: &FileRecordRow) -> WorkerResult<Vec<FileRecordRow>> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    let mut stack = vec![root.clone()];
    while let Some(node) = stack.pop() {
        if !seen.insert(node.file_id) {
            continue;
        }
        if node.is_folder() {
            stack.extend(state.metadata.list_children(node.file_id).await?);
        }
        out.push(node);
    }
    Ok(out)
}

/// Soft-delete the live records matched by `pattern`, plus anything linked
/// beneath them. Returns the trashed record at `pattern`, if it was known.
pub async fn trash_path(
    state: &AppState,
    project_id: &str,
    provider: &Provider,
    pattern: &str,
) -> WorkerResult<Option<FileRecordRow>> {
    let root = state
        .metadata
        .find_live_record(project_id, provider.as_str(), pattern)
        .await?;

    let mut ids: Vec<Uuid> = Vec::new();
    if let Some(root) = &root {
        ids.extend(
            subtree(state, root)
                .await?
                .into_iter()
                .filter(|r| !r.is_trashed())
                .map(|r| r.file_id),
        );
    }
    if path::is_folder(pattern) {
        // Records created without parent links still match by path.
        for record in state
            .metadata
            .list_live_records_under(project_id, provider.as_str(), pattern)
            .await?
        {
            if !ids.contains(&record.file_id) {
                ids.push(record.file_id);
            }
        }
    }
    if ids.is_empty() {
        return Ok(None);
    }

    let trashed = state
        .metadata
        .trash_file_records(&ids, OffsetDateTime::now_utc())
        .await?;
    tracing::debug!(
        project_id = %project_id,
        provider = %provider,
        path = %pattern,
        trashed,
        "trashed file records"
    );

    match root {
        Some(root) => Ok(state.metadata.get_file_record(root.file_id).await?),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_for_transparent_provider() {
        assert_eq!(
            path_for(&Provider::NextcloudInstitutions, "/a/b.txt", Some("/ignored")),
            "/a/b.txt"
        );
    }

    #[test]
    fn test_path_for_opaque_provider() {
        assert_eq!(path_for(&Provider::OsfStorage, "/a/b.txt", Some("5f1a")), "/5f1a");
        assert_eq!(path_for(&Provider::OsfStorage, "/a/b.txt", None), "/a/b.txt");
        assert_eq!(path_for(&Provider::OsfStorage, "/a/b.txt", Some("")), "/a/b.txt");
    }

    #[test]
    fn test_reclassify_moves_record_between_providers() {
        let mut record = new_record(
            "abc12",
            &Provider::NextcloudInstitutions,
            FileKind::File,
            "/a/b.txt",
            None,
        );
        let id = record.file_id;
        reclassify(&mut record, &Provider::OsfStorage, "/c/d.txt", Some("/5f1a"));
        assert_eq!(record.file_id, id);
        assert_eq!(record.provider, "osfstorage");
        assert_eq!(record.provider_path, "/5f1a");
        assert_eq!(record.materialized_path, "/c/d.txt");
        assert_eq!(record.name, "d.txt");
    }
}
