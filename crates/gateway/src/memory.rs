//! In-memory gateway and change feed.
//!
//! Used by tests and by `notaryd` when no gateway is configured. Files are
//! kept per (project, provider); folders exist implicitly when any file lives
//! under them.

use crate::error::{GatewayError, GatewayResult};
use crate::traits::{ChangeFeed, ChangedFile, StorageGateway};
use async_trait::async_trait;
use bytes::Bytes;
use notary_core::{FileKind, FileMetadata, Provider, path};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::RwLock;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

type StorageKey = (String, Provider);

#[derive(Clone)]
struct StoredFile {
    metadata: FileMetadata,
    content: Bytes,
}

#[derive(Default)]
struct State {
    /// Materialized path -> file, per project storage.
    storages: HashMap<StorageKey, BTreeMap<String, StoredFile>>,
    unreachable: HashSet<StorageKey>,
    next_id: u64,
}

impl State {
    fn lookup(&self, key: &StorageKey, wanted: &str) -> Option<&StoredFile> {
        let files = self.storages.get(key)?;
        files
            .get(wanted)
            .or_else(|| files.values().find(|f| f.metadata.path == wanted))
    }

    /// Materialized form of `wanted`, which may be a provider path.
    fn resolve(&self, key: &StorageKey, wanted: &str) -> String {
        self.lookup(key, wanted)
            .map(|f| f.metadata.materialized.clone())
            .unwrap_or_else(|| wanted.to_string())
    }
}

/// Gateway that keeps every file in memory.
#[derive(Default)]
pub struct InMemoryGateway {
    state: RwLock<State>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite a file. Overwrites keep the provider path and bump
    /// the version.
    pub fn put_file(
        &self,
        project_id: &str,
        provider: &Provider,
        materialized: &str,
        content: impl Into<Bytes>,
    ) -> FileMetadata {
        let content = content.into();
        let materialized = path::normalize(materialized);
        let now = OffsetDateTime::now_utc().format(&Rfc3339).ok();

        let mut state = self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.next_id += 1;
        let next_id = state.next_id;

        let files = state
            .storages
            .entry((project_id.to_string(), provider.clone()))
            .or_default();
        let previous = files.get(&materialized).map(|f| f.metadata.clone());

        let mut metadata = FileMetadata::file(&materialized, content.len() as u64);
        metadata.modified_utc = now.clone();
        match previous {
            Some(prev) => {
                metadata.path = prev.path;
                metadata.created_utc = prev.created_utc;
                let version = prev
                    .extra
                    .version
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(0);
                metadata.extra.version = Some((version + 1).to_string());
            }
            None => {
                if provider.has_opaque_paths() {
                    metadata.path = format!("/{next_id:024x}");
                }
                metadata.created_utc = now;
                metadata.extra.version = Some("1".to_string());
            }
        }

        files.insert(
            materialized,
            StoredFile {
                metadata: metadata.clone(),
                content,
            },
        );
        metadata
    }

    /// Remove a file, or a whole subtree when `materialized` ends in `/`.
    /// Returns how many files went away.
    pub fn remove(&self, project_id: &str, provider: &Provider, materialized: &str) -> usize {
        let pattern = path::normalize(materialized);
        let mut state = self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(files) = state
            .storages
            .get_mut(&(project_id.to_string(), provider.clone()))
        else {
            return 0;
        };
        let before = files.len();
        files.retain(|p, _| !path::matches(p, &pattern));
        before - files.len()
    }

    /// Make every call against this project storage fail as unavailable.
    pub fn set_unreachable(&self, project_id: &str, provider: &Provider, unreachable: bool) {
        let key = (project_id.to_string(), provider.clone());
        let mut state = self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        if unreachable {
            state.unreachable.insert(key);
        } else {
            state.unreachable.remove(&key);
        }
    }

    /// Current content of a file, looked up by materialized or provider path.
    pub fn content(&self, project_id: &str, provider: &Provider, wanted: &str) -> Option<Bytes> {
        let state = self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        state
            .lookup(&(project_id.to_string(), provider.clone()), &path::normalize(wanted))
            .map(|f| f.content.clone())
    }

    fn check_reachable(&self, state: &State, key: &StorageKey) -> GatewayResult<()> {
        if state.unreachable.contains(key) {
            return Err(GatewayError::unavailable(
                None,
                format!("{} on {} is unreachable", key.1, key.0),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageGateway for InMemoryGateway {
    async fn metadata(
        &self,
        _user_id: &str,
        project_id: &str,
        provider: &Provider,
        wanted: &str,
    ) -> GatewayResult<FileMetadata> {
        let key = (project_id.to_string(), provider.clone());
        let wanted = path::normalize(wanted);
        let state = self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.check_reachable(&state, &key)?;

        if path::is_folder(&wanted) {
            let exists = wanted == "/"
                || state
                    .storages
                    .get(&key)
                    .is_some_and(|files| files.keys().any(|p| p.starts_with(&wanted)));
            if exists {
                return Ok(FileMetadata::folder(&wanted));
            }
        } else if let Some(file) = state.lookup(&key, &wanted) {
            return Ok(file.metadata.clone());
        }

        Err(GatewayError::unavailable(Some(404), format!("{wanted} not found")))
    }

    async fn list_folder(
        &self,
        _user_id: &str,
        project_id: &str,
        provider: &Provider,
        folder: &str,
    ) -> GatewayResult<Vec<FileMetadata>> {
        let key = (project_id.to_string(), provider.clone());
        let state = self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.check_reachable(&state, &key)?;

        let mut folder = state.resolve(&key, &path::normalize(folder));
        if !path::is_folder(&folder) {
            folder.push('/');
        }

        let mut entries: BTreeMap<String, FileMetadata> = BTreeMap::new();
        if let Some(files) = state.storages.get(&key) {
            for (materialized, file) in files.range(folder.clone()..) {
                let Some(rest) = materialized.strip_prefix(&folder) else {
                    break;
                };
                match rest.split_once('/') {
                    None => {
                        entries.insert(materialized.clone(), file.metadata.clone());
                    }
                    Some((child, _)) => {
                        let child = format!("{folder}{child}/");
                        entries
                            .entry(child.clone())
                            .or_insert_with(|| FileMetadata::folder(&child));
                    }
                }
            }
        }

        if entries.is_empty() && folder != "/" {
            return Err(GatewayError::unavailable(Some(404), format!("{folder} not found")));
        }
        Ok(entries.into_values().collect())
    }

    async fn download(
        &self,
        _user_id: &str,
        project_id: &str,
        provider: &Provider,
        wanted: &str,
        dest: &Path,
    ) -> GatewayResult<u64> {
        let key = (project_id.to_string(), provider.clone());
        let content = {
            let state = self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner());
            self.check_reachable(&state, &key)?;
            state
                .lookup(&key, &path::normalize(wanted))
                .map(|f| f.content.clone())
                .ok_or_else(|| GatewayError::unavailable(Some(404), format!("{wanted} not found")))?
        };
        tokio::fs::write(dest, &content).await?;
        Ok(content.len() as u64)
    }

    async fn upload(
        &self,
        _user_id: &str,
        project_id: &str,
        provider: &Provider,
        folder: &str,
        name: &str,
        data: Bytes,
    ) -> GatewayResult<FileMetadata> {
        let key = (project_id.to_string(), provider.clone());
        let folder = {
            let state = self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner());
            self.check_reachable(&state, &key)?;
            state.resolve(&key, &path::normalize(folder))
        };
        let base = if path::is_folder(&folder) {
            folder
        } else {
            format!("{folder}/")
        };
        Ok(self.put_file(project_id, provider, &format!("{base}{name}"), data))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Change feed fed by hand.
#[derive(Default)]
pub struct InMemoryChangeFeed {
    changes: RwLock<Vec<ChangedFile>>,
    failing: RwLock<bool>,
}

impl InMemoryChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, changed_path: &str, kind: FileKind, changed_at: OffsetDateTime) {
        let mut changes = self.changes.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        changes.push(ChangedFile {
            path: path::normalize(changed_path),
            kind,
            changed_at,
        });
    }

    /// Make subsequent listings fail.
    pub fn set_failing(&self, failing: bool) {
        *self.failing.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = failing;
    }
}

#[async_trait]
impl ChangeFeed for InMemoryChangeFeed {
    async fn changed_since(&self, since: OffsetDateTime) -> GatewayResult<Vec<ChangedFile>> {
        if *self.failing.read().unwrap_or_else(|poisoned| poisoned.into_inner()) {
            return Err(GatewayError::unavailable(Some(503), "change feed unavailable"));
        }
        let changes = self.changes.read().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut latest: BTreeMap<String, ChangedFile> = BTreeMap::new();
        for change in changes.iter().filter(|c| c.changed_at >= since) {
            match latest.get(&change.path) {
                Some(seen) if seen.changed_at >= change.changed_at => {}
                _ => {
                    latest.insert(change.path.clone(), change.clone());
                }
            }
        }

        let mut out: Vec<ChangedFile> = latest.into_values().collect();
        out.sort_by(|a, b| a.changed_at.cmp(&b.changed_at).then_with(|| a.path.cmp(&b.path)));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    const PROJECT: &str = "abc12";

    #[tokio::test]
    async fn test_primary_storage_gets_opaque_paths() {
        let gw = InMemoryGateway::new();
        let meta = gw.put_file(PROJECT, &Provider::OsfStorage, "/docs/a.txt", "hello");
        assert_ne!(meta.path, "/docs/a.txt");
        assert_eq!(meta.materialized, "/docs/a.txt");

        let by_id = gw
            .metadata("u1", PROJECT, &Provider::OsfStorage, &meta.path)
            .await
            .unwrap();
        assert_eq!(by_id.materialized, "/docs/a.txt");
        assert_eq!(by_id.size, Some(5));
    }

    #[tokio::test]
    async fn test_overwrite_keeps_path_and_bumps_version() {
        let gw = InMemoryGateway::new();
        let first = gw.put_file(PROJECT, &Provider::OsfStorage, "/a.txt", "one");
        let second = gw.put_file(PROJECT, &Provider::OsfStorage, "/a.txt", "three");
        assert_eq!(first.path, second.path);
        assert_eq!(second.extra.version.as_deref(), Some("2"));
        assert_eq!(second.size, Some(5));
    }

    #[tokio::test]
    async fn test_list_folder_derives_subfolders() {
        let gw = InMemoryGateway::new();
        gw.put_file(PROJECT, &Provider::Nextcloud, "/a.txt", "a");
        gw.put_file(PROJECT, &Provider::Nextcloud, "/sub/b.txt", "b");
        gw.put_file(PROJECT, &Provider::Nextcloud, "/sub/deep/c.txt", "c");

        let root = gw
            .list_folder("u1", PROJECT, &Provider::Nextcloud, "/")
            .await
            .unwrap();
        let paths: Vec<_> = root.iter().map(|m| m.materialized.as_str()).collect();
        assert_eq!(paths, vec!["/a.txt", "/sub/"]);

        let sub = gw
            .list_folder("u1", PROJECT, &Provider::Nextcloud, "/sub/")
            .await
            .unwrap();
        let paths: Vec<_> = sub.iter().map(|m| m.materialized.as_str()).collect();
        assert_eq!(paths, vec!["/sub/b.txt", "/sub/deep/"]);
    }

    #[tokio::test]
    async fn test_unreachable_storage_is_unavailable_not_missing() {
        let gw = InMemoryGateway::new();
        gw.put_file(PROJECT, &Provider::Nextcloud, "/a.txt", "a");
        gw.set_unreachable(PROJECT, &Provider::Nextcloud, true);

        let err = gw
            .metadata("u1", PROJECT, &Provider::Nextcloud, "/a.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable { status: None, .. }));
        assert!(!err.is_not_found());

        gw.set_unreachable(PROJECT, &Provider::Nextcloud, false);
        assert!(
            gw.metadata("u1", PROJECT, &Provider::Nextcloud, "/a.txt")
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_remove_subtree() {
        let gw = InMemoryGateway::new();
        gw.put_file(PROJECT, &Provider::Nextcloud, "/sub/a.txt", "a");
        gw.put_file(PROJECT, &Provider::Nextcloud, "/sub/b.txt", "b");
        gw.put_file(PROJECT, &Provider::Nextcloud, "/subway.txt", "c");

        assert_eq!(gw.remove(PROJECT, &Provider::Nextcloud, "/sub/"), 2);
        let err = gw
            .metadata("u1", PROJECT, &Provider::Nextcloud, "/sub/a.txt")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(gw.content(PROJECT, &Provider::Nextcloud, "/subway.txt").is_some());
    }

    #[tokio::test]
    async fn test_download_writes_content() {
        let gw = InMemoryGateway::new();
        gw.put_file(PROJECT, &Provider::Nextcloud, "/a.txt", "payload");
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a.txt");

        let written = gw
            .download("u1", PROJECT, &Provider::Nextcloud, "/a.txt", &dest)
            .await
            .unwrap();
        assert_eq!(written, 7);
        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_change_feed_dedupes_and_orders() {
        let feed = InMemoryChangeFeed::new();
        let t0 = OffsetDateTime::now_utc();
        feed.record("/b.txt", FileKind::File, t0 + Duration::seconds(2));
        feed.record("/a.txt", FileKind::File, t0 + Duration::seconds(1));
        feed.record("/b.txt", FileKind::File, t0 + Duration::seconds(5));
        feed.record("/old.txt", FileKind::File, t0 - Duration::seconds(10));

        let changes = feed.changed_since(t0).await.unwrap();
        let paths: Vec<_> = changes.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["/a.txt", "/b.txt"]);
        assert_eq!(changes[1].changed_at, t0 + Duration::seconds(5));

        feed.set_failing(true);
        assert!(feed.changed_since(t0).await.is_err());
    }
}
