//! Directory leases.
//!
//! A lease is a directory created atomically under a lock root. Creating it
//! takes the lease; removing it gives it back. Works across processes on the
//! same filesystem.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Lock root holding one directory per held lease.
#[derive(Clone, Debug)]
pub struct DirLock {
    root: PathBuf,
}

impl DirLock {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{}.lock", name.trim_start_matches('.')))
    }

    /// Take the lease for `key` without waiting. `Ok(None)` when another
    /// holder has it.
    pub fn try_acquire(&self, key: &str) -> io::Result<Option<Lease>> {
        std::fs::create_dir_all(&self.root)?;
        let path = self.path_for(key);
        match std::fs::create_dir(&path) {
            Ok(()) => {
                // Informational only; the directory itself is the lease.
                if let Err(e) = std::fs::write(path.join("owner"), format!("{}\n", std::process::id())) {
                    tracing::debug!(key = %key, error = %e, "could not record lease owner");
                }
                tracing::debug!(key = %key, path = %path.display(), "acquired lease");
                Ok(Some(Lease {
                    key: key.to_string(),
                    path,
                    released: false,
                }))
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Take the lease for `key`, retrying up to `attempts` times with `delay`
    /// between tries. `Ok(None)` when it stayed held throughout.
    pub async fn acquire_with_retry(
        &self,
        key: &str,
        attempts: u32,
        delay: Duration,
    ) -> io::Result<Option<Lease>> {
        for attempt in 0..attempts.max(1) {
            if let Some(lease) = self.try_acquire(key)? {
                return Ok(Some(lease));
            }
            if attempt + 1 < attempts {
                tracing::debug!(key = %key, attempt, "lease held, retrying");
                tokio::time::sleep(delay).await;
            }
        }
        Ok(None)
    }
}

/// A held lease. Released explicitly with [`Lease::release`] or on drop.
#[derive(Debug)]
pub struct Lease {
    key: String,
    path: PathBuf,
    released: bool,
}

impl Lease {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn release(mut self) -> io::Result<()> {
        self.released = true;
        std::fs::remove_dir_all(&self.path)?;
        tracing::debug!(key = %self.key, "released lease");
        Ok(())
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = std::fs::remove_dir_all(&self.path)
        {
            tracing::warn!(key = %self.key, error = %e, "failed to release lease");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let lock = DirLock::new(dir.path().join("locks"));

        let lease = lock.try_acquire("acct-1").unwrap().expect("first acquire");
        assert!(lock.try_acquire("acct-1").unwrap().is_none());
        assert!(lock.try_acquire("acct-2").unwrap().is_some());

        lease.release().unwrap();
        assert!(lock.try_acquire("acct-1").unwrap().is_some());
    }

    #[test]
    fn test_drop_releases() {
        let dir = tempfile::tempdir().unwrap();
        let lock = DirLock::new(dir.path());
        {
            let _lease = lock.try_acquire("acct-1").unwrap().unwrap();
            assert!(lock.try_acquire("acct-1").unwrap().is_none());
        }
        assert!(lock.try_acquire("acct-1").unwrap().is_some());
    }

    #[test]
    fn test_keys_cannot_escape_root() {
        let dir = tempfile::tempdir().unwrap();
        let lock = DirLock::new(dir.path().join("locks"));
        let lease = lock.try_acquire("../../etc").unwrap().unwrap();
        assert!(lease.path.starts_with(lock.root()));
    }

    #[tokio::test]
    async fn test_acquire_with_retry_waits_for_release() {
        let dir = tempfile::tempdir().unwrap();
        let lock = DirLock::new(dir.path());
        let held = lock.try_acquire("acct-1").unwrap().unwrap();

        let waiter = {
            let lock = lock.clone();
            tokio::spawn(async move {
                lock.acquire_with_retry("acct-1", 50, Duration::from_millis(20))
                    .await
                    .unwrap()
                    .is_some()
            })
        };
        tokio::time::sleep(Duration::from_millis(60)).await;
        held.release().unwrap();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_acquire_with_retry_gives_up() {
        let dir = tempfile::tempdir().unwrap();
        let lock = DirLock::new(dir.path());
        let _held = lock.try_acquire("acct-1").unwrap().unwrap();
        let result = lock
            .acquire_with_retry("acct-1", 3, Duration::from_millis(5))
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
