//! Access control: a flat allow-set of Telegram user ids.
//!
//! The set is loaded once at startup and persisted on every mutation. There
//! are no roles beyond allowed/not-allowed; the manager id may grant access,
//! and a fixed reporter list may run the two reporting commands.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::warn;

/// The only id allowed to grant access.
pub const MANAGER_ID: u64 = 56022406;

/// Ids allowed to run `/userlist` and `/remove_user`.
pub const REPORTER_IDS: &[u64] = &[728438182, 6624693060, 6526086431];

pub struct AccessList {
    path: PathBuf,
    allowed: Mutex<BTreeSet<u64>>,
}

impl AccessList {
    /// Load the allow-set from `path`. A missing or unreadable file yields
    /// an empty set with a warning, never a startup failure.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let allowed = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Vec<u64>>(&content) {
                Ok(ids) => ids.into_iter().collect(),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Access file is malformed, starting empty");
                    BTreeSet::new()
                }
            },
            Err(_) => BTreeSet::new(),
        };
        Self {
            path,
            allowed: Mutex::new(allowed),
        }
    }

    pub async fn is_allowed(&self, user_id: u64) -> bool {
        self.allowed.lock().await.contains(&user_id)
    }

    pub fn is_manager(user_id: u64) -> bool {
        user_id == MANAGER_ID
    }

    pub fn is_reporter(user_id: u64) -> bool {
        REPORTER_IDS.contains(&user_id)
    }

    /// Grant access and persist immediately.
    pub async fn add(&self, user_id: u64) -> Result<()> {
        let mut allowed = self.allowed.lock().await;
        allowed.insert(user_id);
        self.persist(&allowed)
    }

    /// Revoke access and persist immediately. Returns whether the id was
    /// present.
    pub async fn remove(&self, user_id: u64) -> Result<bool> {
        let mut allowed = self.allowed.lock().await;
        let removed = allowed.remove(&user_id);
        if removed {
            self.persist(&allowed)?;
        }
        Ok(removed)
    }

    pub async fn all(&self) -> Vec<u64> {
        self.allowed.lock().await.iter().copied().collect()
    }

    fn persist(&self, allowed: &BTreeSet<u64>) -> Result<()> {
        let ids: Vec<u64> = allowed.iter().copied().collect();
        let json = serde_json::to_string_pretty(&ids)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("writing access file {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let list = AccessList::load(dir.path().join("access.json"));
        assert!(!list.is_allowed(42).await);
        assert!(list.all().await.is_empty());
    }

    #[tokio::test]
    async fn add_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.json");

        let list = AccessList::load(&path);
        list.add(42).await.unwrap();
        list.add(7).await.unwrap();

        let reloaded = AccessList::load(&path);
        assert!(reloaded.is_allowed(42).await);
        assert!(reloaded.is_allowed(7).await);
        assert!(!reloaded.is_allowed(8).await);
    }

    #[tokio::test]
    async fn remove_reports_presence() {
        let dir = tempfile::tempdir().unwrap();
        let list = AccessList::load(dir.path().join("access.json"));
        list.add(42).await.unwrap();
        assert!(list.remove(42).await.unwrap());
        assert!(!list.remove(42).await.unwrap());
    }

    #[test]
    fn role_checks() {
        assert!(AccessList::is_manager(MANAGER_ID));
        assert!(!AccessList::is_manager(1));
        assert!(AccessList::is_reporter(REPORTER_IDS[0]));
        assert!(!AccessList::is_reporter(1));
    }
}
