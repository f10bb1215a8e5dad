//! Durable per-user saved search requests.
//!
//! A completed funnel appends a snapshot of the selections to the user's
//! list in a flat JSON file. Snapshots are immutable; users can delete them
//! one at a time or all at once. The file is read-modify-written whole on
//! every mutation, matching the simple contract of the storage.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::warn;

/// Persisted snapshot of a completed search.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedRequest {
    pub manufacturer: String,
    pub model_group: String,
    pub model: String,
    pub trim: String,
    pub year_from: i32,
    pub year_to: i32,
    pub mileage_from: u32,
    pub mileage_to: u32,
    /// Native color token, or "all".
    pub color: String,
}

pub struct RequestBook {
    path: PathBuf,
    // Keyed by stringified user id, as the file stores it.
    requests: Mutex<HashMap<String, Vec<SavedRequest>>>,
}

impl RequestBook {
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let requests = match std::fs::read_to_string(&path) {
            Ok(content) if !content.trim().is_empty() => {
                match serde_json::from_str(&content) {
                    Ok(map) => map,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Requests file is malformed, starting empty");
                        HashMap::new()
                    }
                }
            }
            _ => HashMap::new(),
        };
        Self {
            path,
            requests: Mutex::new(requests),
        }
    }

    pub async fn append(&self, user_id: u64, req: SavedRequest) -> Result<()> {
        let mut requests = self.requests.lock().await;
        requests.entry(user_id.to_string()).or_default().push(req);
        self.persist(&requests)
    }

    pub async fn list(&self, user_id: u64) -> Vec<SavedRequest> {
        self.requests
            .lock()
            .await
            .get(&user_id.to_string())
            .cloned()
            .unwrap_or_default()
    }

    /// Delete one request by index. Returns the removed snapshot, or `None`
    /// when the index does not exist.
    pub async fn delete(&self, user_id: u64, index: usize) -> Result<Option<SavedRequest>> {
        let mut requests = self.requests.lock().await;
        let removed = match requests.get_mut(&user_id.to_string()) {
            Some(list) if index < list.len() => Some(list.remove(index)),
            _ => None,
        };
        if removed.is_some() {
            self.persist(&requests)?;
        }
        Ok(removed)
    }

    /// Drop every saved request for the user. Returns whether anything was
    /// there to delete.
    pub async fn clear(&self, user_id: u64) -> Result<bool> {
        let mut requests = self.requests.lock().await;
        let had_any = requests
            .get(&user_id.to_string())
            .is_some_and(|l| !l.is_empty());
        requests.insert(user_id.to_string(), Vec::new());
        self.persist(&requests)?;
        Ok(had_any)
    }

    fn persist(&self, requests: &HashMap<String, Vec<SavedRequest>>) -> Result<()> {
        let json = serde_json::to_string_pretty(requests)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("writing requests file {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SavedRequest {
        SavedRequest {
            manufacturer: "현대".to_string(),
            model_group: "그랜저".to_string(),
            model: "그랜저 IG".to_string(),
            trim: "프리미엄".to_string(),
            year_from: 2018,
            year_to: 2020,
            mileage_from: 0,
            mileage_to: 50000,
            color: "all".to_string(),
        }
    }

    #[tokio::test]
    async fn append_and_list_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requests.json");

        let book = RequestBook::load(&path);
        book.append(1, sample()).await.unwrap();
        book.append(1, sample()).await.unwrap();

        let reloaded = RequestBook::load(&path);
        assert_eq!(reloaded.list(1).await.len(), 2);
        assert!(reloaded.list(2).await.is_empty());
    }

    #[tokio::test]
    async fn delete_by_index() {
        let dir = tempfile::tempdir().unwrap();
        let book = RequestBook::load(dir.path().join("requests.json"));
        book.append(1, sample()).await.unwrap();

        assert!(book.delete(1, 5).await.unwrap().is_none());
        assert_eq!(book.delete(1, 0).await.unwrap(), Some(sample()));
        assert!(book.list(1).await.is_empty());
    }

    #[tokio::test]
    async fn clear_reports_whether_any_existed() {
        let dir = tempfile::tempdir().unwrap();
        let book = RequestBook::load(dir.path().join("requests.json"));
        assert!(!book.clear(1).await.unwrap());
        book.append(1, sample()).await.unwrap();
        assert!(book.clear(1).await.unwrap());
    }
}
