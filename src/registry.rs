//! In-memory mapping from job identifier to resolved file
//!
//! The registry is the only state shared between jobs. Every operation holds
//! the lock for its whole duration. Readers never see a half-applied change,
//! and `remove` deletes the file while still holding the entry. An entry and
//! its file therefore disappear together, or neither disappears.

use crate::error::{Error, Result};
use crate::types::JobId;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Concurrency-safe store of completed jobs
///
/// Starts empty; lives as long as its owner. Cloning a registry is not
/// supported. Share it behind an `Arc` instead.
#[derive(Debug, Default)]
pub struct JobRegistry {
    entries: RwLock<HashMap<JobId, PathBuf>>,
}

impl JobRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the result file for a job
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateId`] if the identifier is already registered.
    /// The existing entry is left untouched.
    pub async fn put(&self, id: JobId, path: PathBuf) -> Result<()> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&id) {
            return Err(Error::DuplicateId(id));
        }
        debug!(job_id = %id, ?path, "job registered");
        entries.insert(id, path);
        Ok(())
    }

    /// Look up the result file for a job
    pub async fn get(&self, id: &JobId) -> Option<PathBuf> {
        self.entries.read().await.get(id).cloned()
    }

    /// Whether a job is registered
    pub async fn contains(&self, id: &JobId) -> bool {
        self.entries.read().await.contains_key(id)
    }

    /// Remove a job and delete its file from disk
    ///
    /// A file that is already gone counts as deleted. If the file exists but
    /// cannot be deleted, the entry stays registered and a storage error is returned.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the identifier is not registered
    /// - [`Error::Storage`] if the file could not be deleted
    pub async fn remove(&self, id: &JobId) -> Result<PathBuf> {
        let mut entries = self.entries.write().await;
        let Some(path) = entries.get(id).cloned() else {
            return Err(Error::NotFound(id.to_string()));
        };

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(job_id = %id, ?path, "registered file was already missing");
            }
            Err(e) => return Err(Error::storage(&path, e)),
        }

        entries.remove(id);
        debug!(job_id = %id, ?path, "job removed");
        Ok(path)
    }

    /// Drop every entry without touching files on disk
    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        debug!(count = entries.len(), "registry cleared");
        entries.clear();
    }

    /// Number of registered jobs
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether no jobs are registered
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Snapshot of every registered identifier
    pub async fn ids(&self) -> Vec<JobId> {
        self.entries.read().await.keys().copied().collect()
    }
}
