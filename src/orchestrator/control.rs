//! Lookup, deletion, status and registry reset.

use crate::error::{Error, Result};
use crate::types::{Event, JobId, Stage, Status};
use std::path::PathBuf;
use tracing::{debug, info};

use super::JobOrchestrator;

impl JobOrchestrator {
    /// Resolve a job identifier string to its registered file
    ///
    /// Returns `None` for identifiers that are unknown, not yet registered,
    /// already deleted, or not valid identifiers at all.
    pub async fn lookup(&self, id: &str) -> Option<PathBuf> {
        let id: JobId = id.parse().ok()?;
        self.get(&id).await
    }

    /// Registered file for a typed job identifier
    pub async fn get(&self, id: &JobId) -> Option<PathBuf> {
        self.registry.get(id).await
    }

    /// Delete a job's file and forget the job
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the identifier is malformed or not registered
    /// - [`Error::Storage`] if the file exists but could not be deleted; the
    ///   job stays registered in that case
    pub async fn delete(&self, id: &str) -> Result<()> {
        let id: JobId = id
            .parse()
            .map_err(|_| Error::NotFound(id.to_string()))?;
        self.remove(&id).await.map(|_| ())
    }

    /// Delete a job by typed identifier, returning the path that was removed
    pub async fn remove(&self, id: &JobId) -> Result<PathBuf> {
        let path = self.registry.remove(id).await?;
        info!(job_id = %id, ?path, "job deleted");
        self.emit(Event::Deleted { id: *id });

        // The workspace is normally empty now; anything left in it is kept
        let workspace = self.pipeline.provisioner.base_dir().join(id.to_string());
        if let Err(e) = tokio::fs::remove_dir(&workspace).await {
            debug!(job_id = %id, ?workspace, error = %e, "workspace left in place");
        }

        Ok(path)
    }

    /// Forget every registered job, leaving files on disk
    pub async fn clear(&self) {
        self.registry.clear().await;
    }

    /// Current status of a job
    ///
    /// Jobs still running are [`Status::Pending`]; registered jobs are
    /// [`Status::Succeeded`]. Failed and deleted jobs are not tracked and
    /// return `None`.
    pub async fn status(&self, id: &JobId) -> Option<Status> {
        let running = self.state.active().contains_key(id);
        if running {
            return Some(Status::Pending);
        }
        self.registry
            .contains(id)
            .await
            .then_some(Status::Succeeded)
    }

    /// Snapshot of running jobs and the stage each is in
    pub async fn active_jobs(&self) -> Vec<(JobId, Stage)> {
        let mut jobs: Vec<_> = self
            .state
            .active()
            .iter()
            .map(|(id, stage)| (*id, *stage))
            .collect();
        jobs.sort_by_key(|(id, _)| *id);
        jobs
    }
}
