//! Per-job workspace directories
//!
//! Every job gets a fresh directory `<base>/<job id>`. The directory name and
//! the job identifier are the same value by construction, so a workspace can
//! always be traced back to its job.

use crate::error::{Error, Result};
use crate::types::JobId;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{debug, info, warn};

/// A directory owned by exactly one job
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Workspace {
    id: JobId,
    path: PathBuf,
}

impl Workspace {
    /// Job identifier (equal to the directory name)
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Directory path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Creates isolated job directories under a base directory
#[derive(Clone, Debug)]
pub struct WorkspaceProvisioner {
    base_dir: PathBuf,
}

impl WorkspaceProvisioner {
    /// Create a provisioner rooted at `base_dir`
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Base directory all workspaces live in
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Mint a job identifier and create its workspace
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the base directory cannot be created or is
    /// not a directory, or if the job directory cannot be created. An existing
    /// directory with the freshly minted name is a hard failure and is not retried.
    pub async fn provision(&self) -> Result<Workspace> {
        self.ensure_base_dir().await?;

        let id = JobId::new();
        let path = self.base_dir.join(id.to_string());

        // create_dir (not create_dir_all) so a name collision surfaces as AlreadyExists
        fs::create_dir(&path)
            .await
            .map_err(|e| Error::storage(&path, e))?;

        let workspace = Workspace { id, path };
        if workspace.path.file_name().and_then(|n| n.to_str()) != Some(id.to_string().as_str()) {
            return Err(Error::Invariant(format!(
                "workspace {:?} does not match job id {id}",
                workspace.path
            )));
        }

        debug!(job_id = %id, path = ?workspace.path, "workspace provisioned");
        Ok(workspace)
    }

    /// Remove a workspace and everything in it
    pub async fn remove(&self, workspace: &Workspace) -> Result<()> {
        match fs::remove_dir_all(&workspace.path).await {
            Ok(()) => {
                debug!(job_id = %workspace.id, "workspace removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage(&workspace.path, e)),
        }
    }

    /// Remove job directories older than `max_age` that are not in `keep`
    ///
    /// Only directories whose name parses as a job identifier are considered.
    /// Failures on individual entries are logged and skipped. Returns the number
    /// of workspaces removed.
    pub async fn sweep(&self, max_age: Duration, keep: &HashSet<JobId>) -> Result<usize> {
        let mut entries = match fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(Error::storage(&self.base_dir, e)),
        };

        let now = SystemTime::now();
        let mut removed = 0;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::storage(&self.base_dir, e))?
        {
            let path = entry.path();
            let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<JobId>().ok())
            else {
                continue;
            };
            if keep.contains(&id) {
                continue;
            }

            let metadata = match entry.metadata().await {
                Ok(m) if m.is_dir() => m,
                Ok(_) => continue,
                Err(e) => {
                    warn!(?path, error = %e, "could not stat workspace during sweep");
                    continue;
                }
            };
            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age < max_age {
                continue;
            }

            match fs::remove_dir_all(&path).await {
                Ok(()) => {
                    debug!(job_id = %id, ?age, "removed stale workspace");
                    removed += 1;
                }
                Err(e) => warn!(?path, error = %e, "failed to remove stale workspace"),
            }
        }

        if removed > 0 {
            info!(removed, base_dir = ?self.base_dir, "swept stale workspaces");
        }
        Ok(removed)
    }

    async fn ensure_base_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|e| Error::storage(&self.base_dir, e))?;

        let metadata = fs::metadata(&self.base_dir)
            .await
            .map_err(|e| Error::storage(&self.base_dir, e))?;
        if !metadata.is_dir() {
            return Err(Error::storage(
                &self.base_dir,
                std::io::Error::other("base download path is not a directory"),
            ));
        }
        Ok(())
    }
}
