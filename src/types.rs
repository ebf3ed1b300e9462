//! Core types for media-dl

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Unique identifier for a job
///
/// A random 128-bit token minted when a workspace is provisioned. The same value
/// names the job's workspace directory and keys its registry entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Mint a fresh random identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for JobId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<JobId> for Uuid {
    fn from(id: JobId) -> Self {
        id.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Stage of the job lifecycle
///
/// Jobs move forward through these stages in order. A failure at any stage is
/// reported together with the stage it happened in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Checking the submitted URL
    Validating,
    /// Creating the job workspace
    Provisioning,
    /// Running the external downloader
    Downloading,
    /// Locating and normalizing the produced file
    Resolving,
    /// Result published to the registry (terminal)
    Registered,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Validating => "validating",
            Stage::Provisioning => "provisioning",
            Stage::Downloading => "downloading",
            Stage::Resolving => "resolving",
            Stage::Registered => "registered",
        };
        f.write_str(name)
    }
}

/// Job status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Accepted and still running
    Pending,
    /// File resolved and registered
    Succeeded,
    /// Terminated with a fault
    Failed,
}

/// A single fetch request tracked from provisioning to registration
///
/// Owned by the task executing the submission; never shared between tasks.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Job {
    /// Job identifier (matches the workspace directory name)
    pub id: JobId,
    /// Validated source URL
    pub url: String,
    /// Workspace directory owned by this job
    pub workspace: PathBuf,
    /// Resolved output file, set once on success
    pub result: Option<PathBuf>,
    /// Current stage
    pub stage: Stage,
    /// Current status
    pub status: Status,
}

impl Job {
    /// Create a pending job for a freshly provisioned workspace
    pub fn new(id: JobId, url: impl Into<String>, workspace: PathBuf) -> Self {
        Self {
            id,
            url: url.into(),
            workspace,
            result: None,
            stage: Stage::Provisioning,
            status: Status::Pending,
        }
    }

    /// Move to the next stage
    pub(crate) fn advance(&mut self, stage: Stage) {
        self.stage = stage;
    }

    /// Record the resolved file and mark the job registered
    pub(crate) fn succeed(&mut self, path: PathBuf) {
        self.result = Some(path);
        self.stage = Stage::Registered;
        self.status = Status::Succeeded;
    }

    /// Mark the job failed, keeping the stage it failed in
    pub(crate) fn fail(&mut self) {
        self.status = Status::Failed;
    }
}

/// Event emitted during the job lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Workspace created for a new job
    Provisioned {
        /// Job ID
        id: JobId,
        /// Source URL
        url: String,
        /// Workspace directory
        workspace: PathBuf,
    },

    /// Job moved to a new stage
    StageChanged {
        /// Job ID
        id: JobId,
        /// New stage
        stage: Stage,
    },

    /// Job finished and its file is available
    Completed {
        /// Job ID
        id: JobId,
        /// Resolved file path
        path: PathBuf,
    },

    /// Job failed
    Failed {
        /// Job ID
        id: JobId,
        /// Stage the failure happened in
        stage: Stage,
        /// Machine-readable fault code
        code: String,
        /// Error message
        error: String,
    },

    /// Job and its file were deleted
    Deleted {
        /// Job ID
        id: JobId,
    },

    /// Orchestrator is shutting down
    Shutdown,
}
