//! Job orchestration split into focused submodules.
//!
//! The `JobOrchestrator` struct and its methods are organized by concern:
//! - [`submit`] - Validation and the per-job stage pipeline
//! - [`control`] - Lookup, deletion, status and registry reset
//! - [`batch`] - Concurrent submission of several URLs
//! - [`lifecycle`] - Startup sweep and graceful shutdown

mod batch;
mod control;
mod lifecycle;
mod submit;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::config::Config;
use crate::error::Result;
use crate::invoker::{CliDownloadInvoker, DownloadInvoker};
use crate::registry::JobRegistry;
use crate::resolver::OutputResolver;
use crate::types::{Event, JobId, Stage};
use crate::validation::UrlPolicy;
use crate::workspace::WorkspaceProvisioner;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Semaphore, broadcast};

/// Stage of every provisioned job that has not finished yet
///
/// A plain mutex, never held across an await, so entries can be dropped
/// synchronously when a submission is cancelled.
pub(crate) type ActiveJobs = Arc<Mutex<HashMap<JobId, Stage>>>;

/// In-flight job tracking
#[derive(Clone)]
pub(crate) struct JobState {
    /// Semaphore bounding concurrent jobs (respects max_concurrent_jobs config)
    pub(crate) concurrent_limit: Arc<Semaphore>,
    /// Running jobs and their current stage
    pub(crate) active_jobs: ActiveJobs,
    /// Submissions currently inside `submit`, including ones waiting for a permit
    pub(crate) in_flight: Arc<AtomicUsize>,
    /// Flag to indicate whether new jobs are accepted (set to false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
}

/// Components each job runs through
#[derive(Clone)]
pub(crate) struct Pipeline {
    pub(crate) policy: Arc<UrlPolicy>,
    pub(crate) provisioner: Arc<WorkspaceProvisioner>,
    /// Downloader (trait object for pluggable implementations)
    pub(crate) invoker: Arc<dyn DownloadInvoker>,
    pub(crate) resolver: Arc<OutputResolver>,
}

/// Entry point for submitting, retrieving and deleting jobs
///
/// Cloneable; all state is shared behind `Arc`s. The registry is owned by the
/// orchestrator, so separate instances never see each other's jobs.
#[derive(Clone)]
pub struct JobOrchestrator {
    pub(crate) config: Arc<Config>,
    pub(crate) pipeline: Pipeline,
    pub(crate) registry: Arc<JobRegistry>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    pub(crate) state: JobState,
}

impl JobOrchestrator {
    /// Create an orchestrator that runs the external downloader from `config`
    ///
    /// This validates the configuration, creates the base download directory,
    /// resolves the downloader binary, and sweeps stale workspaces if
    /// `workspace.sweep_max_age` is set.
    pub async fn new(config: Config) -> Result<Self> {
        let invoker = Arc::new(CliDownloadInvoker::from_config(&config));
        Self::with_invoker(config, invoker).await
    }

    /// Create an orchestrator with a custom downloader implementation
    pub async fn with_invoker(config: Config, invoker: Arc<dyn DownloadInvoker>) -> Result<Self> {
        config.validate()?;

        let provisioner = WorkspaceProvisioner::new(config.download_dir().clone());
        tokio::fs::create_dir_all(provisioner.base_dir())
            .await
            .map_err(|e| crate::error::Error::storage(provisioner.base_dir(), e))?;

        // Buffer of 1000 events; slow subscribers lag rather than block jobs
        let (event_tx, _rx) = broadcast::channel(1000);

        let state = JobState {
            concurrent_limit: Arc::new(Semaphore::new(config.download.max_concurrent_jobs)),
            active_jobs: Arc::new(Mutex::new(HashMap::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            accepting_new: Arc::new(AtomicBool::new(true)),
        };

        let pipeline = Pipeline {
            policy: Arc::new(UrlPolicy::new(&config.validation)),
            provisioner: Arc::new(provisioner),
            invoker,
            resolver: Arc::new(OutputResolver::from_config(&config.download)),
        };

        tracing::info!(
            downloader = pipeline.invoker.name(),
            download_dir = ?config.download.download_dir,
            timeout = ?config.download.timeout,
            max_concurrent_jobs = config.download.max_concurrent_jobs,
            "job orchestrator initialized"
        );

        let orchestrator = Self {
            config: Arc::new(config),
            pipeline,
            registry: Arc::new(JobRegistry::new()),
            event_tx,
            state,
        };

        if let Some(max_age) = orchestrator.config.workspace.sweep_max_age {
            orchestrator.sweep_workspaces(max_age).await?;
        }

        Ok(orchestrator)
    }

    /// Subscribe to job lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn emit(&self, event: Event) {
        // No subscribers is fine
        self.event_tx.send(event).ok();
    }

    pub(crate) fn is_accepting(&self) -> bool {
        self.state.accepting_new.load(Ordering::SeqCst)
    }
}

impl JobState {
    /// Lock the running-job map, recovering it if a holder panicked
    pub(crate) fn active(&self) -> MutexGuard<'_, HashMap<JobId, Stage>> {
        lock_active(&self.active_jobs)
    }
}

fn lock_active(jobs: &ActiveJobs) -> MutexGuard<'_, HashMap<JobId, Stage>> {
    jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Keeps a job listed as running until the guard is dropped
///
/// Dropping happens on completion and also when the `submit` future is
/// cancelled, so an abandoned job never stays listed.
pub(crate) struct ActiveJobGuard {
    jobs: ActiveJobs,
    id: JobId,
}

impl ActiveJobGuard {
    pub(crate) fn track(jobs: &ActiveJobs, id: JobId, stage: Stage) -> Self {
        lock_active(jobs).insert(id, stage);
        Self {
            jobs: Arc::clone(jobs),
            id,
        }
    }

    pub(crate) fn set_stage(&self, stage: Stage) {
        if let Some(tracked) = lock_active(&self.jobs).get_mut(&self.id) {
            *tracked = stage;
        }
    }
}

impl Drop for ActiveJobGuard {
    fn drop(&mut self) {
        lock_active(&self.jobs).remove(&self.id);
    }
}

/// Counts a submission as in flight for as long as it is alive
pub(crate) struct InFlightGuard {
    counter: Arc<AtomicUsize>,
}

impl InFlightGuard {
    pub(crate) fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self {
            counter: Arc::clone(counter),
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}
