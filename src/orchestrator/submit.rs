//! Validation and the per-job stage pipeline.

use crate::error::{Error, Result, ToHttpStatus};
use crate::types::{Event, Job, JobId, Stage};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::{ActiveJobGuard, InFlightGuard, JobOrchestrator};

impl JobOrchestrator {
    /// Fetch `url` and register the resulting file
    ///
    /// Runs the job through validating, provisioning, downloading and resolving.
    /// On success the returned identifier resolves through [`lookup`](Self::lookup).
    /// On failure nothing is registered. The error carries the job identifier
    /// (once one exists) and the stage that failed. Match on
    /// [`Error::kind`] to tell failure categories apart.
    ///
    /// Waits for a free slot when `max_concurrent_jobs` jobs are already running.
    ///
    /// # Errors
    ///
    /// - [`Error::ShuttingDown`] after [`shutdown`](Self::shutdown) was called
    /// - [`Error::Job`] wrapping the originating fault for any stage failure
    pub async fn submit(&self, url: &str) -> Result<JobId> {
        let _in_flight = InFlightGuard::new(&self.state.in_flight);
        if !self.is_accepting() {
            return Err(Error::ShuttingDown);
        }

        let url = self
            .pipeline
            .policy
            .check(url)
            .map_err(|e| Error::from(e).in_job(None, Stage::Validating))?;

        let _permit = self
            .state
            .concurrent_limit
            .acquire()
            .await
            .map_err(|_| Error::ShuttingDown)?;

        // Shutdown may have started while this submission was waiting for a slot
        if !self.is_accepting() {
            return Err(Error::ShuttingDown);
        }

        let workspace = self
            .pipeline
            .provisioner
            .provision()
            .await
            .map_err(|e| e.in_job(None, Stage::Provisioning))?;

        let mut job = Job::new(workspace.id(), url, workspace.path().to_path_buf());
        let tracking = ActiveJobGuard::track(&self.state.active_jobs, job.id, job.stage);
        self.emit(Event::Provisioned {
            id: job.id,
            url: job.url.clone(),
            workspace: job.workspace.clone(),
        });

        let outcome = self.execute(&mut job, &tracking).await;
        drop(tracking);

        match outcome {
            Ok(path) => {
                job.succeed(path.clone());
                info!(job_id = %job.id, ?path, "job completed");
                self.emit(Event::Completed { id: job.id, path });
                Ok(job.id)
            }
            Err(e) => {
                job.fail();
                warn!(
                    job_id = %job.id,
                    stage = %job.stage,
                    error = %e,
                    "job failed"
                );
                self.emit(Event::Failed {
                    id: job.id,
                    stage: job.stage,
                    code: e.error_code().to_string(),
                    error: e.to_string(),
                });

                if self.config.download.remove_failed_workspaces
                    && let Err(cleanup) = self.pipeline.provisioner.remove(&workspace).await
                {
                    warn!(job_id = %job.id, error = %cleanup, "failed to remove workspace of failed job");
                }

                Err(e.in_job(Some(job.id), job.stage))
            }
        }
    }

    /// Download, resolve and register; the registry entry is the last step
    async fn execute(&self, job: &mut Job, tracking: &ActiveJobGuard) -> Result<PathBuf> {
        self.enter_stage(job, tracking, Stage::Downloading);
        self.pipeline
            .invoker
            .run(&job.url, &job.workspace, self.config.download.timeout)
            .await?;

        self.enter_stage(job, tracking, Stage::Resolving);
        let path = self.pipeline.resolver.resolve(&job.workspace).await?;

        self.registry.put(job.id, path.clone()).await?;
        Ok(path)
    }

    fn enter_stage(&self, job: &mut Job, tracking: &ActiveJobGuard, stage: Stage) {
        job.advance(stage);
        tracking.set_stage(stage);
        debug!(job_id = %job.id, %stage, "job stage changed");
        self.emit(Event::StageChanged { id: job.id, stage });
    }
}
