//! Startup sweep and graceful shutdown.

use crate::error::Result;
use crate::types::Event;
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::JobOrchestrator;

/// Upper bound on how long shutdown waits for running jobs
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl JobOrchestrator {
    /// Stop accepting submissions and wait for running jobs to finish
    ///
    /// Submissions arriving afterwards fail with
    /// [`Error::ShuttingDown`](crate::Error::ShuttingDown). Jobs already running
    /// are given up to 30 seconds; each is bounded by its own download timeout
    /// regardless. Registered jobs stay available for lookup and deletion.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("initiating graceful shutdown");

        self.state.accepting_new.store(false, Ordering::SeqCst);
        tracing::info!("stopped accepting new jobs");

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.wait_for_in_flight()).await {
            Ok(()) => tracing::info!("all running jobs finished"),
            Err(_) => tracing::warn!(
                in_flight = self.state.in_flight.load(Ordering::SeqCst),
                "timeout waiting for running jobs, proceeding with shutdown"
            ),
        }

        self.emit(Event::Shutdown);
        tracing::info!("graceful shutdown complete");
        Ok(())
    }

    /// Remove stale workspaces under the download directory
    ///
    /// Workspaces of registered jobs and of jobs still running are never
    /// removed. Returns the number of workspaces deleted.
    pub async fn sweep_workspaces(&self, max_age: Duration) -> Result<usize> {
        let mut keep: HashSet<_> = self.registry.ids().await.into_iter().collect();
        keep.extend(self.state.active().keys().copied());

        self.pipeline.provisioner.sweep(max_age, &keep).await
    }

    async fn wait_for_in_flight(&self) {
        loop {
            let in_flight = self.state.in_flight.load(Ordering::SeqCst);
            if in_flight == 0 {
                return;
            }

            tracing::debug!(in_flight, "waiting for running jobs to complete");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
