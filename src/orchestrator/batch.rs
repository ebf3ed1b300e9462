//! Concurrent submission of several URLs.

use crate::error::{Error, Result};
use crate::types::JobId;
use tokio::task::JoinSet;

use super::JobOrchestrator;

impl JobOrchestrator {
    /// Submit several URLs concurrently
    ///
    /// Every URL becomes its own job; one failing does not affect the others.
    /// Results are returned in input order. Concurrency is still bounded by
    /// `max_concurrent_jobs`.
    pub async fn submit_many<I, S>(&self, urls: I) -> Vec<Result<JobId>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut tasks = JoinSet::new();
        let mut count = 0;
        for (index, url) in urls.into_iter().enumerate() {
            let orchestrator = self.clone();
            let url: String = url.into();
            tasks.spawn(async move { (index, orchestrator.submit(&url).await) });
            count += 1;
        }

        let mut results: Vec<Option<Result<JobId>>> = (0..count).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => tracing::error!(error = %e, "submission task failed"),
            }
        }

        results
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    Err(Error::Invariant("submission task did not complete".into()))
                })
            })
            .collect()
    }
}
