//! Shared test helpers for creating JobOrchestrator instances in tests.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::invoker::DownloadInvoker;
use crate::orchestrator::JobOrchestrator;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Semaphore;

/// What a fake downloader run does
#[derive(Clone, Debug)]
pub(crate) enum Behaviour {
    /// Write these files into the workspace and exit successfully
    Produce(Vec<&'static str>),
    /// Exit with this code without writing anything
    Exit(i32),
    /// Run until the timeout fires
    Hang,
}

/// In-process stand-in for the external downloader
pub(crate) struct FakeInvoker {
    default: Behaviour,
    routes: HashMap<String, Behaviour>,
    gate: Option<Arc<Semaphore>>,
    calls: AtomicUsize,
    running: AtomicUsize,
    max_running: AtomicUsize,
    urls: std::sync::Mutex<Vec<String>>,
}

impl FakeInvoker {
    pub(crate) fn new(default: Behaviour) -> Self {
        Self {
            default,
            routes: HashMap::new(),
            gate: None,
            calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
            urls: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Use `behaviour` for runs of exactly `url`
    pub(crate) fn route(mut self, url: &str, behaviour: Behaviour) -> Self {
        self.routes.insert(url.to_string(), behaviour);
        self
    }

    /// Block every run until a permit is added to `gate`
    pub(crate) fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }

    async fn perform(&self, url: &str, workspace: &Path, timeout: Duration) -> Result<()> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        match self.routes.get(url).unwrap_or(&self.default) {
            Behaviour::Produce(names) => {
                for name in names {
                    tokio::fs::write(workspace.join(name), b"media")
                        .await
                        .map_err(|e| Error::storage(workspace.join(name), e))?;
                }
                Ok(())
            }
            Behaviour::Exit(code) => Err(Error::Download {
                exit_code: Some(*code),
            }),
            Behaviour::Hang => {
                tokio::time::sleep(timeout).await;
                Err(Error::Timeout { timeout })
            }
        }
    }
}

#[async_trait]
impl DownloadInvoker for FakeInvoker {
    async fn run(&self, url: &str, workspace: &Path, timeout: Duration) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);

        let result = self.perform(url, workspace, timeout).await;

        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Config rooted in a fresh temp dir
pub(crate) fn test_config(temp_dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.download.download_dir = temp_dir.path().join("downloads");
    config.download.timeout = Duration::from_secs(5);
    config
}

/// Helper to create a test JobOrchestrator around a fake downloader.
/// Returns the orchestrator, the fake, and the tempdir (which must be kept alive).
pub(crate) async fn create_test_orchestrator(
    invoker: FakeInvoker,
) -> (JobOrchestrator, Arc<FakeInvoker>, TempDir) {
    create_test_orchestrator_with(invoker, |_| {}).await
}

/// Like [`create_test_orchestrator`], letting the caller adjust the config first
pub(crate) async fn create_test_orchestrator_with(
    invoker: FakeInvoker,
    adjust: impl FnOnce(&mut Config),
) -> (JobOrchestrator, Arc<FakeInvoker>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(&temp_dir);
    adjust(&mut config);

    let invoker = Arc::new(invoker);
    let orchestrator = JobOrchestrator::with_invoker(config, invoker.clone())
        .await
        .unwrap();
    (orchestrator, invoker, temp_dir)
}

/// Poll until `condition` holds, panicking after a few seconds
pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

/// Names of all entries directly under `dir`
pub(crate) fn entry_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
