//! External downloader invocation
//!
//! The core abstraction is the [`DownloadInvoker`] trait: run the downloader for
//! one URL into one workspace, bounded by a timeout. [`CliDownloadInvoker`] is the
//! implementation that spawns the external binary (yt-dlp by default).
//!
//! ## Output draining
//!
//! The child's stdout and stderr are drained line by line on two tasks that run
//! concurrently with each other and with the wait for exit. A child writing more
//! than a pipe buffer's worth of output therefore never blocks. Both drain tasks
//! are joined before [`DownloadInvoker::run`] returns. If they outlive the child
//! by more than a short grace period, they are aborted together.

use crate::config::Config;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Output template handed to the downloader, relative to the workspace
pub const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

/// How long drain tasks may keep running after the child has exited
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Trait for running an external downloader
///
/// Implementations must not inspect the files they produce; locating the output
/// is the resolver's job.
#[async_trait]
pub trait DownloadInvoker: Send + Sync {
    /// Download `url` into `workspace`, giving up after `timeout`
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if the process was still running when the timeout
    ///   expired (the process has been killed)
    /// - [`Error::Download`] if the process exited unsuccessfully
    /// - [`Error::ExternalTool`] if the process could not be started or awaited
    async fn run(&self, url: &str, workspace: &Path, timeout: Duration) -> Result<()>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Downloader backed by an external executable
#[derive(Clone, Debug)]
pub struct CliDownloadInvoker {
    binary_path: PathBuf,
    format: Option<String>,
}

impl CliDownloadInvoker {
    /// Create an invoker for an explicit binary path, without a format selector
    pub fn new(binary_path: impl Into<PathBuf>) -> Self {
        Self {
            binary_path: binary_path.into(),
            format: None,
        }
    }

    /// Set the `-f` format selector passed on every run
    pub fn with_format(mut self, format: Option<String>) -> Self {
        self.format = format;
        self
    }

    /// Attempt to find `name` in PATH
    pub fn from_path(name: &str) -> Option<Self> {
        which::which(name).ok().map(Self::new)
    }

    /// Build an invoker from configuration
    ///
    /// An explicit `downloader_path` wins. Otherwise the configured name is
    /// looked up in PATH when `search_path` is set. If that lookup fails, the bare
    /// name is kept and the failure surfaces on the first run as [`Error::ExternalTool`].
    pub fn from_config(config: &Config) -> Self {
        let tools = &config.tools;
        let binary_path = match &tools.downloader_path {
            Some(path) => path.clone(),
            None if tools.search_path => {
                which::which(&tools.downloader_name).unwrap_or_else(|e| {
                    warn!(
                        name = %tools.downloader_name,
                        error = %e,
                        "downloader not found in PATH"
                    );
                    PathBuf::from(&tools.downloader_name)
                })
            }
            None => PathBuf::from(&tools.downloader_name),
        };
        Self::new(binary_path).with_format(config.download.format.clone())
    }

    /// Path of the executable this invoker runs
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Argument list for one run
    ///
    /// The URL is always the last argument, after `--`, and is never
    /// interpreted by a shell.
    pub(crate) fn arguments(&self, url: &str, workspace: &Path) -> Vec<std::ffi::OsString> {
        let mut args = Vec::with_capacity(6);
        if let Some(format) = &self.format {
            args.push("-f".into());
            args.push(format.into());
        }
        args.push("-o".into());
        args.push(workspace.join(OUTPUT_TEMPLATE).into_os_string());
        args.push("--".into());
        args.push(url.into());
        args
    }

    fn command(&self, url: &str, workspace: &Path) -> Command {
        let mut command = Command::new(&self.binary_path);
        command
            .args(self.arguments(url, workspace))
            .current_dir(workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so a timeout can take down helpers the tool forks
        #[cfg(unix)]
        command.process_group(0);

        command
    }
}

#[async_trait]
impl DownloadInvoker for CliDownloadInvoker {
    async fn run(&self, url: &str, workspace: &Path, timeout: Duration) -> Result<()> {
        let job = workspace
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        info!(
            job_id = %job,
            binary = ?self.binary_path,
            url = %url,
            timeout = ?timeout,
            "starting downloader"
        );

        let mut child = self.command(url, workspace).spawn().map_err(|e| {
            Error::ExternalTool(format!(
                "failed to start {}: {}",
                self.binary_path.display(),
                e
            ))
        })?;
        // Recorded now: once the child is reaped, child.id() is gone
        let group = ProcessGroup::new(child.id(), job.clone());

        let mut drains = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            drains.push(spawn_drain(stdout, job.clone(), "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            drains.push(spawn_drain(stderr, job.clone(), "stderr"));
        }

        let result = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) if status.success() => {
                debug!(job_id = %job, "downloader exited successfully");
                Ok(())
            }
            Ok(Ok(status)) => {
                warn!(job_id = %job, exit_code = ?status.code(), "downloader failed");
                Err(Error::Download {
                    exit_code: status.code(),
                })
            }
            Ok(Err(e)) => {
                terminate(&mut child, &group).await;
                Err(Error::ExternalTool(format!(
                    "failed waiting for {}: {}",
                    self.binary_path.display(),
                    e
                )))
            }
            Err(_) => {
                warn!(job_id = %job, timeout = ?timeout, "downloader timed out, killing");
                terminate(&mut child, &group).await;
                Err(Error::Timeout { timeout })
            }
        };

        // Anything still in the group outlived the downloader and is not needed
        group.kill();
        join_drains(drains, &group).await;
        result
    }

    fn name(&self) -> &'static str {
        "cli-downloader"
    }
}

/// Forward one output stream to the log until EOF or a read error
///
/// Lines are split on raw bytes and decoded lossily, so non-UTF-8 output never
/// stops the loop early. Returns the number of lines read.
fn spawn_drain<R>(reader: R, job: String, stream: &'static str) -> JoinHandle<u64>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::with_capacity(256);
        let mut lines = 0u64;
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    lines += 1;
                    let line = String::from_utf8_lossy(&buf);
                    debug!(job_id = %job, stream, "{}", line.trim_end());
                }
                Err(e) => {
                    warn!(job_id = %job, stream, error = %e, "failed to read downloader output");
                    break;
                }
            }
        }
        lines
    })
}

/// Wait for both drain tasks, aborting whatever is left once the grace period ends
async fn join_drains(drains: Vec<JoinHandle<u64>>, group: &ProcessGroup) {
    let job = group.job.as_str();
    let deadline = tokio::time::Instant::now() + DRAIN_GRACE;
    for mut handle in drains {
        match tokio::time::timeout_at(deadline, &mut handle).await {
            Ok(Ok(lines)) => debug!(job_id = %job, lines, "output stream drained"),
            Ok(Err(e)) => warn!(job_id = %job, error = %e, "output drain task failed"),
            Err(_) => {
                group.kill();
                handle.abort();
                warn!(job_id = %job, "output stream still open after exit, drain aborted");
            }
        }
    }
}

/// The downloader's process group, killed when dropped
///
/// The child leads its own group (`process_group(0)`), so the group id is its
/// pid. Dropping the guard covers a cancelled run too; `kill_on_drop` alone
/// would only reach the direct child.
struct ProcessGroup {
    #[cfg_attr(not(unix), allow(dead_code))]
    pid: Option<u32>,
    job: String,
}

impl ProcessGroup {
    fn new(pid: Option<u32>, job: String) -> Self {
        Self { pid, job }
    }

    fn kill(&self) {
        #[cfg(unix)]
        {
            if let Some(pid) = self.pid {
                kill_process_group(pid, &self.job);
            }
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Kill the child and anything in its process group, then reap it
async fn terminate(child: &mut Child, group: &ProcessGroup) {
    group.kill();

    if let Err(e) = child.kill().await {
        warn!(job_id = %group.job, error = %e, "failed to kill downloader");
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32, job: &str) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) only sends a signal; the child leads its own group (process_group(0))
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        // ESRCH: every member has already exited
        if err.raw_os_error() != Some(libc::ESRCH) {
            warn!(job_id = %job, error = %err, "failed to kill downloader process group");
        }
    }
}
