//! # media-dl
//!
//! Backend library that fetches media from URLs with an external downloader
//! (yt-dlp by default) and hands out stable job identifiers for the results.
//!
//! Every submission runs as an isolated job:
//!
//! 1. **Validating** - the URL is checked against the allowed schemes and hosts
//! 2. **Provisioning** - a fresh workspace directory named after the job id is created
//! 3. **Downloading** - the downloader runs inside the workspace, bounded by a timeout
//! 4. **Resolving** - the single media file it produced is located and its name normalized
//! 5. **Registered** - the file becomes retrievable and deletable by job id
//!
//! A failure in any stage is reported with the job id and the stage it happened in.
//! Nothing is registered for a failed job.
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_dl::{Config, JobOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = JobOrchestrator::new(Config::default()).await?;
//!
//!     // Subscribe to events
//!     let mut events = orchestrator.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let id = orchestrator.submit("https://www.youtube.com/watch?v=dQw4w9WgXcQ").await?;
//!     if let Some(path) = orchestrator.lookup(&id.to_string()).await {
//!         println!("downloaded to {}", path.display());
//!     }
//!     orchestrator.delete(&id.to_string()).await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// External downloader invocation
pub mod invoker;
/// Job orchestration (decomposed into focused submodules)
pub mod orchestrator;
/// Job id to file registry
pub mod registry;
/// Output file resolution
pub mod resolver;
/// Core types and events
pub mod types;
/// URL validation
pub mod validation;
/// Per-job workspace directories
pub mod workspace;

// Re-export commonly used types
pub use config::{Config, DuplicateOutputPolicy};
pub use error::{ApiError, Error, ErrorDetail, FaultKind, Result, ToHttpStatus, ValidationError};
pub use invoker::{CliDownloadInvoker, DownloadInvoker};
pub use orchestrator::JobOrchestrator;
pub use registry::JobRegistry;
pub use resolver::OutputResolver;
pub use types::{Event, Job, JobId, Stage, Status};
pub use validation::UrlPolicy;
pub use workspace::{Workspace, WorkspaceProvisioner};

/// Wait for a termination signal, then shut the orchestrator down gracefully.
///
/// - **Unix:** listens for SIGTERM and SIGINT, falling back to whichever one
///   could be registered.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use media_dl::{Config, JobOrchestrator, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let orchestrator = JobOrchestrator::new(Config::from_env()?).await?;
///
///     // Hand clones to request handlers, then block until a signal arrives
///     run_with_shutdown(orchestrator).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(orchestrator: JobOrchestrator) -> Result<()> {
    wait_for_signal().await;
    orchestrator.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("received SIGTERM"),
                _ = sigint.recv() => tracing::info!("received SIGINT"),
            }
        }
        (Ok(mut only), Err(e)) | (Err(e), Ok(mut only)) => {
            tracing::warn!(error = %e, "could not register every signal handler");
            only.recv().await;
            tracing::info!("received termination signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "could not register signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C");
    } else {
        tracing::info!("received Ctrl+C");
    }
}
