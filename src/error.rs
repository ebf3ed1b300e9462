//! Error types for media-dl
//!
//! This module provides the fault taxonomy for the job lifecycle:
//! - Domain-specific error variants (validation, storage, timeout, download, output)
//! - Job context (identifier and stage) attached to every submission failure
//! - A flat [`FaultKind`] category for presentation layers
//! - HTTP status code mapping and a structured JSON error envelope

use crate::types::{JobId, Stage};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for media-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for media-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Submitted URL was rejected
    #[error("invalid URL: {0}")]
    Validation(#[from] ValidationError),

    /// Directory or file I/O failed
    #[error("storage error at {path}: {source}")]
    Storage {
        /// Path the operation was acting on
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Downloader exceeded its time budget and was killed
    #[error("downloader timed out after {timeout:?}")]
    Timeout {
        /// The configured timeout that expired
        timeout: Duration,
    },

    /// Downloader ran but exited unsuccessfully
    #[error("downloader failed with exit code {}", display_exit_code(.exit_code))]
    Download {
        /// Exit code, or `None` if the process was terminated by a signal
        exit_code: Option<i32>,
    },

    /// Downloader succeeded but left no media file in the workspace
    #[error("no media file produced in {workspace}")]
    NoOutput {
        /// Workspace that was inspected
        workspace: PathBuf,
    },

    /// Downloader left more than one media file in the workspace
    #[error("{} media files produced in {workspace}, expected one", .candidates.len())]
    AmbiguousOutput {
        /// Workspace that was inspected
        workspace: PathBuf,
        /// Every matching file, sorted by name
        candidates: Vec<PathBuf>,
    },

    /// No job registered under this identifier
    #[error("job {0} not found")]
    NotFound(String),

    /// Downloader binary could not be started
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Identifier already present in the registry
    #[error("job {0} is already registered")]
    DuplicateId(JobId),

    /// Internal consistency check failed
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// Shutdown in progress - not accepting new submissions
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download_dir")
        key: Option<String>,
    },

    /// A submission failed; carries the job context around the originating fault
    #[error("job {} failed while {stage}: {source}", display_job_id(.id))]
    Job {
        /// Job identifier, absent when the job failed before provisioning
        id: Option<JobId>,
        /// Stage the job was in
        stage: Stage,
        /// Originating fault
        #[source]
        source: Box<Error>,
    },
}

fn display_exit_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none (killed by signal)".to_string(), |c| c.to_string())
}

fn display_job_id(id: &Option<JobId>) -> String {
    id.map_or_else(|| "<unassigned>".to_string(), |id| id.to_string())
}

/// Reasons a URL is rejected before any work starts
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// URL was empty or whitespace
    #[error("URL is empty")]
    Empty,

    /// URL could not be parsed
    #[error("malformed URL {url:?}: {reason}")]
    Malformed {
        /// The rejected input
        url: String,
        /// Parser message
        reason: String,
    },

    /// Scheme is not in the accepted list
    #[error("scheme {scheme:?} is not accepted")]
    UnsupportedScheme {
        /// The rejected scheme
        scheme: String,
    },

    /// URL has no host component
    #[error("URL {url:?} has no host")]
    MissingHost {
        /// The rejected input
        url: String,
    },

    /// Host is not in the accepted list
    #[error("host {host:?} is not accepted")]
    HostNotAllowed {
        /// The rejected host
        host: String,
    },
}

/// Distinguishable failure category for callers
///
/// This is what a presentation layer should branch on. It never exposes raw
/// low-level error strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Bad input
    Validation,
    /// Directory/file I/O failure
    Storage,
    /// Downloader exceeded its timeout
    Timeout,
    /// Downloader exited unsuccessfully
    Download,
    /// No media file after a successful run
    NoOutput,
    /// Several media files after a successful run
    AmbiguousOutput,
    /// Unknown job identifier
    NotFound,
    /// Downloader could not be launched
    ExternalTool,
    /// Not accepting new jobs
    ShuttingDown,
    /// Invalid configuration
    Config,
    /// Broken internal invariant
    Internal,
}

impl Error {
    /// Build a storage error from an I/O error and the path involved
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Storage {
            path: path.into(),
            source,
        }
    }

    /// Wrap this error with job context
    pub fn in_job(self, id: Option<JobId>, stage: Stage) -> Self {
        Error::Job {
            id,
            stage,
            source: Box::new(self),
        }
    }

    /// The failure category, looking through job context
    pub fn kind(&self) -> FaultKind {
        match self {
            Error::Validation(_) => FaultKind::Validation,
            Error::Storage { .. } => FaultKind::Storage,
            Error::Timeout { .. } => FaultKind::Timeout,
            Error::Download { .. } => FaultKind::Download,
            Error::NoOutput { .. } => FaultKind::NoOutput,
            Error::AmbiguousOutput { .. } => FaultKind::AmbiguousOutput,
            Error::NotFound(_) => FaultKind::NotFound,
            Error::ExternalTool(_) => FaultKind::ExternalTool,
            Error::DuplicateId(_) | Error::Invariant(_) => FaultKind::Internal,
            Error::ShuttingDown => FaultKind::ShuttingDown,
            Error::Config { .. } => FaultKind::Config,
            Error::Job { source, .. } => source.kind(),
        }
    }

    /// The originating fault with any job context stripped
    pub fn root(&self) -> &Error {
        match self {
            Error::Job { source, .. } => source.root(),
            other => other,
        }
    }

    /// Job identifier from the context, if any
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            Error::Job { id, .. } => *id,
            _ => None,
        }
    }

    /// Stage from the context, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Job { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// API error response format
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "download_failed",
///     "message": "job 6f1c... failed while downloading: downloader failed with exit code 1",
///     "details": {
///       "job_id": "6f1c...",
///       "stage": "downloading",
///       "exit_code": 1
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "validation_error")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self.kind() {
            FaultKind::Validation => 400,
            FaultKind::NotFound => 404,
            FaultKind::NoOutput | FaultKind::AmbiguousOutput => 422,
            FaultKind::Download => 502,
            FaultKind::Timeout => 504,
            FaultKind::ShuttingDown | FaultKind::ExternalTool => 503,
            FaultKind::Storage | FaultKind::Config | FaultKind::Internal => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self.kind() {
            FaultKind::Validation => "validation_error",
            FaultKind::Storage => "storage_error",
            FaultKind::Timeout => "timeout",
            FaultKind::Download => "download_failed",
            FaultKind::NoOutput => "no_output",
            FaultKind::AmbiguousOutput => "ambiguous_output",
            FaultKind::NotFound => "not_found",
            FaultKind::ExternalTool => "external_tool_error",
            FaultKind::ShuttingDown => "shutting_down",
            FaultKind::Config => "config_error",
            FaultKind::Internal => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let mut details = serde_json::Map::new();
        if let Some(id) = error.job_id() {
            details.insert("job_id".into(), serde_json::json!(id));
        }
        if let Some(stage) = error.stage() {
            details.insert("stage".into(), serde_json::json!(stage));
        }
        match error.root() {
            Error::Download { exit_code } => {
                details.insert("exit_code".into(), serde_json::json!(exit_code));
            }
            Error::Timeout { timeout } => {
                details.insert("timeout_secs".into(), serde_json::json!(timeout.as_secs()));
            }
            Error::AmbiguousOutput { candidates, .. } => {
                details.insert("candidates".into(), serde_json::json!(candidates.len()));
            }
            _ => {}
        }

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details: (!details.is_empty()).then_some(serde_json::Value::Object(details)),
            },
        }
    }
}
