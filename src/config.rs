//! Configuration types for media-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Prefix for environment variables read by [`Config::from_env`]
pub const ENV_PREFIX: &str = "MEDIA_DL_";

/// Download behavior configuration (directories, timeouts, output handling)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Base directory holding one workspace per job (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Wall-clock limit for a single downloader run (default: 120 seconds)
    #[serde(default = "default_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Format selector passed to the downloader as `-f` (default: "mp4")
    #[serde(default = "default_format")]
    pub format: Option<String>,

    /// Maximum jobs running at once (default: 4)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_jobs: usize,

    /// File extensions accepted as downloader output, without the dot
    #[serde(default = "default_media_extensions")]
    pub media_extensions: Vec<String>,

    /// What to do when a run leaves several media files behind
    #[serde(default)]
    pub duplicate_output: DuplicateOutputPolicy,

    /// Remove a job's workspace when the job fails (default: false)
    #[serde(default)]
    pub remove_failed_workspaces: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            timeout: default_timeout(),
            format: default_format(),
            max_concurrent_jobs: default_max_concurrent(),
            media_extensions: default_media_extensions(),
            duplicate_output: DuplicateOutputPolicy::default(),
            remove_failed_workspaces: false,
        }
    }
}

/// External downloader binary configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Explicit path to the downloader executable (auto-detected if None)
    #[serde(default)]
    pub downloader_path: Option<PathBuf>,

    /// Executable name searched for when no explicit path is set (default: "yt-dlp")
    #[serde(default = "default_downloader_name")]
    pub downloader_name: String,

    /// Whether to search PATH for the downloader if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            downloader_path: None,
            downloader_name: default_downloader_name(),
            search_path: true,
        }
    }
}

/// Accepted URL schemes and hosts
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Schemes a URL may use (default: http, https)
    #[serde(default = "default_allowed_schemes")]
    pub allowed_schemes: Vec<String>,

    /// Hosts a URL may point at; a listed host also admits its subdomains.
    /// Empty means any host.
    #[serde(default)]
    pub allowed_hosts: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            allowed_schemes: default_allowed_schemes(),
            allowed_hosts: Vec::new(),
        }
    }
}

/// Workspace housekeeping
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// On startup, remove unregistered workspaces older than this (default: never)
    #[serde(default, with = "optional_duration_serde")]
    pub sweep_max_age: Option<Duration>,
}

/// Handling for a run that leaves more than one media file
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateOutputPolicy {
    /// Fail the job with an ambiguous-output fault (default)
    #[default]
    Fail,
    /// Pick the first file by name and log a warning
    FirstByName,
}

/// Main configuration for JobOrchestrator
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download behavior settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// External downloader binary
    #[serde(default)]
    pub tools: ToolsConfig,

    /// URL acceptance rules
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Workspace housekeeping
    #[serde(default)]
    pub workspace: WorkspaceConfig,
}

impl Config {
    /// Download directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }

    /// Build a configuration from `MEDIA_DL_*` environment variables over the defaults
    ///
    /// Recognized variables:
    /// - `MEDIA_DL_DOWNLOAD_DIR` - base download directory
    /// - `MEDIA_DL_DOWNLOADER` - downloader executable path
    /// - `MEDIA_DL_TIMEOUT_SECS` - per-job timeout in seconds
    /// - `MEDIA_DL_FORMAT` - format selector (empty disables `-f`)
    /// - `MEDIA_DL_MAX_CONCURRENT` - maximum concurrent jobs
    /// - `MEDIA_DL_ALLOWED_SCHEMES` - comma-separated schemes
    /// - `MEDIA_DL_ALLOWED_HOSTS` - comma-separated hosts
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Build a configuration from an explicit set of variables
    ///
    /// Variables without the `MEDIA_DL_` prefix are ignored.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut config = Config::default();

        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value: String = value.into();

            match name {
                "DOWNLOAD_DIR" => config.download.download_dir = PathBuf::from(value),
                "DOWNLOADER" => config.tools.downloader_path = Some(PathBuf::from(value)),
                "TIMEOUT_SECS" => {
                    let secs = parse_number::<u64>(key.as_ref(), &value)?;
                    config.download.timeout = Duration::from_secs(secs);
                }
                "FORMAT" => {
                    let value = value.trim();
                    config.download.format = (!value.is_empty()).then(|| value.to_string());
                }
                "MAX_CONCURRENT" => {
                    config.download.max_concurrent_jobs =
                        parse_number::<usize>(key.as_ref(), &value)?;
                }
                "ALLOWED_SCHEMES" => config.validation.allowed_schemes = split_list(&value),
                "ALLOWED_HOSTS" => config.validation.allowed_hosts = split_list(&value),
                _ => {
                    tracing::debug!(key = key.as_ref(), "ignoring unknown configuration variable");
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Check settings that would make every job fail
    pub fn validate(&self) -> Result<()> {
        if self.download.timeout.is_zero() {
            return Err(config_error("timeout must be greater than zero", "timeout"));
        }
        if self.download.max_concurrent_jobs == 0 {
            return Err(config_error(
                "max_concurrent_jobs must be at least 1",
                "max_concurrent_jobs",
            ));
        }
        if self.download.media_extensions.is_empty() {
            return Err(config_error(
                "media_extensions must not be empty",
                "media_extensions",
            ));
        }
        if self.validation.allowed_schemes.is_empty() {
            return Err(config_error(
                "allowed_schemes must not be empty",
                "allowed_schemes",
            ));
        }
        if self.tools.downloader_path.is_none() && self.tools.downloader_name.trim().is_empty() {
            return Err(config_error(
                "either downloader_path or downloader_name must be set",
                "downloader_name",
            ));
        }
        Ok(())
    }
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| Error::Config {
        message: format!("{key} must be a non-negative integer, got {value:?}"),
        key: Some(key.to_string()),
    })
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|item| item.trim().to_ascii_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}

// Default value functions
fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_format() -> Option<String> {
    Some("mp4".to_string())
}

fn default_max_concurrent() -> usize {
    4
}

fn default_media_extensions() -> Vec<String> {
    vec!["mp4".to_string(), "mkv".to_string(), "webm".to_string()]
}

fn default_downloader_name() -> String {
    "yt-dlp".to_string()
}

fn default_allowed_schemes() -> Vec<String> {
    vec!["http".to_string(), "https".to_string()]
}

fn default_true() -> bool {
    true
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
