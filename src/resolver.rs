//! Locating the single media file a downloader run produced

use crate::config::{DownloadConfig, DuplicateOutputPolicy};
use crate::error::{Error, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Character substituted for whitespace in resolved file names
pub const NAME_SEPARATOR: char = '_';

/// Replace every whitespace character in a file name with [`NAME_SEPARATOR`]
///
/// # Examples
///
/// ```
/// use media_dl::resolver::normalize_file_name;
///
/// assert_eq!(normalize_file_name("my video.mp4"), "my_video.mp4");
/// assert_eq!(normalize_file_name("tab\there.mkv"), "tab_here.mkv");
/// assert_eq!(normalize_file_name("plain.webm"), "plain.webm");
/// ```
#[must_use]
pub fn normalize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_whitespace() { NAME_SEPARATOR } else { c })
        .collect()
}

/// Finds and normalizes the downloader's output inside a workspace
#[derive(Clone, Debug)]
pub struct OutputResolver {
    extensions: Vec<String>,
    policy: DuplicateOutputPolicy,
}

impl OutputResolver {
    /// Create a resolver accepting `extensions` (without dots, case-insensitive)
    pub fn new<S: AsRef<str>>(extensions: &[S], policy: DuplicateOutputPolicy) -> Self {
        Self {
            extensions: extensions
                .iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            policy,
        }
    }

    /// Create a resolver from download settings
    pub fn from_config(config: &DownloadConfig) -> Self {
        Self::new(&config.media_extensions, config.duplicate_output)
    }

    /// Identify the one media file in `workspace`, renaming it if its name has whitespace
    ///
    /// Only regular files directly inside the workspace are considered.
    /// Subdirectories and symlinks are ignored.
    ///
    /// # Errors
    ///
    /// - [`Error::NoOutput`] if no file has an accepted extension
    /// - [`Error::AmbiguousOutput`] if several do and the policy is
    ///   [`DuplicateOutputPolicy::Fail`]
    /// - [`Error::Storage`] if the workspace cannot be listed or the rename fails
    pub async fn resolve(&self, workspace: &Path) -> Result<PathBuf> {
        let mut candidates = self.candidates(workspace).await?;

        let chosen = match candidates.len() {
            0 => {
                return Err(Error::NoOutput {
                    workspace: workspace.to_path_buf(),
                });
            }
            1 => candidates.remove(0),
            count => match self.policy {
                DuplicateOutputPolicy::Fail => {
                    return Err(Error::AmbiguousOutput {
                        workspace: workspace.to_path_buf(),
                        candidates,
                    });
                }
                DuplicateOutputPolicy::FirstByName => {
                    warn!(
                        ?workspace,
                        count,
                        chosen = ?candidates[0],
                        "several media files produced, keeping the first by name"
                    );
                    candidates.remove(0)
                }
            },
        };

        let normalized = normalize_in_place(&chosen).await?;
        fs::canonicalize(&normalized)
            .await
            .map_err(|e| Error::storage(&normalized, e))
    }

    /// Matching regular files, sorted by name
    async fn candidates(&self, workspace: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = fs::read_dir(workspace)
            .await
            .map_err(|e| Error::storage(workspace, e))?;

        let mut matches = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::storage(workspace, e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| Error::storage(entry.path(), e))?;
            if !file_type.is_file() {
                continue;
            }

            let path = entry.path();
            if self.is_media(&path) {
                matches.push(path);
            } else {
                debug!(?path, "ignoring non-media file in workspace");
            }
        }

        matches.sort();
        Ok(matches)
    }

    fn is_media(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.extensions.iter().any(|allowed| *allowed == ext)
            })
    }
}

/// Rename `path` within its directory so the name has no whitespace
///
/// Names that are not valid UTF-8 are left alone.
async fn normalize_in_place(path: &Path) -> Result<PathBuf> {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return Ok(path.to_path_buf());
    };
    let normalized = normalize_file_name(name);
    if normalized == name {
        return Ok(path.to_path_buf());
    }

    let target = path.with_file_name(&normalized);
    // A hard link never replaces an existing entry, unlike rename
    match fs::hard_link(path, &target).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Err(name_taken(&target)),
        Err(e) => {
            debug!(from = ?path, error = %e, "hard link unavailable, renaming instead");
            return checked_rename(path, target).await;
        }
    }

    if let Err(e) = fs::remove_file(path).await {
        if let Err(undo) = fs::remove_file(&target).await {
            warn!(path = ?target, error = %undo, "failed to remove link after aborted rename");
        }
        return Err(Error::storage(path, e));
    }
    debug!(from = ?path, to = ?target, "normalized output file name");
    Ok(target)
}

/// Rename for filesystems without hard links; the existence check is best effort
async fn checked_rename(path: &Path, target: PathBuf) -> Result<PathBuf> {
    let occupied = fs::try_exists(&target)
        .await
        .map_err(|e| Error::storage(&target, e))?;
    if occupied {
        return Err(name_taken(&target));
    }

    fs::rename(path, &target)
        .await
        .map_err(|e| Error::storage(path, e))?;
    debug!(from = ?path, to = ?target, "normalized output file name");
    Ok(target)
}

fn name_taken(target: &Path) -> Error {
    Error::storage(
        target,
        std::io::Error::new(ErrorKind::AlreadyExists, "normalized file name is already taken"),
    )
}
