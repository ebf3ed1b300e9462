//! Common test utilities for media-dl integration tests
//!
//! Tests install small `/bin/sh` scripts as the downloader. Each script gets
//! the same arguments the real tool would (`-f <format> -o <template> -- <url>`)
//! and runs with the job workspace as its working directory.

#![allow(dead_code)]

use media_dl::Config;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Argument parsing shared by every stub: sets `$args`, `$out_dir` and `$url`
const PARSE_ARGS: &str = r#"
args="$*"
out_dir=""
url=""
while [ $# -gt 0 ]; do
    case "$1" in
        -o) out_dir=$(dirname "$2"); shift 2 ;;
        -f) shift 2 ;;
        --) url="$2"; break ;;
        *) shift ;;
    esac
done
"#;

/// Temp dir holding a stub downloader and the download directory
pub struct Harness {
    pub temp_dir: TempDir,
    pub stub: PathBuf,
}

impl Harness {
    /// Install a stub downloader whose `body` runs after argument parsing
    pub fn new(body: &str) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let stub = temp_dir.path().join("fake-yt-dlp");
        // Write under another name and rename so no write handle is open at exec time
        let staging = temp_dir.path().join("fake-yt-dlp.tmp");
        std::fs::write(&staging, format!("#!/bin/sh\n{PARSE_ARGS}\n{body}\n")).unwrap();
        std::fs::set_permissions(&staging, std::fs::Permissions::from_mode(0o755)).unwrap();
        std::fs::rename(&staging, &stub).unwrap();
        Self { temp_dir, stub }
    }

    /// Stub that writes one file called `file_name` into the output directory
    pub fn producing(file_name: &str) -> Self {
        Self::new(&format!(
            "printf 'media for %s' \"$url\" > \"$out_dir/{file_name}\"\nexit 0"
        ))
    }

    pub fn download_dir(&self) -> PathBuf {
        self.temp_dir.path().join("downloads")
    }

    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.download.download_dir = self.download_dir();
        config.download.timeout = Duration::from_secs(30);
        config.tools.downloader_path = Some(self.stub.clone());
        config
    }
}

/// Names of all entries directly under `dir` (empty if it does not exist)
pub fn entry_names(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Read a whitespace-separated pid list the stub wrote to `path`, waiting for it to appear
pub async fn read_pids(path: &Path) -> Vec<i32> {
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    loop {
        if let Ok(text) = std::fs::read_to_string(path) {
            let pids: Vec<i32> = text
                .split_whitespace()
                .filter_map(|pid| pid.parse().ok())
                .collect();
            if !pids.is_empty() {
                return pids;
            }
        }
        assert!(
            std::time::Instant::now() < deadline,
            "{} never appeared",
            path.display()
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// True once `pid` no longer runs (reaped, or a zombie awaiting its reaper)
pub fn process_gone(pid: i32) -> bool {
    // SAFETY: signal 0 only checks that the pid exists
    if unsafe { libc::kill(pid, 0) } != 0 {
        return true;
    }
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| {
            stat.rsplit_once(')')
                .and_then(|(_, rest)| rest.split_whitespace().next().map(|s| s == "Z"))
        })
        .unwrap_or(false)
}

/// Wait up to `within` for every pid to be gone
pub async fn all_gone(pids: &[i32], within: Duration) -> bool {
    let deadline = std::time::Instant::now() + within;
    loop {
        if pids.iter().all(|&pid| process_gone(pid)) {
            return true;
        }
        if std::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
