//! Health probe for the mount base path.

use std::fs;
use std::path::{Path, PathBuf};

use nix::sys::statvfs::{statvfs, Statvfs};
use nix::unistd::{access, AccessFlags};
use serde::Serialize;

const PROBE_FILE: &str = ".health-check";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProbeStatus {
    Up,
    Down,
}

/// Space on the filesystem holding a mount, as reported by `statvfs`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskUsage {
    pub total_bytes: u64,
    pub used_bytes: u64,
    /// Space available to unprivileged users.
    pub free_bytes: u64,
    pub used_percent: f64,
}

impl DiskUsage {
    fn from_stat(stat: &Statvfs) -> Self {
        let fragment = stat.fragment_size() as u64;
        let total_bytes = stat.blocks() as u64 * fragment;
        let used_bytes = (stat.blocks() as u64).saturating_sub(stat.blocks_free() as u64) * fragment;
        let free_bytes = stat.blocks_available() as u64 * fragment;
        let used_percent = if total_bytes > 0 {
            used_bytes as f64 * 100.0 / total_bytes as f64
        } else {
            0.0
        };

        Self {
            total_bytes,
            used_bytes,
            free_bytes,
            used_percent,
        }
    }
}

/// Result of probing one mount path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MountHealth {
    pub status: ProbeStatus,
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk: Option<DiskUsage>,
}

impl MountHealth {
    pub fn is_healthy(&self) -> bool {
        self.status == ProbeStatus::Up
    }
}

/// Check that `path` is a usable mount: an existing, readable, writable
/// directory that can be listed and that accepts a scratch file.
///
/// Disk usage is attached whenever the filesystem can be queried, healthy or not.
pub fn check_mount(path: &Path) -> MountHealth {
    let (status, reason) = match check_access(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "mount is healthy");
            (ProbeStatus::Up, None)
        }
        Err(reason) => {
            tracing::warn!(path = %path.display(), reason = %reason, "mount is unhealthy");
            (ProbeStatus::Down, Some(reason))
        }
    };

    MountHealth {
        status,
        path: path.to_path_buf(),
        reason,
        disk: disk_usage(path),
    }
}

/// Filesystem space for `path`, or `None` when it cannot be queried.
pub fn disk_usage(path: &Path) -> Option<DiskUsage> {
    match statvfs(path) {
        Ok(stat) => Some(DiskUsage::from_stat(&stat)),
        Err(errno) => {
            tracing::error!(path = %path.display(), error = %errno, "error checking filesystem");
            None
        }
    }
}

fn check_access(path: &Path) -> Result<(), String> {
    let metadata =
        fs::metadata(path).map_err(|err| format!("mount path unavailable: {err}"))?;

    if !metadata.is_dir() {
        return Err("mount path is not a directory".to_string());
    }
    if access(path, AccessFlags::R_OK).is_err() {
        return Err("no read permission on mount".to_string());
    }
    if access(path, AccessFlags::W_OK).is_err() {
        return Err("no write permission on mount".to_string());
    }
    fs::read_dir(path).map_err(|err| format!("cannot list mount: {err}"))?;

    let probe = path.join(PROBE_FILE);
    fs::write(&probe, b"health-check")
        .and_then(|()| fs::remove_file(&probe))
        .map_err(|err| format!("cannot write to mount: {err}"))
}
