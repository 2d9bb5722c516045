//! Process memory accounting read from procfs and the cgroup filesystem.
//!
//! Used memory is the resident set size of this process. The ceiling is the
//! cgroup memory limit when one is set, otherwise the machine's total memory.

use std::fs;
use std::io;

use nix::unistd::{sysconf, SysconfVar};

use crate::buffer::MIB;

const STATM: &str = "/proc/self/statm";
const MEMINFO: &str = "/proc/meminfo";
const CGROUP_V2_LIMIT: &str = "/sys/fs/cgroup/memory.max";
const CGROUP_V1_LIMIT: &str = "/sys/fs/cgroup/memory/memory.limit_in_bytes";

const FALLBACK_PAGE_SIZE: u64 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySnapshot {
    pub used_bytes: u64,
    pub max_bytes: u64,
}

impl MemorySnapshot {
    pub fn capture() -> io::Result<Self> {
        let statm = fs::read_to_string(STATM)?;
        let pages = parse_statm_resident(&statm).ok_or_else(|| invalid(STATM))?;

        Ok(Self {
            used_bytes: pages * page_size(),
            max_bytes: memory_limit()?,
        })
    }

    pub fn used_mb(&self) -> u64 {
        self.used_bytes / MIB as u64
    }

    pub fn max_mb(&self) -> u64 {
        self.max_bytes / MIB as u64
    }

    pub fn usage_percent(&self) -> f64 {
        if self.max_bytes == 0 {
            return 0.0;
        }
        self.used_bytes as f64 * 100.0 / self.max_bytes as f64
    }

    /// Usage formatted with two decimals, e.g. `"42.17"`.
    pub fn usage_percent_text(&self) -> String {
        format!("{:.2}", self.usage_percent())
    }
}

fn page_size() -> u64 {
    match sysconf(SysconfVar::PAGE_SIZE) {
        Ok(Some(size)) if size > 0 => size as u64,
        _ => FALLBACK_PAGE_SIZE,
    }
}

fn memory_limit() -> io::Result<u64> {
    let meminfo = fs::read_to_string(MEMINFO)?;
    let total = parse_meminfo_total(&meminfo).ok_or_else(|| invalid(MEMINFO))?;

    // cgroup v1 reports "no limit" as a page-aligned i64::MAX, so clamp.
    let limit = [CGROUP_V2_LIMIT, CGROUP_V1_LIMIT]
        .into_iter()
        .find_map(|path| fs::read_to_string(path).ok())
        .and_then(|raw| parse_cgroup_limit(&raw));

    Ok(limit.map_or(total, |limit| limit.min(total)))
}

fn invalid(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("unexpected format in {path}"))
}

/// Resident pages: the second field of `/proc/<pid>/statm`.
pub fn parse_statm_resident(statm: &str) -> Option<u64> {
    statm.split_whitespace().nth(1)?.parse().ok()
}

/// Bytes of a cgroup limit file, or `None` for `max` (unlimited).
pub fn parse_cgroup_limit(raw: &str) -> Option<u64> {
    match raw.trim() {
        "max" => None,
        value => value.parse().ok(),
    }
}

/// `MemTotal` from `/proc/meminfo`, in bytes.
pub fn parse_meminfo_total(meminfo: &str) -> Option<u64> {
    let line = meminfo.lines().find(|line| line.starts_with("MemTotal:"))?;
    let kib: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kib * 1024)
}
