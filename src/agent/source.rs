//! Counter sources for the sampler
//!
//! [`CgroupSource`] reads the cgroup v2 accounting files of the container the
//! agent runs in. System-wide totals (memory size, root disk usage) go through
//! a [`SystemBackend`], which asks `sysinfo` first and falls back to spawning
//! `free`/`df` when the native query has no answer.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use sysinfo::{Disks, System};
use tokio::process::Command;
use tracing::{debug, trace};

use super::error::{CollectError, CollectResult};

static USAGE_USEC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^usage_usec (\d+)").expect("valid usage_usec pattern"));

/// Raw counters the sampler turns into percentages
#[async_trait]
pub trait CounterSource: Send + Sync {
    /// Cumulative CPU time consumed, in microseconds
    async fn cpu_usage_usec(&self) -> CollectResult<u64>;

    /// Current memory usage in bytes
    async fn memory_current(&self) -> CollectResult<u64>;

    /// Memory ceiling in bytes, `None` when no limit is set
    async fn memory_max(&self) -> CollectResult<Option<u64>>;

    /// Total system memory in bytes
    async fn total_memory(&self) -> CollectResult<u64>;

    /// Used share of the root filesystem, 0-100
    async fn disk_usage_pct(&self) -> CollectResult<u8>;
}

/// How system-wide totals are queried
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SystemBackend {
    /// `sysinfo`, with the command backend as fallback
    #[default]
    Native,

    /// `free` and `df` child processes only
    Command,
}

impl SystemBackend {
    pub async fn total_memory(self) -> CollectResult<u64> {
        if self == SystemBackend::Native {
            match native_total_memory().await {
                Ok(total) if total > 0 => return Ok(total),
                Ok(_) => debug!("sysinfo reported no memory, falling back to free"),
                Err(e) => debug!("sysinfo memory query failed ({e}), falling back to free"),
            }
        }

        let output = run_command("free", &["-b"]).await?;
        parse_free_total(&output)
    }

    pub async fn disk_usage_pct(self) -> CollectResult<u8> {
        if self == SystemBackend::Native {
            match native_disk_usage().await {
                Ok(Some(usage)) => return Ok(usage),
                Ok(None) => debug!("sysinfo found no root mount, falling back to df"),
                Err(e) => debug!("sysinfo disk query failed ({e}), falling back to df"),
            }
        }

        let output = run_command("df", &["-P", "/"]).await?;
        parse_df_usage(&output)
    }
}

/// Counters of the cgroup the agent lives in
#[derive(Debug, Clone)]
pub struct CgroupSource {
    root: PathBuf,
    system: SystemBackend,
}

impl CgroupSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            system: SystemBackend::default(),
        }
    }

    pub fn with_backend(mut self, system: SystemBackend) -> Self {
        self.system = system;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn read(&self, file: &str) -> CollectResult<String> {
        let path = self.root.join(file);
        trace!("reading {}", path.display());
        Ok(tokio::fs::read_to_string(path).await?)
    }
}

#[async_trait]
impl CounterSource for CgroupSource {
    async fn cpu_usage_usec(&self) -> CollectResult<u64> {
        parse_usage_usec(&self.read("cpu.stat").await?)
    }

    async fn memory_current(&self) -> CollectResult<u64> {
        let content = self.read("memory.current").await?;
        content
            .trim()
            .parse()
            .map_err(|_| CollectError::Parse(format!("memory.current: {:?}", content.trim())))
    }

    async fn memory_max(&self) -> CollectResult<Option<u64>> {
        parse_memory_max(&self.read("memory.max").await?)
    }

    async fn total_memory(&self) -> CollectResult<u64> {
        self.system.total_memory().await
    }

    async fn disk_usage_pct(&self) -> CollectResult<u8> {
        self.system.disk_usage_pct().await
    }
}

pub fn parse_usage_usec(cpu_stat: &str) -> CollectResult<u64> {
    let captures = USAGE_USEC
        .captures(cpu_stat)
        .ok_or_else(|| CollectError::Parse("cpu.stat has no usage_usec line".to_string()))?;

    captures[1]
        .parse()
        .map_err(|_| CollectError::Parse(format!("usage_usec out of range: {}", &captures[1])))
}

/// `max`, `0` and `-1` all mean the cgroup has no memory ceiling.
pub fn parse_memory_max(content: &str) -> CollectResult<Option<u64>> {
    let value = content.trim();
    if value == "max" {
        return Ok(None);
    }

    let limit: i64 = value
        .parse()
        .map_err(|_| CollectError::Parse(format!("memory.max: {value:?}")))?;

    Ok(u64::try_from(limit).ok().filter(|limit| *limit > 0))
}

pub fn parse_free_total(output: &str) -> CollectResult<u64> {
    output
        .lines()
        .find(|line| line.starts_with("Mem:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|total| total.parse().ok())
        .ok_or_else(|| CollectError::Command("free printed no Mem: total".to_string()))
}

pub fn parse_df_usage(output: &str) -> CollectResult<u8> {
    output
        .lines()
        .last()
        .and_then(|line| line.split_whitespace().nth(4))
        .and_then(|usage| usage.trim_end_matches('%').parse::<u8>().ok())
        .map(|usage| usage.min(100))
        .ok_or_else(|| CollectError::Command("df printed no usage column".to_string()))
}

async fn run_command(program: &str, args: &[&str]) -> CollectResult<String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| CollectError::Command(format!("{program}: {e}")))?;

    if !output.status.success() {
        return Err(CollectError::Command(format!(
            "{program} exited with {}",
            output.status
        )));
    }

    String::from_utf8(output.stdout)
        .map_err(|_| CollectError::Command(format!("{program} printed invalid UTF-8")))
}

async fn native_total_memory() -> CollectResult<u64> {
    let total = tokio::task::spawn_blocking(|| {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.total_memory()
    })
    .await?;

    Ok(total)
}

async fn native_disk_usage() -> CollectResult<Option<u8>> {
    let usage = tokio::task::spawn_blocking(|| {
        let disks = Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .find(|disk| disk.mount_point() == Path::new("/"))
            .and_then(|disk| {
                let total = disk.total_space();
                if total == 0 {
                    return None;
                }
                let used = total.saturating_sub(disk.available_space());
                Some(((used as f64 / total as f64) * 100.0).round().min(100.0) as u8)
            })
    })
    .await?;

    Ok(usage)
}
