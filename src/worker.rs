//! Load generation for the worker binary
//!
//! Each profile starts one `stress-ng` run bounded to 30 seconds. The caller
//! gets its acknowledgement right away; the run is awaited in the background.

use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, error, info};

const STRESS_BINARY: &str = "stress-ng";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadProfile {
    Memory,
    Cpu,
    Max,
}

impl LoadProfile {
    pub const ALL: [LoadProfile; 3] = [LoadProfile::Memory, LoadProfile::Cpu, LoadProfile::Max];

    /// Route the profile is served on
    pub fn path(&self) -> &'static str {
        match self {
            LoadProfile::Memory => "/memory-load",
            LoadProfile::Cpu => "/cpu-load",
            LoadProfile::Max => "/max-load",
        }
    }

    pub fn args(&self) -> &'static [&'static str] {
        match self {
            LoadProfile::Memory => &[
                "--vm",
                "1",
                "--vm-bytes",
                "300M",
                "--vm-keep",
                "--vm-hang",
                "0",
                "--timeout",
                "30s",
                "--metrics-brief",
            ],
            LoadProfile::Cpu => &[
                "--cpu",
                "1",
                "--cpu-load",
                "50",
                "--timeout",
                "30s",
                "--metrics-brief",
            ],
            LoadProfile::Max => &[
                "--cpu",
                "1",
                "--cpu-load",
                "99",
                "--vm",
                "1",
                "--vm-bytes",
                "1G",
                "--timeout",
                "30s",
                "--metrics-brief",
            ],
        }
    }

    pub fn acknowledgement(&self) -> &'static str {
        match self {
            LoadProfile::Memory => "Memory stress-ng, started for 30 seconds",
            LoadProfile::Cpu => "CPU stress-ng, started for 30 seconds",
            LoadProfile::Max => "Max stress-ng, started for 30 seconds",
        }
    }
}

/// Start a stress run for `profile` and return its acknowledgement.
///
/// A failed spawn is logged only. Must be called from within a tokio runtime.
pub fn spawn_stress(profile: LoadProfile) -> &'static str {
    spawn_with(STRESS_BINARY, profile)
}

fn spawn_with(program: &str, profile: LoadProfile) -> &'static str {
    let child = Command::new(program)
        .args(profile.args())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();

    match child {
        Ok(mut child) => {
            info!("started {program} for {profile:?} load");
            tokio::spawn(async move {
                match child.wait().await {
                    Ok(status) => debug!("{profile:?} load finished: {status}"),
                    Err(e) => error!("failed to wait for {profile:?} load: {e}"),
                }
            });
        }
        Err(e) => error!("failed to start {program} for {profile:?} load: {e}"),
    }

    profile.acknowledgement()
}
