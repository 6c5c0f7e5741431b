use std::collections::HashSet;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use tracing::trace;

/// Monitor configuration, loaded from a JSON file
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub servers: Vec<ServerConfig>,

    #[serde(default)]
    pub dashboard: DashboardConfig,

    #[serde(default)]
    pub probe: ProbeConfig,

    #[serde(default)]
    pub feed: FeedConfig,
}

/// A monitored worker and the agent running beside it
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ServerConfig {
    pub name: String,
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    pub agent: AgentEndpoint,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct AgentEndpoint {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "crate::util::get_default_agent_port")]
    pub port: u16,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct DashboardConfig {
    #[serde(default = "crate::util::get_default_addr")]
    pub bind: IpAddr,
    #[serde(default = "default_dashboard_port")]
    pub port: u16,
    /// Directory with the dashboard's static files, served at `/`
    #[serde(default = "default_static_dir")]
    pub static_dir: Option<PathBuf>,
    #[serde(default = "default_broadcast_interval_ms")]
    pub broadcast_interval_ms: u64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            bind: crate::util::get_default_addr(),
            port: default_dashboard_port(),
            static_dir: default_static_dir(),
            broadcast_interval_ms: default_broadcast_interval_ms(),
        }
    }
}

impl DashboardConfig {
    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_probe_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,
    /// Delay of the unscheduled first probe after startup
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_probe_interval(),
            timeout_secs: default_probe_timeout(),
            initial_delay_ms: default_initial_delay_ms(),
        }
    }
}

impl ProbeConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Bound on connecting to an agent, handshake included
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// An agent silent for this long is treated as gone
    #[serde(default = "default_stale_after_ms")]
    pub stale_after_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            stale_after_ms: default_stale_after_ms(),
        }
    }
}

impl FeedConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }
}

fn default_host() -> String {
    String::from("localhost")
}

fn default_dashboard_port() -> u16 {
    3000
}

fn default_static_dir() -> Option<PathBuf> {
    Some(PathBuf::from("www"))
}

fn default_broadcast_interval_ms() -> u64 {
    1000
}

fn default_probe_interval() -> u64 {
    5
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_stale_after_ms() -> u64 {
    // agents publish once per second
    5000
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.servers.is_empty() {
            anyhow::bail!("configuration lists no servers to monitor");
        }

        let mut names = HashSet::new();
        for server in &self.servers {
            if !names.insert(server.name.as_str()) {
                anyhow::bail!("server name '{}' is configured more than once", server.name);
            }
        }

        if self.probe.interval_secs == 0 || self.dashboard.broadcast_interval_ms == 0 {
            anyhow::bail!("probe and broadcast intervals must be positive");
        }

        if self.probe.timeout_secs == 0
            || self.feed.connect_timeout_ms == 0
            || self.feed.stale_after_ms == 0
        {
            anyhow::bail!("probe and feed timeouts must be positive");
        }

        Ok(())
    }
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    let config: Config =
        serde_json::from_str(content).context("Invalid configuration file provided!")?;
    config.validate()?;
    trace!("loaded config: {config:?}");
    Ok(config)
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    parse_config(&file_content)
}
