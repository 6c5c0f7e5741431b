use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use clap::ValueEnum;
use tracing::level_filters::LevelFilter;

use crate::agent::SystemBackend;

const AGENT_PORT: &str = "AGENT_PORT";

const DEFAULT_AGENT_PORT: u16 = 5001;

pub fn get_default_agent_port() -> u16 {
    DEFAULT_AGENT_PORT
}

pub fn get_agent_port() -> u16 {
    port_from_env(AGENT_PORT, DEFAULT_AGENT_PORT)
}

const AGENT_ADDR: &str = "AGENT_ADDR";

const DEFAULT_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0));

pub fn get_default_addr() -> IpAddr {
    DEFAULT_ADDR
}

pub fn get_agent_addr() -> IpAddr {
    addr_from_env(AGENT_ADDR)
}

const SERVER_PORT: &str = "SERVER_PORT";

const DEFAULT_SERVER_PORT: u16 = 4001;

pub fn get_server_port() -> u16 {
    port_from_env(SERVER_PORT, DEFAULT_SERVER_PORT)
}

const SERVER_ADDR: &str = "SERVER_ADDR";

pub fn get_server_addr() -> IpAddr {
    addr_from_env(SERVER_ADDR)
}

const CGROUP_ROOT: &str = "CGROUP_ROOT";

const DEFAULT_CGROUP_ROOT: &str = "/sys/fs/cgroup";

pub fn get_cgroup_root() -> PathBuf {
    std::env::var(CGROUP_ROOT).map_or_else(|_| PathBuf::from(DEFAULT_CGROUP_ROOT), PathBuf::from)
}

const SYSTEM_BACKEND: &str = "SYSTEM_BACKEND";

/// `native` or `command`, see [`SystemBackend`]
pub fn get_system_backend() -> SystemBackend {
    let backend_from_env = std::env::var(SYSTEM_BACKEND);
    backend_from_env.map_or(SystemBackend::default(), |res| {
        SystemBackend::from_str(&res, true).unwrap_or_default()
    })
}

const LOG_LEVEL: &str = "LOG_LEVEL";

pub fn get_log_level() -> LevelFilter {
    let level_from_env = std::env::var(LOG_LEVEL);
    level_from_env.map_or(LevelFilter::DEBUG, |res| {
        res.parse().unwrap_or(LevelFilter::DEBUG)
    })
}

fn port_from_env(key: &str, default: u16) -> u16 {
    let port_from_env = std::env::var(key);
    port_from_env.map_or(default, |res| res.parse().unwrap_or(default))
}

fn addr_from_env(key: &str) -> IpAddr {
    let addr_from_env = std::env::var(key);
    addr_from_env.map_or(DEFAULT_ADDR, |res| res.parse().unwrap_or(DEFAULT_ADDR))
}
