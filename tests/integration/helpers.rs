//! Helper functions for integration tests

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use fleetwatch::{
    agent::{CollectResult, CounterSource},
    config::{AgentEndpoint, DashboardConfig, FeedConfig, ServerConfig},
};

pub fn create_test_server_config(name: &str, port: u16, agent_port: u16) -> ServerConfig {
    ServerConfig {
        name: name.to_string(),
        host: "127.0.0.1".to_string(),
        port,
        agent: create_test_agent_endpoint(agent_port),
    }
}

pub fn create_test_agent_endpoint(port: u16) -> AgentEndpoint {
    AgentEndpoint {
        host: "127.0.0.1".to_string(),
        port,
    }
}

/// Dashboard on an ephemeral local port without static files
pub fn create_test_dashboard_config() -> DashboardConfig {
    DashboardConfig {
        bind: "127.0.0.1".parse().unwrap(),
        port: 0,
        static_dir: None,
        broadcast_interval_ms: 50,
    }
}

/// Fast reconnects and a short silence limit
pub fn create_test_feed_config() -> FeedConfig {
    FeedConfig {
        reconnect_delay_ms: 50,
        connect_timeout_ms: 1000,
        stale_after_ms: 300,
    }
}

/// A port nothing listens on
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub fn local_addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

/// Counter source with fixed readings and an idle CPU
pub struct StaticSource {
    pub memory_current: u64,
    pub memory_max: Option<u64>,
    pub total_memory: u64,
    pub disk_usage: u8,
}

impl Default for StaticSource {
    fn default() -> Self {
        Self {
            memory_current: 512,
            memory_max: Some(1024),
            total_memory: 4096,
            disk_usage: 42,
        }
    }
}

#[async_trait]
impl CounterSource for StaticSource {
    async fn cpu_usage_usec(&self) -> CollectResult<u64> {
        Ok(1_000_000)
    }

    async fn memory_current(&self) -> CollectResult<u64> {
        Ok(self.memory_current)
    }

    async fn memory_max(&self) -> CollectResult<Option<u64>> {
        Ok(self.memory_max)
    }

    async fn total_memory(&self) -> CollectResult<u64> {
        Ok(self.total_memory)
    }

    async fn disk_usage_pct(&self) -> CollectResult<u8> {
        Ok(self.disk_usage)
    }
}

/// Poll `check` until it holds, failing the test after `timeout`.
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while !check().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within {timeout:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
