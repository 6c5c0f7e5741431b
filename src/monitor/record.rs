//! Per-server records and the server table
//!
//! A record is split by writer: the agent feed owns [`MetricsState`], the
//! liveness prober owns [`Liveness`], and scoring owns [`HealthState`]. Each
//! part has its own lock. Scoring takes the health lock first and then reads
//! the other two, so a score and its trend entry are always computed from
//! complete writes and are appended in order.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::{MetricSnapshot, config::ServerConfig};

use super::health::{self, HealthInputs, HealthScore, ScoreTrend, StatusColor};

/// Fields written by the agent feed adapter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsState {
    pub snapshot: MetricSnapshot,
    pub agent_connected: bool,
}

/// Fields written by the liveness prober
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Liveness {
    pub latency_ms: u64,
    pub status_code: u16,
}

impl Default for Liveness {
    fn default() -> Self {
        // optimistic until the first probe answers
        Self {
            latency_ms: 0,
            status_code: 200,
        }
    }
}

#[derive(Debug, Default)]
struct HealthState {
    color: StatusColor,
    trend: ScoreTrend,
    updated_at: Option<DateTime<Utc>>,
}

/// A monitored server as sent to dashboards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerView {
    pub name: String,
    pub url: String,
    pub port: u16,
    /// Display color as hex
    pub status: String,
    pub health: StatusColor,
    pub score_trend: Vec<f64>,
    pub latency: u64,
    pub status_code: u16,
    pub cpu_load: u8,
    pub memory_load: u8,
    pub disk_usage: u8,
    pub requests_per_second: u64,
    pub agent_connected: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct ServerEntry {
    name: String,
    host: String,
    port: u16,
    metrics: RwLock<MetricsState>,
    liveness: RwLock<Liveness>,
    health: Mutex<HealthState>,
}

impl ServerEntry {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            metrics: RwLock::default(),
            liveness: RwLock::default(),
            health: Mutex::default(),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(&config.name, &config.host, config.port)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.host)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The worker's own endpoint, target of the liveness probe
    pub fn probe_url(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }

    pub async fn metrics(&self) -> MetricsState {
        *self.metrics.read().await
    }

    pub async fn liveness(&self) -> Liveness {
        *self.liveness.read().await
    }

    pub async fn color(&self) -> StatusColor {
        self.health.lock().await.color
    }

    pub async fn trend(&self) -> Vec<f64> {
        self.health.lock().await.trend.to_vec()
    }

    /// Overwrite the metric fields with a fresh snapshot and rescore.
    pub async fn apply_snapshot(&self, snapshot: MetricSnapshot) -> HealthScore {
        {
            let mut metrics = self.metrics.write().await;
            metrics.snapshot = snapshot;
            metrics.agent_connected = true;
        }
        self.rescore().await
    }

    pub async fn mark_agent_connected(&self) {
        self.metrics.write().await.agent_connected = true;
    }

    /// Flag the agent feed as down.
    ///
    /// Metric values are kept as they were; only the connection flag and the
    /// display color change. The next scoring pass replaces the color again.
    pub async fn mark_agent_unreachable(&self) {
        self.metrics.write().await.agent_connected = false;
        self.health.lock().await.color = StatusColor::AgentUnreachable;
    }

    /// Overwrite the liveness fields with a probe result and rescore.
    pub async fn record_probe(&self, latency_ms: u64, status_code: u16) -> HealthScore {
        {
            let mut liveness = self.liveness.write().await;
            liveness.latency_ms = latency_ms;
            liveness.status_code = status_code;
        }
        self.rescore().await
    }

    /// Score the current metrics and liveness, then append to the trend.
    pub async fn rescore(&self) -> HealthScore {
        let mut health = self.health.lock().await;
        let metrics = *self.metrics.read().await;
        let liveness = *self.liveness.read().await;

        let inputs = HealthInputs::new(&metrics.snapshot, liveness.latency_ms, liveness.status_code);
        let score = health::score(&inputs);

        health.color = score.color;
        health.trend.push(score.trend_value());
        health.updated_at = Some(Utc::now());

        debug!(
            "{} - score: {:.2} ({:.2}) - status: {}",
            self.name,
            score.raw,
            score.normalized,
            score.color.hex()
        );

        score
    }

    pub async fn view(&self) -> ServerView {
        let health = self.health.lock().await;
        let metrics = *self.metrics.read().await;
        let liveness = *self.liveness.read().await;

        ServerView {
            name: self.name.clone(),
            url: self.url(),
            port: self.port,
            status: health.color.hex().to_string(),
            health: health.color,
            score_trend: health.trend.to_vec(),
            latency: liveness.latency_ms,
            status_code: liveness.status_code,
            cpu_load: metrics.snapshot.cpu_load,
            memory_load: metrics.snapshot.memory_load,
            disk_usage: metrics.snapshot.disk_usage,
            requests_per_second: metrics.snapshot.requests_per_second,
            agent_connected: metrics.agent_connected,
            updated_at: health.updated_at,
        }
    }
}

/// The monitor's authoritative set of records, fixed at startup
#[derive(Debug, Default)]
pub struct ServerTable {
    entries: Vec<Arc<ServerEntry>>,
}

impl ServerTable {
    pub fn new(entries: Vec<ServerEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn from_config(servers: &[ServerConfig]) -> Self {
        Self::new(servers.iter().map(ServerEntry::from_config).collect())
    }

    pub fn entries(&self) -> &[Arc<ServerEntry>] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ServerEntry>> {
        self.entries.iter().find(|entry| entry.name() == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Views of every record, in configuration order
    pub async fn snapshot(&self) -> Vec<ServerView> {
        let mut views = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            views.push(entry.view().await);
        }
        views
    }
}
