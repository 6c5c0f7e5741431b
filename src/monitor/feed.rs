//! AgentFeed - Subscribes to one agent's metrics stream
//!
//! ## Message Flow
//!
//! ```text
//! connect ws://agent/ws → monitoring-stats frame → ServerEntry::apply_snapshot (rescore)
//!     ↑                                    │
//!     └──── reconnect delay ←── disconnect / error / silence → mark agent unreachable
//! ```
//!
//! Agents publish once per second, so a connection that stays quiet past the
//! stale limit is dropped like a failed one. Connecting is bounded the same way.
//!
//! Every configured agent gets its own feed task, so one agent going down never
//! affects the others.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::{
    MetricSnapshot,
    config::{AgentEndpoint, FeedConfig},
    protocol::{IncomingFrame, MONITORING_STATS},
};

use super::{health::HealthScore, record::ServerEntry};

pub struct AgentFeed {
    entry: Arc<ServerEntry>,
    url: String,
    reconnect_delay: Duration,
    connect_timeout: Duration,
    stale_after: Duration,
}

impl AgentFeed {
    pub fn new(entry: Arc<ServerEntry>, agent: &AgentEndpoint, config: &FeedConfig) -> Self {
        Self {
            entry,
            url: format!("ws://{}:{}/ws", agent.host, agent.port),
            reconnect_delay: config.reconnect_delay(),
            connect_timeout: config.connect_timeout(),
            stale_after: config.stale_after(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Connect, consume, and reconnect forever.
    #[instrument(skip(self), fields(server = %self.entry.name()))]
    pub async fn run(self) {
        loop {
            match self.connect_once().await {
                Ok(()) => info!("agent feed {} closed", self.url),
                Err(e) => error!("agent feed {} failed: {:#}", self.url, e),
            }

            self.entry.mark_agent_unreachable().await;
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    async fn connect_once(&self) -> Result<()> {
        trace!("connecting to {}", self.url);

        let (mut stream, _) = timeout(self.connect_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| anyhow!("timed out connecting to agent at {}", self.url))?
            .with_context(|| format!("failed to connect to agent at {}", self.url))?;

        info!("agent connected: {}", self.url);
        self.entry.mark_agent_connected().await;

        loop {
            let msg = match timeout(self.stale_after, stream.next()).await {
                Ok(Some(msg)) => msg.context("agent stream error")?,
                Ok(None) => break,
                Err(_) => bail!("agent silent for {:?}", self.stale_after),
            };

            match msg {
                Message::Text(text) => {
                    self.handle_frame(&text).await;
                }
                Message::Close(_) => {
                    debug!("agent closed the stream");
                    break;
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Apply one text frame to the record.
    ///
    /// Returns the new score when the frame carried metrics.
    pub async fn handle_frame(&self, text: &str) -> Option<HealthScore> {
        let frame = match IncomingFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("dropping unreadable frame from {}: {e}", self.url);
                return None;
            }
        };

        if frame.event != MONITORING_STATS {
            trace!("ignoring '{}' event", frame.event);
            return None;
        }

        let snapshot = MetricSnapshot::from_payload(&frame.data);
        trace!("monitoring-stats from {}: {snapshot:?}", self.entry.name());

        Some(self.entry.apply_snapshot(snapshot).await)
    }
}
