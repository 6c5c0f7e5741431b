//! LivenessProber - Measures latency and status of each worker's endpoint
//!
//! All servers are probed concurrently on every cycle, each request bounded by
//! the probe timeout, so one slow or dead server cannot hold up the others and
//! a cycle takes about one timeout at most.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval_at};
use tracing::{debug, instrument, trace, warn};

use crate::config::ProbeConfig;

use super::record::{ServerEntry, ServerTable};

/// Latency recorded when no successful response came back.
pub const UNREACHABLE_LATENCY_MS: u64 = 9999;

/// Result of a single probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub latency_ms: u64,
    /// HTTP status, 0 when nothing answered
    pub status_code: u16,
}

impl ProbeOutcome {
    pub fn unreachable(status_code: u16) -> Self {
        Self {
            latency_ms: UNREACHABLE_LATENCY_MS,
            status_code,
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.latency_ms != UNREACHABLE_LATENCY_MS
    }
}

/// Probe one URL.
///
/// A 2xx answer yields the time until its body has been read completely. Any
/// other answer, a timeout or a refused connection yields the unreachable
/// latency, with the status code of the answer if there was one. A body that
/// fails to arrive counts as unreachable too.
pub async fn probe(client: &reqwest::Client, url: &str) -> ProbeOutcome {
    let start = Instant::now();

    match client.get(url).send().await {
        Ok(response) if response.status().is_success() => {
            let status_code = response.status().as_u16();
            match response.bytes().await {
                Ok(_) => ProbeOutcome {
                    latency_ms: start.elapsed().as_millis() as u64,
                    status_code,
                },
                Err(e) => {
                    warn!("error reading response from {url}: {e}");
                    ProbeOutcome::unreachable(status_code)
                }
            }
        }
        Ok(response) => {
            warn!("error checking {url}: HTTP {}", response.status());
            ProbeOutcome::unreachable(response.status().as_u16())
        }
        Err(e) => {
            warn!("error checking {url}: {e}");
            ProbeOutcome::unreachable(e.status().map_or(0, |status| status.as_u16()))
        }
    }
}

pub struct LivenessProber {
    table: Arc<ServerTable>,
    client: reqwest::Client,
    interval_duration: Duration,
    initial_delay: Duration,
}

impl LivenessProber {
    pub fn new(table: Arc<ServerTable>, config: &ProbeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .context("failed to build probe HTTP client")?;

        Ok(Self {
            table,
            client,
            interval_duration: config.interval(),
            initial_delay: config.initial_delay(),
        })
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// One early cycle after the initial delay, then one per interval.
    #[instrument(skip(self))]
    pub async fn run(self) {
        debug!(
            "probing {} servers every {:?}",
            self.table.len(),
            self.interval_duration
        );

        tokio::time::sleep(self.initial_delay).await;
        self.probe_all().await;

        let start = tokio::time::Instant::now() + self.interval_duration;
        let mut ticker = interval_at(start, self.interval_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.probe_all().await;
        }
    }

    /// Probe every server concurrently and record the outcomes.
    pub async fn probe_all(&self) -> Vec<ProbeOutcome> {
        trace!("starting probe cycle");
        join_all(
            self.table
                .entries()
                .iter()
                .map(|entry| self.probe_server(entry)),
        )
        .await
    }

    async fn probe_server(&self, entry: &ServerEntry) -> ProbeOutcome {
        let outcome = probe(&self.client, &entry.probe_url()).await;
        trace!("{}: {outcome:?}", entry.name());

        entry
            .record_probe(outcome.latency_ms, outcome.status_code)
            .await;
        outcome
    }
}
