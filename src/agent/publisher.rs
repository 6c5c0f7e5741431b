//! MetricsPublisher - Samples the host and publishes snapshots
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → Sampler (memory, cpu, disk) + RequestCounter drain → MetricSnapshot → broadcast → [monitor sockets]
//!     ↑
//!     └─── Commands (PublishNow, Shutdown)
//! ```
//!
//! The broadcast channel is a live feed: a tick without subscribers is skipped
//! and a subscriber that falls behind loses the snapshots it missed.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, instrument, trace, warn};

use crate::MetricSnapshot;

use super::counter::RequestCounter;
use super::sampler::Sampler;
use super::source::CounterSource;

/// Commands that can be sent to a [`MetricsPublisher`]
#[derive(Debug)]
pub enum PublisherCommand {
    /// Sample and publish immediately, whether or not anyone is subscribed
    PublishNow {
        respond_to: oneshot::Sender<MetricSnapshot>,
    },

    /// Stop publishing
    Shutdown,
}

pub struct MetricsPublisher<S> {
    sampler: Sampler<S>,
    requests: Arc<RequestCounter>,
    snapshot_tx: broadcast::Sender<MetricSnapshot>,
    command_rx: mpsc::Receiver<PublisherCommand>,
    interval_duration: Duration,
}

impl<S: CounterSource> MetricsPublisher<S> {
    pub fn new(
        sampler: Sampler<S>,
        requests: Arc<RequestCounter>,
        snapshot_tx: broadcast::Sender<MetricSnapshot>,
        command_rx: mpsc::Receiver<PublisherCommand>,
        interval_duration: Duration,
    ) -> Self {
        Self {
            sampler,
            requests,
            snapshot_tx,
            command_rx,
            interval_duration,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting metrics publisher");

        let mut ticker = interval(self.interval_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.snapshot_tx.receiver_count() == 0 {
                        trace!("no monitor connected, skipping tick");
                        continue;
                    }
                    self.publish().await;
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        PublisherCommand::PublishNow { respond_to } => {
                            let snapshot = self.publish().await;
                            let _ = respond_to.send(snapshot);
                        }

                        PublisherCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("metrics publisher stopped");
    }

    async fn collect(&mut self) -> MetricSnapshot {
        let memory_load = self.sampler.memory_load().await;
        let cpu_load = self.sampler.cpu_load().await;
        let disk_usage = self.sampler.disk_usage().await;
        let requests_per_second = self.requests.drain();

        MetricSnapshot {
            memory_load,
            cpu_load,
            disk_usage,
            requests_per_second,
        }
    }

    async fn publish(&mut self) -> MetricSnapshot {
        let snapshot = self.collect().await;
        trace!("{snapshot:?}");

        match self.snapshot_tx.send(snapshot) {
            Ok(num_receivers) => trace!("published snapshot to {num_receivers} monitors"),
            Err(_) => trace!("monitor went away before the snapshot was sent"),
        }

        snapshot
    }
}

/// Handle for controlling a running [`MetricsPublisher`]
#[derive(Clone)]
pub struct PublisherHandle {
    sender: mpsc::Sender<PublisherCommand>,
}

impl PublisherHandle {
    pub fn spawn<S>(
        sampler: Sampler<S>,
        requests: Arc<RequestCounter>,
        snapshot_tx: broadcast::Sender<MetricSnapshot>,
        interval_duration: Duration,
    ) -> Self
    where
        S: CounterSource + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let publisher =
            MetricsPublisher::new(sampler, requests, snapshot_tx, cmd_rx, interval_duration);

        tokio::spawn(publisher.run());

        Self { sender: cmd_tx }
    }

    pub async fn publish_now(&self) -> Result<MetricSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PublisherCommand::PublishNow { respond_to: tx })
            .await
            .context("failed to send PublishNow command")?;

        rx.await.context("failed to receive snapshot")
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(PublisherCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
