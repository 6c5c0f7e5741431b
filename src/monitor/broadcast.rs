//! Broadcaster - Pushes the full server table to dashboards every tick
//!
//! Every heartbeat carries the complete table rather than a delta, so a
//! dashboard that connects mid-session is fully in sync after its first frame.
//! Each dashboard socket holds a receiver of the heartbeat channel; a socket
//! that fails to send drops its receiver and leaves the set.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, instrument, trace, warn};

use crate::protocol::{Envelope, HEARTBEAT, Heartbeat};

use super::record::ServerTable;

/// Serialized heartbeat frames, shared by all dashboard sockets
pub type HeartbeatSender = broadcast::Sender<Arc<str>>;

pub struct Broadcaster {
    table: Arc<ServerTable>,
    heartbeat_tx: HeartbeatSender,
    interval_duration: Duration,
}

impl Broadcaster {
    pub fn new(
        table: Arc<ServerTable>,
        heartbeat_tx: HeartbeatSender,
        interval_duration: Duration,
    ) -> Self {
        Self {
            table,
            heartbeat_tx,
            interval_duration,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    #[instrument(skip(self))]
    pub async fn run(self) {
        debug!("broadcasting heartbeat every {:?}", self.interval_duration);

        let mut ticker = interval(self.interval_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// Publish one heartbeat; returns the number of dashboards it reached.
    pub async fn tick(&self) -> usize {
        if self.heartbeat_tx.receiver_count() == 0 {
            trace!("no dashboard connected");
            return 0;
        }

        let frame = match heartbeat_frame(&self.table).await {
            Ok(frame) => frame,
            Err(e) => {
                warn!("failed to encode heartbeat: {e}");
                return 0;
            }
        };

        self.heartbeat_tx.send(frame.into()).unwrap_or_default()
    }
}

/// The full table as a `heartbeat` frame
pub async fn heartbeat_frame(table: &ServerTable) -> serde_json::Result<String> {
    let heartbeat = Heartbeat {
        servers: table.snapshot().await,
    };
    Envelope::new(HEARTBEAT, heartbeat).to_json()
}
