//! Wire format shared by the agent stream and the dashboard heartbeat
//!
//! Both channels carry JSON text frames of the form
//! `{ "event": <name>, "data": <payload> }`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::monitor::record::ServerView;

/// Event emitted by an agent once per sampling cycle.
pub const MONITORING_STATS: &str = "monitoring-stats";

/// Event emitted by the monitor to dashboard clients once per broadcast cycle.
pub const HEARTBEAT: &str = "heartbeat";

/// Outgoing frame
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<'a, T> {
    pub event: &'a str,
    pub data: T,
}

impl<'a, T: Serialize> Envelope<'a, T> {
    pub fn new(event: &'a str, data: T) -> Self {
        Self { event, data }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Incoming frame with the payload left untyped
///
/// Payload decoding is up to the receiver, which lets the feed adapter accept
/// partially broken snapshots.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl IncomingFrame {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Payload of a [`HEARTBEAT`] frame: the full server table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub servers: Vec<ServerView>,
}
