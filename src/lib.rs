pub mod agent;
pub mod config;
pub mod monitor;
pub mod protocol;
pub mod util;
pub mod worker;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One sampling cycle of an agent, as published on the metrics stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSnapshot {
    pub memory_load: u8,
    pub cpu_load: u8,
    pub disk_usage: u8,
    pub requests_per_second: u64,
}

impl MetricSnapshot {
    /// Build a snapshot from an untrusted payload.
    ///
    /// Every field that is missing, negative or not a number becomes zero, so a
    /// partially broken message still updates the fields it does carry.
    pub fn from_payload(payload: &Value) -> Self {
        Self {
            memory_load: percent_field(payload, "memoryLoad"),
            cpu_load: percent_field(payload, "cpuLoad"),
            disk_usage: percent_field(payload, "diskUsage"),
            requests_per_second: count_field(payload, "requestsPerSecond"),
        }
    }
}

fn number_field(payload: &Value, key: &str) -> f64 {
    payload
        .get(key)
        .and_then(Value::as_f64)
        .filter(|value| value.is_finite() && *value > 0.0)
        .unwrap_or_default()
}

fn percent_field(payload: &Value, key: &str) -> u8 {
    number_field(payload, key).min(100.0).round() as u8
}

fn count_field(payload: &Value, key: &str) -> u64 {
    number_field(payload, key).round() as u64
}
