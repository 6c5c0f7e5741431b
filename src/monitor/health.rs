//! Health scoring
//!
//! A server's severity score is the sum of fixed threshold penalties over its
//! latest metrics and liveness observation. Six base checks add 1 point each
//! and six severe checks add another 0.5, so the worst possible score is 9.
//! The normalized score maps onto four colors without any hysteresis: a value
//! sitting on a boundary flips color every time it crosses it.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::MetricSnapshot;

pub const MAX_RAW_SCORE: f64 = 9.0;

/// Number of scores kept per server for the trend display.
pub const TREND_CAPACITY: usize = 100;

const LOAD_LIMIT: u8 = 80;
const LOAD_SEVERE: u8 = 95;
const LATENCY_LIMIT_MS: u64 = 200;
const LATENCY_SEVERE_MS: u64 = 1000;
const REQUESTS_LIMIT: u64 = 100;
const REQUESTS_SEVERE: u64 = 500;
const STATUS_OK: u16 = 200;
const STATUS_SERVER_ERROR: u16 = 500;

/// Display state of a server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusColor {
    Healthy,
    Warning,
    Critical,
    Failed,
    /// Not scored yet
    #[default]
    Unknown,
    /// The agent feed is down; set by the feed adapter, not by scoring
    AgentUnreachable,
}

impl StatusColor {
    pub fn from_normalized(score: f64) -> Self {
        if score <= 0.25 {
            StatusColor::Healthy
        } else if score <= 0.5 {
            StatusColor::Warning
        } else if score <= 0.75 {
            StatusColor::Critical
        } else {
            StatusColor::Failed
        }
    }

    pub fn hex(self) -> &'static str {
        match self {
            StatusColor::Healthy => "#00ff00",
            StatusColor::Warning => "#00cc00",
            StatusColor::Critical => "#ffcc00",
            StatusColor::Failed | StatusColor::AgentUnreachable => "#ff0000",
            StatusColor::Unknown => "#cccccc",
        }
    }
}

/// Everything the scorer looks at, merged from a record's metrics and liveness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthInputs {
    pub cpu_load: u8,
    pub memory_load: u8,
    pub disk_usage: u8,
    pub requests_per_second: u64,
    pub latency_ms: u64,
    pub status_code: u16,
}

impl HealthInputs {
    pub fn new(metrics: &MetricSnapshot, latency_ms: u64, status_code: u16) -> Self {
        Self {
            cpu_load: metrics.cpu_load,
            memory_load: metrics.memory_load,
            disk_usage: metrics.disk_usage,
            requests_per_second: metrics.requests_per_second,
            latency_ms,
            status_code,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthScore {
    pub raw: f64,
    pub normalized: f64,
    pub color: StatusColor,
}

impl HealthScore {
    /// Trend value: inverted so that higher is better.
    pub fn trend_value(&self) -> f64 {
        1.0 - self.normalized
    }
}

pub fn score(inputs: &HealthInputs) -> HealthScore {
    let mut raw = 0.0;

    if inputs.cpu_load > LOAD_LIMIT {
        raw += 1.0;
    }
    if inputs.memory_load > LOAD_LIMIT {
        raw += 1.0;
    }
    if inputs.latency_ms > LATENCY_LIMIT_MS {
        raw += 1.0;
    }
    if inputs.status_code != STATUS_OK {
        raw += 1.0;
    }
    if inputs.disk_usage > LOAD_LIMIT {
        raw += 1.0;
    }
    if inputs.requests_per_second > REQUESTS_LIMIT {
        raw += 1.0;
    }

    if inputs.cpu_load > LOAD_SEVERE {
        raw += 0.5;
    }
    if inputs.memory_load > LOAD_SEVERE {
        raw += 0.5;
    }
    if inputs.latency_ms > LATENCY_SEVERE_MS {
        raw += 0.5;
    }
    if inputs.status_code >= STATUS_SERVER_ERROR {
        raw += 0.5;
    }
    if inputs.disk_usage > LOAD_SEVERE {
        raw += 0.5;
    }
    if inputs.requests_per_second > REQUESTS_SEVERE {
        raw += 0.5;
    }

    let normalized = normalize(raw);

    HealthScore {
        raw,
        normalized,
        color: StatusColor::from_normalized(normalized),
    }
}

pub fn normalize(raw: f64) -> f64 {
    (raw / MAX_RAW_SCORE).clamp(0.0, 1.0)
}

/// Fixed-capacity history of trend values, oldest first
#[derive(Debug, Clone)]
pub struct ScoreTrend {
    values: VecDeque<f64>,
    capacity: usize,
}

impl Default for ScoreTrend {
    fn default() -> Self {
        Self::with_capacity(TREND_CAPACITY)
    }
}

impl ScoreTrend {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `value`, evicting the oldest entries beyond capacity.
    pub fn push(&mut self, value: f64) {
        if self.capacity == 0 {
            return;
        }
        while self.values.len() >= self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn latest(&self) -> Option<f64> {
        self.values.back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.values.iter().copied().collect()
    }
}
