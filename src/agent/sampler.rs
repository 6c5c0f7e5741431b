//! Rate sampling of cumulative counters
//!
//! CPU load is a rate: the CPU time consumed between two samples divided by the
//! wall-clock time between them. Memory load is a plain ratio and keeps no
//! state between calls.

use std::time::Instant;

use tracing::{trace, warn};

use super::error::{CollectError, CollectResult};
use super::source::CounterSource;

/// Neutral value reported whenever a counter cannot be turned into a load.
pub const FALLBACK_LOAD: u8 = 20;

const USEC_PER_SEC: f64 = 1_000_000.0;

/// Baseline of the previous CPU sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuSampleState {
    pub last_usage_usec: u64,
    pub last_sample_at: Instant,
}

/// Converts cumulative CPU time into a load percentage
#[derive(Debug, Default)]
pub struct CpuSampler {
    state: Option<CpuSampleState>,
}

impl CpuSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Option<CpuSampleState> {
        self.state
    }

    /// Turn the current cumulative usage into a load in `[0, 100]`.
    ///
    /// The first sample only establishes a baseline. A sample taken at the same
    /// instant as the baseline, or a counter that went backwards (the cgroup
    /// was recreated), carries no load signal either. In every case the
    /// baseline moves to `(usage_usec, now)`.
    pub fn sample(&mut self, usage_usec: u64, now: Instant) -> u8 {
        let previous = self.state.replace(CpuSampleState {
            last_usage_usec: usage_usec,
            last_sample_at: now,
        });

        let Some(previous) = previous else {
            trace!("first cpu sample, baseline {usage_usec}us");
            return FALLBACK_LOAD;
        };

        let elapsed_secs = now
            .saturating_duration_since(previous.last_sample_at)
            .as_secs_f64();
        if elapsed_secs <= 0.0 {
            return FALLBACK_LOAD;
        }

        let Some(used_usec) = usage_usec.checked_sub(previous.last_usage_usec) else {
            warn!(
                "cpu usage counter went backwards ({} -> {usage_usec}), treating as reset",
                previous.last_usage_usec
            );
            return FALLBACK_LOAD;
        };

        let load = (used_usec as f64 / (elapsed_secs * USEC_PER_SEC)) * 100.0;
        load.clamp(0.0, 100.0).round() as u8
    }

    /// Drop the baseline, so the next sample starts over.
    pub fn reset(&mut self) {
        self.state = None;
    }
}

/// Memory usage as a share of `ceiling`.
pub fn memory_load_pct(current: u64, ceiling: u64) -> Option<u8> {
    if ceiling == 0 {
        return None;
    }

    let load = (current as f64 / ceiling as f64) * 100.0;
    Some(load.clamp(0.0, 100.0).round() as u8)
}

/// Load readings on top of a [`CounterSource`]
///
/// Every reading degrades to [`FALLBACK_LOAD`] instead of failing.
pub struct Sampler<S> {
    source: S,
    cpu: CpuSampler,
}

impl<S: CounterSource> Sampler<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cpu: CpuSampler::new(),
        }
    }

    pub async fn cpu_load(&mut self) -> u8 {
        match self.source.cpu_usage_usec().await {
            Ok(usage) => self.cpu.sample(usage, Instant::now()),
            Err(e) => {
                warn!("error reading cpu stats: {e}");
                self.cpu.reset();
                FALLBACK_LOAD
            }
        }
    }

    pub async fn memory_load(&self) -> u8 {
        match self.read_memory_load().await {
            Ok(load) => load,
            Err(e) => {
                warn!("error reading memory stats: {e}");
                FALLBACK_LOAD
            }
        }
    }

    async fn read_memory_load(&self) -> CollectResult<u8> {
        let current = self.source.memory_current().await?;

        // an unset cgroup ceiling means the whole machine is the limit
        let ceiling = match self.source.memory_max().await? {
            Some(max) => max,
            None => self.source.total_memory().await?,
        };

        memory_load_pct(current, ceiling)
            .ok_or_else(|| CollectError::Unavailable("memory ceiling is zero".to_string()))
    }

    pub async fn disk_usage(&self) -> u8 {
        match self.source.disk_usage_pct().await {
            Ok(usage) => usage.min(100),
            Err(e) => {
                warn!("error reading disk usage: {e}");
                FALLBACK_LOAD
            }
        }
    }
}
