//! Inbound request counter, drained into a requests-per-second rate

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::trace;

const MIN_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct Window {
    count: u64,
    started_at: Instant,
}

/// Counts requests served by the agent between two drains.
///
/// Shared between the HTTP middleware (increment) and the publisher (drain)
/// through an `Arc`.
#[derive(Debug)]
pub struct RequestCounter {
    window: Mutex<Window>,
}

impl Default for RequestCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestCounter {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(started_at: Instant) -> Self {
        Self {
            window: Mutex::new(Window {
                count: 0,
                started_at,
            }),
        }
    }

    pub fn increment(&self) {
        self.lock().count += 1;
    }

    /// Requests counted in the current window, without draining.
    pub fn pending(&self) -> u64 {
        self.lock().count
    }

    pub fn drain(&self) -> u64 {
        self.drain_at(Instant::now())
    }

    /// Convert the current window into a rate and start a new one.
    ///
    /// Windows shorter than one second are not extrapolated: the call returns
    /// zero and leaves the window running.
    pub fn drain_at(&self, now: Instant) -> u64 {
        let mut window = self.lock();
        let elapsed = now.saturating_duration_since(window.started_at);
        if elapsed < MIN_WINDOW {
            return 0;
        }

        let rate = (window.count as f64 / elapsed.as_secs_f64()).round() as u64;
        trace!("drained {} requests over {elapsed:?}", window.count);

        window.count = 0;
        window.started_at = now;
        rate
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Window> {
        // the window holds plain integers, a poisoned lock is still consistent
        self.window.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
