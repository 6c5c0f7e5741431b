//! Agent side of the pipeline
//!
//! The agent runs beside a worker, turns cumulative OS counters into
//! percentages and streams one [`MetricSnapshot`](crate::MetricSnapshot) per
//! second to every connected monitor.
//!
//! ```text
//! cgroup / sysinfo ─→ Sampler ─┐
//!                              ├─→ MetricsPublisher ─→ broadcast ─→ /ws clients
//! HTTP requests ─→ RequestCounter ─┘
//! ```

pub mod counter;
pub mod error;
pub mod publisher;
pub mod sampler;
pub mod server;
pub mod source;

pub use counter::RequestCounter;
pub use error::{CollectError, CollectResult};
pub use publisher::PublisherHandle;
pub use sampler::{CpuSampler, FALLBACK_LOAD, Sampler};
pub use server::AgentState;
pub use source::{CgroupSource, CounterSource, SystemBackend};
