//! Monitor side of the pipeline
//!
//! The monitor keeps one record per configured worker and feeds it from two
//! independent writers, then pushes the whole table to dashboards.
//!
//! ```text
//! agent /ws ─→ AgentFeed ─────┐
//!                             ├─→ ServerEntry (rescore, trend) ─→ Broadcaster ─→ dashboard /ws
//! worker / ─→ LivenessProber ─┘
//! ```

pub mod broadcast;
pub mod feed;
pub mod health;
pub mod prober;
pub mod record;
pub mod server;

pub use broadcast::{Broadcaster, HeartbeatSender};
pub use feed::AgentFeed;
pub use health::{HealthInputs, HealthScore, ScoreTrend, StatusColor};
pub use prober::{LivenessProber, ProbeOutcome};
pub use record::{ServerEntry, ServerTable, ServerView};
pub use server::DashboardState;
