//! # Session Supervision
//!
//! Liveness tracking, resource ceilings, and the combined tri-state health
//! verdict, plus the periodic sweeper that drives them.

pub mod health_monitor;
pub mod heartbeat_tracker;
pub mod resource_guard;
pub mod sweeper;

pub use health_monitor::HealthMonitor;
pub use heartbeat_tracker::{HeartbeatTracker, StuckReport};
pub use resource_guard::{
    FixedSampler, LimitCheck, ResourceGuard, ResourceSample, ResourceSampler, SystemSampler,
};
pub use sweeper::{SupervisionSweeper, SweepReport};
