//! # Worker Pool Supervision
//!
//! Owns a fixed-size pool of worker processes, sweeping them on a short
//! cadence: crashed workers are replaced, unhealthy workers are restarted
//! (or handed to a caller-supplied callback). Process dispatch itself stays
//! behind the [`WorkerProcess`]/[`WorkerLauncher`] traits.

pub mod process;
pub mod supervisor;

pub use process::{WorkerLauncher, WorkerProcess};
pub use supervisor::{PoolStatus, SweepSummary, WorkerPoolSupervisor};
