//! # Queue Backend Collaborator
//!
//! The queue backend itself is external; the core only needs to pause and
//! resume ingestion, count running jobs, and dispatch payloads. The
//! [`QueueFilter`] decides which queues the supervisory sweeps look at.

pub mod memory;

pub use memory::MemoryQueueBackend;

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

use crate::config::QueueFilterConfig;
use crate::error::Result;

/// Operations the core requires from whatever runs the queues.
#[async_trait]
pub trait QueueBackend: Send + Sync + fmt::Debug {
    /// Stop admitting new work on the queue; in-flight work is unaffected.
    async fn pause_queue(&self, queue: &str) -> Result<()>;

    /// Resume admitting new work on the queue.
    async fn resume_queue(&self, queue: &str) -> Result<()>;

    /// Number of jobs currently executing on the queue.
    async fn running_count(&self, queue: &str) -> Result<usize>;

    /// Enqueue a payload for execution.
    async fn dispatch(&self, queue: &str, payload: Value) -> Result<()>;
}

/// Allowlist/denylist deciding which queues are supervised.
///
/// Exclusion always wins; an empty allowlist supervises every queue that is
/// not excluded.
#[derive(Debug, Clone, Default)]
pub struct QueueFilter {
    supervised: Vec<String>,
    excluded: Vec<String>,
}

impl QueueFilter {
    pub fn new(supervised: Vec<String>, excluded: Vec<String>) -> Self {
        Self { supervised, excluded }
    }

    pub fn from_config(config: &QueueFilterConfig) -> Self {
        Self::new(config.supervised.clone(), config.excluded.clone())
    }

    pub fn should_supervise(&self, queue: &str) -> bool {
        if self.excluded.iter().any(|name| name == queue) {
            return false;
        }
        if self.supervised.is_empty() {
            return true;
        }
        self.supervised.iter().any(|name| name == queue)
    }

    pub fn supervised(&self) -> &[String] {
        &self.supervised
    }

    pub fn excluded(&self) -> &[String] {
        &self.excluded
    }
}
