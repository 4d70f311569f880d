//! # Worker Handle Model
//!
//! Bookkeeping record for one worker process, owned exclusively by its
//! [`crate::worker_pool::WorkerPoolSupervisor`]. Destroyed and replaced when
//! the worker crashes or is restarted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerStatus {
    Running,
    Stopped,
    Crashed,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Running => "running",
            WorkerStatus::Stopped => "stopped",
            WorkerStatus::Crashed => "crashed",
        }
    }
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerHandle {
    pub id: Uuid,
    pub pid: u32,
    pub status: WorkerStatus,
    pub started_at: DateTime<Utc>,
    pub last_health_check_at: Option<DateTime<Utc>>,
    pub memory_usage_bytes: u64,
}

impl WorkerHandle {
    pub fn new(id: Uuid, pid: u32, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            pid,
            status: WorkerStatus::Running,
            started_at,
            last_health_check_at: None,
            memory_usage_bytes: 0,
        }
    }
}
