//! # Supervision Session Model
//!
//! A `SupervisionSession` tracks the lifecycle of one running job instance
//! from creation to a terminal state. Heartbeats and health sweeps mutate it;
//! once `Completed` or `Failed` it never changes again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Lifecycle status of a supervised job instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
    Stalled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Stalled => "stalled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(SessionStatus::Running),
            "completed" => Some(SessionStatus::Completed),
            "failed" => Some(SessionStatus::Failed),
            "stalled" => Some(SessionStatus::Stalled),
            _ => None,
        }
    }

    /// Terminal sessions are never mutated again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The tracked lifecycle of one running job instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisionSession {
    pub id: Uuid,
    /// Job class identifier (e.g. `Billing::InvoiceSync`)
    pub job_class: String,
    /// Queue the job was dispatched on, when known
    pub queue: Option<String>,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    /// Free-form metadata (progress, pid, per-session overrides, payload)
    pub metadata: Value,
}

impl SupervisionSession {
    pub fn new(job_class: impl Into<String>, queue: Option<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_class: job_class.into(),
            queue,
            status: SessionStatus::Running,
            started_at,
            last_heartbeat_at: None,
            metadata: Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn is_running(&self) -> bool {
        matches!(self.status, SessionStatus::Running | SessionStatus::Stalled)
    }

    /// Look up a numeric override carried in session metadata.
    pub fn metadata_u64(&self, key: &str) -> Option<u64> {
        self.metadata.get(key).and_then(Value::as_u64)
    }

    /// Process id of the job, when the emitter recorded one.
    pub fn pid(&self) -> Option<u32> {
        self.metadata_u64("pid").map(|pid| pid as u32)
    }
}
