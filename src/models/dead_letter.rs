//! # Dead Letter Entry Model
//!
//! A permanently-failed job retained for inspection and retry. Created at
//! most once per session; `retried_at` is stamped on every retry dispatch and
//! the entry itself is never deleted by a retry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub id: Uuid,
    /// Originating session, when it has not been pruned
    pub session_id: Option<Uuid>,
    pub job_class: String,
    /// Queue the job was originally dispatched on, used for retry routing
    pub queue: Option<String>,
    pub error_class: String,
    pub message: String,
    pub trace: Option<String>,
    /// Original job payload, kept for replay
    pub payload: Value,
    pub failed_at: DateTime<Utc>,
    pub retried_at: Option<DateTime<Utc>>,
}

impl DeadLetterEntry {
    pub fn was_retried(&self) -> bool {
        self.retried_at.is_some()
    }
}
