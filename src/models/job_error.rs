//! Recorded job failures. The per-session error count drives the dead letter
//! trigger once it reaches the configured retry budget.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Details of a single failure as reported by the job runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobErrorDetail {
    pub error_class: String,
    pub message: String,
    pub trace: Option<String>,
    pub context: Option<Value>,
}

impl JobErrorDetail {
    pub fn new(error_class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_class: error_class.into(),
            message: message.into(),
            trace: None,
            context: None,
        }
    }

    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }
}

/// One recorded failure of a supervised job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobError {
    pub session_id: Uuid,
    pub detail: JobErrorDetail,
    pub occurred_at: DateTime<Utc>,
}
