//! Liveness signal emitted by a supervised job. Append-only and owned by the
//! session that emitted it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub session_id: Uuid,
    pub recorded_at: DateTime<Utc>,
    /// Progress indicators and a point-in-time resource snapshot
    pub metadata: Value,
}

impl Heartbeat {
    pub fn new(session_id: Uuid, recorded_at: DateTime<Utc>, metadata: Value) -> Self {
        Self {
            session_id,
            recorded_at,
            metadata,
        }
    }
}
