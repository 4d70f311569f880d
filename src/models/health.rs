//! # Health Record Model
//!
//! One current record per session carrying the tri-state health verdict.
//! Historical transitions are published as events, not stored rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tri-state health verdict for a supervised session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "healthy" => Some(HealthStatus::Healthy),
            "unhealthy" => Some(HealthStatus::Unhealthy),
            "unknown" => Some(HealthStatus::Unknown),
            _ => None,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current health verdict for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub session_id: Uuid,
    pub status: HealthStatus,
    pub reason: Option<String>,
    /// Number of health checks performed against this session
    pub check_count: u64,
    /// Set on the first transition into `Unhealthy`, cleared when the session
    /// returns to `Healthy`
    pub first_unhealthy_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl HealthRecord {
    pub fn new(session_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            session_id,
            status: HealthStatus::Unknown,
            reason: None,
            check_count: 0,
            first_unhealthy_at: None,
            updated_at: now,
        }
    }

    pub fn is_unhealthy(&self) -> bool {
        self.status == HealthStatus::Unhealthy
    }
}
