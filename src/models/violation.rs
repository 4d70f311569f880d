//! # Resource Violation Model
//!
//! One row per detected breach of a configured ceiling. Violations are not
//! deduplicated; every sweep that observes a breach appends a new row.
//! Rate-limiting belongs to the alerting collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which ceiling was breached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViolationKind {
    Memory,
    Cpu,
    Disk,
    Time,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::Memory => "memory",
            ViolationKind::Cpu => "cpu",
            ViolationKind::Disk => "disk",
            ViolationKind::Time => "time",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "memory" => Some(ViolationKind::Memory),
            "cpu" => Some(ViolationKind::Cpu),
            "disk" => Some(ViolationKind::Disk),
            "time" => Some(ViolationKind::Time),
            _ => None,
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded breach of a configured memory/CPU/disk/time ceiling.
///
/// Units are megabytes for memory and disk, percent for CPU, and seconds for
/// time ceilings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceViolation {
    pub session_id: Uuid,
    pub kind: ViolationKind,
    pub limit: f64,
    pub actual: f64,
    pub detected_at: DateTime<Utc>,
}
