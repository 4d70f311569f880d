//! # Supervision Events
//!
//! Typed lifecycle events emitted by the supervisory components. The
//! notification collaborator subscribes through [`EventPublisher`] and owns
//! all rendering and delivery concerns; the core only signals.

pub mod publisher;

pub use publisher::{EventPublisher, PublishedEvent};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{HealthStatus, ViolationKind};

/// Observer contract: every externally visible supervision outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SupervisionEvent {
    HeartbeatReceived {
        session_id: Uuid,
        job_class: String,
        recorded_at: DateTime<Utc>,
    },
    HeartbeatMissed {
        session_id: Uuid,
        missed_count: u32,
        expected_at: DateTime<Utc>,
    },
    HealthStatusChanged {
        session_id: Uuid,
        previous: HealthStatus,
        current: HealthStatus,
        reason: Option<String>,
    },
    ResourceViolationDetected {
        session_id: Uuid,
        kind: ViolationKind,
        limit: f64,
        actual: f64,
    },
    CircuitBreakerOpened {
        service: String,
        failure_count: u32,
        opened_at: DateTime<Utc>,
    },
    CircuitBreakerClosed {
        service: String,
    },
    CircuitBreakerHalfOpened {
        service: String,
    },
    JobMovedToDeadLetterQueue {
        session_id: Uuid,
        entry_id: Uuid,
        job_class: String,
        error_class: String,
    },
    DeploymentStarted {
        queues: Vec<String>,
    },
    DeploymentCompleted {
        queues: Vec<String>,
        waited_seconds: i64,
    },
    DeploymentTimedOut {
        queues: Vec<String>,
        remaining_sessions: Vec<Uuid>,
    },
}

impl SupervisionEvent {
    /// Stable event name for log correlation and notification routing.
    pub fn name(&self) -> &'static str {
        match self {
            SupervisionEvent::HeartbeatReceived { .. } => "heartbeat.received",
            SupervisionEvent::HeartbeatMissed { .. } => "heartbeat.missed",
            SupervisionEvent::HealthStatusChanged { .. } => "health.status_changed",
            SupervisionEvent::ResourceViolationDetected { .. } => "resource.violation_detected",
            SupervisionEvent::CircuitBreakerOpened { .. } => "circuit_breaker.opened",
            SupervisionEvent::CircuitBreakerClosed { .. } => "circuit_breaker.closed",
            SupervisionEvent::CircuitBreakerHalfOpened { .. } => "circuit_breaker.half_opened",
            SupervisionEvent::JobMovedToDeadLetterQueue { .. } => "dead_letter.job_moved",
            SupervisionEvent::DeploymentStarted { .. } => "deployment.started",
            SupervisionEvent::DeploymentCompleted { .. } => "deployment.completed",
            SupervisionEvent::DeploymentTimedOut { .. } => "deployment.timed_out",
        }
    }
}
