//! # Persistence Collaborator
//!
//! Durable storage of supervision records lives outside the core; this
//! module defines the schema contract ([`SupervisionRepository`], one method
//! family per table) and ships the Postgres implementation used in
//! production. The in-memory [`crate::store::SupervisionStore`] remains the
//! live source of truth; the repository is a write-through/inspection
//! surface.

pub mod postgres;

pub use postgres::PgSupervisionRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    CircuitBreakerState, DeadLetterEntry, HealthRecord, Heartbeat, JobError, ResourceViolation,
    SessionStatus, SupervisionSession,
};

/// Schema contract for the durable supervision tables:
/// `supervised_jobs`, `heartbeats`, `job_health_checks`,
/// `resource_violations`, `circuit_breakers`, `dead_letter_queue`, and
/// `supervised_job_errors`.
#[async_trait]
pub trait SupervisionRepository: Send + Sync {
    // supervised_jobs
    async fn upsert_session(&self, session: &SupervisionSession) -> Result<()>;
    async fn fetch_session(&self, id: Uuid) -> Result<Option<SupervisionSession>>;
    async fn list_sessions(&self, status: Option<SessionStatus>) -> Result<Vec<SupervisionSession>>;

    // heartbeats
    async fn insert_heartbeat(&self, beat: &Heartbeat) -> Result<()>;

    // job_health_checks
    async fn upsert_health_record(&self, record: &HealthRecord) -> Result<()>;
    async fn list_health_records(&self, unhealthy_only: bool) -> Result<Vec<HealthRecord>>;

    // resource_violations
    async fn insert_violation(&self, violation: &ResourceViolation) -> Result<()>;

    // circuit_breakers
    async fn upsert_breaker_state(&self, state: &CircuitBreakerState) -> Result<()>;
    async fn list_breaker_states(&self) -> Result<Vec<CircuitBreakerState>>;

    // dead_letter_queue
    async fn insert_dead_letter(&self, entry: &DeadLetterEntry) -> Result<()>;
    async fn mark_dead_letter_retried(
        &self,
        entry_id: Uuid,
        retried_at: DateTime<Utc>,
    ) -> Result<()>;
    async fn prune_dead_letters(&self, cutoff: DateTime<Utc>) -> Result<u64>;
    async fn list_dead_letters(&self) -> Result<Vec<DeadLetterEntry>>;

    // supervised_job_errors
    async fn insert_job_error(&self, error: &JobError) -> Result<()>;
    async fn job_error_count(&self, session_id: Uuid) -> Result<u32>;
}
