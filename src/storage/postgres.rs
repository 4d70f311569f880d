//! # Postgres Supervision Repository
//!
//! SQLx-backed implementation of the schema contract. Queries are
//! runtime-checked so the crate builds without a live database; the schema
//! below is applied idempotently by [`PgSupervisionRepository::ensure_schema`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::SupervisionRepository;
use crate::error::{OverseerError, Result};
use crate::models::{
    CircuitBreakerState, CircuitState, DeadLetterEntry, HealthRecord, HealthStatus, Heartbeat,
    JobError, ResourceViolation, SessionStatus, SupervisionSession,
};

/// Idempotent DDL for the supervision tables.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS supervised_jobs (
    id UUID PRIMARY KEY,
    job_class VARCHAR NOT NULL,
    queue VARCHAR,
    status VARCHAR NOT NULL,
    started_at TIMESTAMPTZ NOT NULL,
    last_heartbeat_at TIMESTAMPTZ,
    metadata JSONB NOT NULL DEFAULT '{}'::jsonb
);

CREATE TABLE IF NOT EXISTS heartbeats (
    id BIGSERIAL PRIMARY KEY,
    session_id UUID NOT NULL,
    recorded_at TIMESTAMPTZ NOT NULL,
    metadata JSONB NOT NULL DEFAULT '{}'::jsonb
);
CREATE INDEX IF NOT EXISTS idx_heartbeats_session ON heartbeats (session_id, recorded_at);

CREATE TABLE IF NOT EXISTS job_health_checks (
    session_id UUID PRIMARY KEY,
    status VARCHAR NOT NULL,
    reason VARCHAR,
    check_count BIGINT NOT NULL DEFAULT 0,
    first_unhealthy_at TIMESTAMPTZ,
    updated_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS resource_violations (
    id BIGSERIAL PRIMARY KEY,
    session_id UUID NOT NULL,
    kind VARCHAR NOT NULL,
    limit_value DOUBLE PRECISION NOT NULL,
    actual_value DOUBLE PRECISION NOT NULL,
    detected_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_violations_session ON resource_violations (session_id);

CREATE TABLE IF NOT EXISTS circuit_breakers (
    service VARCHAR PRIMARY KEY,
    state VARCHAR NOT NULL,
    failure_count INTEGER NOT NULL DEFAULT 0,
    success_count INTEGER NOT NULL DEFAULT 0,
    last_failure_at TIMESTAMPTZ,
    last_success_at TIMESTAMPTZ,
    opened_at TIMESTAMPTZ
);

CREATE TABLE IF NOT EXISTS dead_letter_queue (
    id UUID PRIMARY KEY,
    session_id UUID,
    job_class VARCHAR NOT NULL,
    queue VARCHAR,
    error_class VARCHAR NOT NULL,
    message TEXT NOT NULL,
    trace TEXT,
    payload JSONB NOT NULL DEFAULT '{}'::jsonb,
    failed_at TIMESTAMPTZ NOT NULL,
    retried_at TIMESTAMPTZ
);
CREATE INDEX IF NOT EXISTS idx_dlq_failed_at ON dead_letter_queue (failed_at);

CREATE TABLE IF NOT EXISTS supervised_job_errors (
    id BIGSERIAL PRIMARY KEY,
    session_id UUID NOT NULL,
    error_class VARCHAR NOT NULL,
    message TEXT NOT NULL,
    trace TEXT,
    context JSONB,
    occurred_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_job_errors_session ON supervised_job_errors (session_id);
"#;

#[derive(Debug, Clone)]
pub struct PgSupervisionRepository {
    pool: PgPool,
}

impl PgSupervisionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the supervision schema; safe to call on every startup.
    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(Debug, FromRow)]
struct SessionRow {
    id: Uuid,
    job_class: String,
    queue: Option<String>,
    status: String,
    started_at: DateTime<Utc>,
    last_heartbeat_at: Option<DateTime<Utc>>,
    metadata: serde_json::Value,
}

impl TryFrom<SessionRow> for SupervisionSession {
    type Error = OverseerError;

    fn try_from(row: SessionRow) -> Result<Self> {
        let status = SessionStatus::parse(&row.status).ok_or_else(|| {
            OverseerError::Storage(format!("unknown session status '{}'", row.status))
        })?;
        Ok(SupervisionSession {
            id: row.id,
            job_class: row.job_class,
            queue: row.queue,
            status,
            started_at: row.started_at,
            last_heartbeat_at: row.last_heartbeat_at,
            metadata: row.metadata,
        })
    }
}

#[derive(Debug, FromRow)]
struct HealthRow {
    session_id: Uuid,
    status: String,
    reason: Option<String>,
    check_count: i64,
    first_unhealthy_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<HealthRow> for HealthRecord {
    type Error = OverseerError;

    fn try_from(row: HealthRow) -> Result<Self> {
        let status = HealthStatus::parse(&row.status).ok_or_else(|| {
            OverseerError::Storage(format!("unknown health status '{}'", row.status))
        })?;
        Ok(HealthRecord {
            session_id: row.session_id,
            status,
            reason: row.reason,
            check_count: row.check_count.max(0) as u64,
            first_unhealthy_at: row.first_unhealthy_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct BreakerRow {
    service: String,
    state: String,
    failure_count: i32,
    success_count: i32,
    last_failure_at: Option<DateTime<Utc>>,
    last_success_at: Option<DateTime<Utc>>,
    opened_at: Option<DateTime<Utc>>,
}

impl TryFrom<BreakerRow> for CircuitBreakerState {
    type Error = OverseerError;

    fn try_from(row: BreakerRow) -> Result<Self> {
        let state = CircuitState::parse(&row.state).ok_or_else(|| {
            OverseerError::Storage(format!("unknown circuit state '{}'", row.state))
        })?;
        Ok(CircuitBreakerState {
            service: row.service,
            state,
            failure_count: row.failure_count.max(0) as u32,
            success_count: row.success_count.max(0) as u32,
            last_failure_at: row.last_failure_at,
            last_success_at: row.last_success_at,
            opened_at: row.opened_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct DeadLetterRow {
    id: Uuid,
    session_id: Option<Uuid>,
    job_class: String,
    queue: Option<String>,
    error_class: String,
    message: String,
    trace: Option<String>,
    payload: serde_json::Value,
    failed_at: DateTime<Utc>,
    retried_at: Option<DateTime<Utc>>,
}

impl From<DeadLetterRow> for DeadLetterEntry {
    fn from(row: DeadLetterRow) -> Self {
        DeadLetterEntry {
            id: row.id,
            session_id: row.session_id,
            job_class: row.job_class,
            queue: row.queue,
            error_class: row.error_class,
            message: row.message,
            trace: row.trace,
            payload: row.payload,
            failed_at: row.failed_at,
            retried_at: row.retried_at,
        }
    }
}

#[async_trait]
impl SupervisionRepository for PgSupervisionRepository {
    async fn upsert_session(&self, session: &SupervisionSession) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO supervised_jobs (id, job_class, queue, status, started_at, last_heartbeat_at, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                last_heartbeat_at = EXCLUDED.last_heartbeat_at,
                metadata = EXCLUDED.metadata
            "#,
        )
        .bind(session.id)
        .bind(&session.job_class)
        .bind(&session.queue)
        .bind(session.status.as_str())
        .bind(session.started_at)
        .bind(session.last_heartbeat_at)
        .bind(&session.metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_session(&self, id: Uuid) -> Result<Option<SupervisionSession>> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT id, job_class, queue, status, started_at, last_heartbeat_at, metadata \
             FROM supervised_jobs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SupervisionSession::try_from).transpose()
    }

    async fn list_sessions(&self, status: Option<SessionStatus>) -> Result<Vec<SupervisionSession>> {
        let rows = match status {
            Some(status) => {
                sqlx::query_as::<_, SessionRow>(
                    "SELECT id, job_class, queue, status, started_at, last_heartbeat_at, metadata \
                     FROM supervised_jobs WHERE status = $1 ORDER BY started_at",
                )
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, SessionRow>(
                    "SELECT id, job_class, queue, status, started_at, last_heartbeat_at, metadata \
                     FROM supervised_jobs ORDER BY started_at",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(SupervisionSession::try_from).collect()
    }

    async fn insert_heartbeat(&self, beat: &Heartbeat) -> Result<()> {
        sqlx::query(
            "INSERT INTO heartbeats (session_id, recorded_at, metadata) VALUES ($1, $2, $3)",
        )
        .bind(beat.session_id)
        .bind(beat.recorded_at)
        .bind(&beat.metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_health_record(&self, record: &HealthRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO job_health_checks (session_id, status, reason, check_count, first_unhealthy_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (session_id) DO UPDATE SET
                status = EXCLUDED.status,
                reason = EXCLUDED.reason,
                check_count = EXCLUDED.check_count,
                first_unhealthy_at = EXCLUDED.first_unhealthy_at,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(record.session_id)
        .bind(record.status.as_str())
        .bind(&record.reason)
        .bind(record.check_count as i64)
        .bind(record.first_unhealthy_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_health_records(&self, unhealthy_only: bool) -> Result<Vec<HealthRecord>> {
        let rows = if unhealthy_only {
            sqlx::query_as::<_, HealthRow>(
                "SELECT session_id, status, reason, check_count, first_unhealthy_at, updated_at \
                 FROM job_health_checks WHERE status = 'unhealthy'",
            )
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, HealthRow>(
                "SELECT session_id, status, reason, check_count, first_unhealthy_at, updated_at \
                 FROM job_health_checks",
            )
            .fetch_all(&self.pool)
            .await?
        };

        rows.into_iter().map(HealthRecord::try_from).collect()
    }

    async fn insert_violation(&self, violation: &ResourceViolation) -> Result<()> {
        sqlx::query(
            "INSERT INTO resource_violations (session_id, kind, limit_value, actual_value, detected_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(violation.session_id)
        .bind(violation.kind.as_str())
        .bind(violation.limit)
        .bind(violation.actual)
        .bind(violation.detected_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_breaker_state(&self, state: &CircuitBreakerState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO circuit_breakers (service, state, failure_count, success_count, last_failure_at, last_success_at, opened_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (service) DO UPDATE SET
                state = EXCLUDED.state,
                failure_count = EXCLUDED.failure_count,
                success_count = EXCLUDED.success_count,
                last_failure_at = EXCLUDED.last_failure_at,
                last_success_at = EXCLUDED.last_success_at,
                opened_at = EXCLUDED.opened_at
            "#,
        )
        .bind(&state.service)
        .bind(state.state.as_str())
        .bind(state.failure_count as i32)
        .bind(state.success_count as i32)
        .bind(state.last_failure_at)
        .bind(state.last_success_at)
        .bind(state.opened_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_breaker_states(&self) -> Result<Vec<CircuitBreakerState>> {
        let rows = sqlx::query_as::<_, BreakerRow>(
            "SELECT service, state, failure_count, success_count, last_failure_at, last_success_at, opened_at \
             FROM circuit_breakers ORDER BY service",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CircuitBreakerState::try_from).collect()
    }

    async fn insert_dead_letter(&self, entry: &DeadLetterEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO dead_letter_queue (id, session_id, job_class, queue, error_class, message, trace, payload, failed_at, retried_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(entry.id)
        .bind(entry.session_id)
        .bind(&entry.job_class)
        .bind(&entry.queue)
        .bind(&entry.error_class)
        .bind(&entry.message)
        .bind(&entry.trace)
        .bind(&entry.payload)
        .bind(entry.failed_at)
        .bind(entry.retried_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_dead_letter_retried(
        &self,
        entry_id: Uuid,
        retried_at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE dead_letter_queue SET retried_at = $2 WHERE id = $1")
            .bind(entry_id)
            .bind(retried_at)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(OverseerError::DeadLetterEntryNotFound(entry_id));
        }
        Ok(())
    }

    async fn prune_dead_letters(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM dead_letter_queue WHERE failed_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list_dead_letters(&self) -> Result<Vec<DeadLetterEntry>> {
        let rows = sqlx::query_as::<_, DeadLetterRow>(
            "SELECT id, session_id, job_class, queue, error_class, message, trace, payload, failed_at, retried_at \
             FROM dead_letter_queue ORDER BY failed_at",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(DeadLetterEntry::from).collect())
    }

    async fn insert_job_error(&self, error: &JobError) -> Result<()> {
        sqlx::query(
            "INSERT INTO supervised_job_errors (session_id, error_class, message, trace, context, occurred_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(error.session_id)
        .bind(&error.detail.error_class)
        .bind(&error.detail.message)
        .bind(&error.detail.trace)
        .bind(&error.detail.context)
        .bind(error.occurred_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn job_error_count(&self, session_id: Uuid) -> Result<u32> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM supervised_job_errors WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u32)
    }
}
