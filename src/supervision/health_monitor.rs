//! # Health Monitor
//!
//! Combines heartbeat liveness and resource guard signals into a tri-state
//! verdict per session. Re-marking a session with an unchanged status and
//! reason is silent; `HealthStatusChanged` fires only on actual change.

use chrono::Duration;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::HeartbeatConfig;
use crate::error::{OverseerError, Result};
use crate::events::{EventPublisher, SupervisionEvent};
use crate::models::{HealthRecord, HealthStatus};
use crate::store::SupervisionStore;
use crate::supervision::resource_guard::ResourceGuard;

const NO_HEARTBEAT_REASON: &str = "no heartbeat data";
const STALE_HEARTBEAT_REASON: &str = "heartbeat is stale";

#[derive(Debug)]
pub struct HealthMonitor {
    store: Arc<SupervisionStore>,
    guard: Arc<ResourceGuard>,
    config: HeartbeatConfig,
    clock: Arc<dyn Clock>,
    events: EventPublisher,
}

impl HealthMonitor {
    pub fn new(
        store: Arc<SupervisionStore>,
        guard: Arc<ResourceGuard>,
        config: HeartbeatConfig,
        clock: Arc<dyn Clock>,
        events: EventPublisher,
    ) -> Self {
        Self {
            store,
            guard,
            config,
            clock,
            events,
        }
    }

    /// Compute and persist the verdict for one session.
    ///
    /// Rules, in order: missing heartbeat data, stale heartbeat (past the
    /// grace window of `stale_grace_multiplier` intervals), resource breach,
    /// otherwise healthy.
    pub fn perform_health_check(&self, session_id: Uuid) -> Result<HealthRecord> {
        let session = self
            .store
            .session(session_id)
            .ok_or(OverseerError::SessionNotFound(session_id))?;

        let last_beat = self
            .store
            .beat_state(session_id)
            .and_then(|state| state.last_beat_at);

        let Some(last_beat) = last_beat else {
            return self.mark_unhealthy(session_id, NO_HEARTBEAT_REASON);
        };

        let interval = session
            .metadata_u64("heartbeat_interval_seconds")
            .unwrap_or(self.config.interval_seconds);
        let grace = Duration::seconds((interval * u64::from(self.config.stale_grace_multiplier)) as i64);

        if self.clock.now() > last_beat + grace {
            return self.mark_unhealthy(session_id, STALE_HEARTBEAT_REASON);
        }

        if let Some(breach) = self.guard.first_breach(session_id)? {
            return self.mark_unhealthy(
                session_id,
                &format!("resource violation: {}", breach.kind),
            );
        }

        self.mark_healthy(session_id)
    }

    /// Persist a healthy verdict, emitting a transition event on change.
    pub fn mark_healthy(&self, session_id: Uuid) -> Result<HealthRecord> {
        self.mark(session_id, HealthStatus::Healthy, None)
    }

    /// Persist an unhealthy verdict, emitting a transition event on change.
    pub fn mark_unhealthy(&self, session_id: Uuid, reason: &str) -> Result<HealthRecord> {
        self.mark(session_id, HealthStatus::Unhealthy, Some(reason.to_string()))
    }

    pub fn health_record(&self, session_id: Uuid) -> Option<HealthRecord> {
        self.store.health_record(session_id)
    }

    pub fn health_records(&self, unhealthy_only: bool) -> Vec<HealthRecord> {
        self.store.health_records(unhealthy_only)
    }

    fn mark(
        &self,
        session_id: Uuid,
        status: HealthStatus,
        reason: Option<String>,
    ) -> Result<HealthRecord> {
        if self.store.session(session_id).is_none() {
            return Err(OverseerError::SessionNotFound(session_id));
        }

        let now = self.clock.now();
        let mut previous_status = HealthStatus::Unknown;
        let mut previous_reason = None;

        let record = self.store.update_health(session_id, now, |record| {
            previous_status = record.status;
            previous_reason = record.reason.clone();

            record.check_count += 1;
            record.status = status;
            record.reason = reason.clone();

            match status {
                HealthStatus::Unhealthy => {
                    if record.first_unhealthy_at.is_none() {
                        record.first_unhealthy_at = Some(now);
                    }
                }
                HealthStatus::Healthy => {
                    record.first_unhealthy_at = None;
                }
                HealthStatus::Unknown => {}
            }
        });

        let changed = previous_status != status || previous_reason != record.reason;
        if changed {
            debug!(
                session_id = %session_id,
                previous = %previous_status,
                current = %status,
                reason = record.reason.as_deref().unwrap_or("-"),
                "health status changed"
            );

            self.events.publish(SupervisionEvent::HealthStatusChanged {
                session_id,
                previous: previous_status,
                current: status,
                reason: record.reason.clone(),
            });
        }

        Ok(record)
    }
}
