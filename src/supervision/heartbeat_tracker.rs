//! # Heartbeat Tracker
//!
//! Records liveness signals per session and detects missed beats. A session
//! is "stuck" once its missed-beat counter reaches the configured threshold;
//! a single fresh heartbeat resets the counter. Sessions that never beat are
//! eligible for stuck detection as soon as their first expected-beat deadline
//! passes.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::HeartbeatConfig;
use crate::error::{OverseerError, Result};
use crate::events::{EventPublisher, SupervisionEvent};
use crate::models::{Heartbeat, SessionStatus};
use crate::queue::QueueFilter;
use crate::store::SupervisionStore;

/// Metadata keys carrying per-session overrides.
const INTERVAL_OVERRIDE_KEY: &str = "heartbeat_interval_seconds";
const THRESHOLD_OVERRIDE_KEY: &str = "missed_threshold";

/// One stuck session found by a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StuckReport {
    pub session_id: Uuid,
    pub job_class: String,
    pub queue: Option<String>,
    pub missed_count: u32,
    pub last_beat_at: Option<DateTime<Utc>>,
    pub expected_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct HeartbeatTracker {
    store: Arc<SupervisionStore>,
    config: HeartbeatConfig,
    filter: QueueFilter,
    clock: Arc<dyn Clock>,
    events: EventPublisher,
}

impl HeartbeatTracker {
    pub fn new(
        store: Arc<SupervisionStore>,
        config: HeartbeatConfig,
        filter: QueueFilter,
        clock: Arc<dyn Clock>,
        events: EventPublisher,
    ) -> Self {
        Self {
            store,
            config,
            filter,
            clock,
            events,
        }
    }

    /// Register a session in the active index without waiting for its first
    /// beat; idempotent.
    pub fn register_session(&self, session_id: Uuid) -> Result<()> {
        if self.store.session(session_id).is_none() {
            return Err(OverseerError::SessionNotFound(session_id));
        }
        self.store.register_beat_state(session_id, self.clock.now());
        Ok(())
    }

    /// Record a liveness signal: stores the beat, resets the missed counter,
    /// registers the session if needed, and emits `HeartbeatReceived`.
    pub fn record_heartbeat(&self, session_id: Uuid, metadata: Value) -> Result<Heartbeat> {
        let session = self
            .store
            .session(session_id)
            .ok_or(OverseerError::SessionNotFound(session_id))?;

        let beat = self
            .store
            .record_beat(Heartbeat::new(session_id, self.clock.now(), metadata));

        self.store.update_session(session_id, |session| {
            session.last_heartbeat_at = Some(beat.recorded_at);
            // A live beat revives a session previously classified stalled
            if session.status == SessionStatus::Stalled {
                session.status = SessionStatus::Running;
            }
        })?;

        debug!(
            session_id = %session_id,
            job_class = %session.job_class,
            "heartbeat recorded"
        );

        self.events.publish(SupervisionEvent::HeartbeatReceived {
            session_id,
            job_class: session.job_class,
            recorded_at: beat.recorded_at,
        });

        Ok(beat)
    }

    /// Evaluate every active session, incrementing missed counters for those
    /// past their expected-beat deadline and reporting the ones that have
    /// crossed the stuck threshold.
    pub fn sweep_for_stuck(&self) -> Vec<StuckReport> {
        let now = self.clock.now();
        let mut stuck = Vec::new();

        for session_id in self.store.active_session_ids() {
            let Some(session) = self.store.session(session_id) else {
                self.store.remove_beat_state(session_id);
                continue;
            };

            if session.status.is_terminal() {
                self.store.remove_beat_state(session_id);
                continue;
            }

            if let Some(queue) = &session.queue {
                if !self.filter.should_supervise(queue) {
                    continue;
                }
            }

            let Some(beat_state) = self.store.beat_state(session_id) else {
                continue;
            };

            let interval = session
                .metadata_u64(INTERVAL_OVERRIDE_KEY)
                .unwrap_or(self.config.interval_seconds);
            let threshold = session
                .metadata_u64(THRESHOLD_OVERRIDE_KEY)
                .map(|t| t as u32)
                .unwrap_or(self.config.missed_threshold);

            let baseline = beat_state.last_beat_at.unwrap_or(beat_state.registered_at);
            let expected_at = baseline + Duration::seconds(interval as i64);

            if now <= expected_at {
                continue;
            }

            let Some(missed_count) = self.store.increment_missed(session_id) else {
                continue;
            };

            self.events.publish(SupervisionEvent::HeartbeatMissed {
                session_id,
                missed_count,
                expected_at,
            });

            if missed_count >= threshold {
                warn!(
                    session_id = %session_id,
                    job_class = %session.job_class,
                    missed_count,
                    threshold,
                    "session is stuck"
                );

                let _ = self.store.set_session_status(session_id, SessionStatus::Stalled);

                stuck.push(StuckReport {
                    session_id,
                    job_class: session.job_class.clone(),
                    queue: session.queue.clone(),
                    missed_count,
                    last_beat_at: beat_state.last_beat_at,
                    expected_at,
                });
            }
        }

        stuck
    }

    /// Currently stuck sessions, without mutating any counters.
    pub fn list_stuck(&self) -> Vec<StuckReport> {
        let mut stuck = Vec::new();

        for session_id in self.store.active_session_ids() {
            let Some(session) = self.store.session(session_id) else {
                continue;
            };
            let Some(beat_state) = self.store.beat_state(session_id) else {
                continue;
            };

            let interval = session
                .metadata_u64(INTERVAL_OVERRIDE_KEY)
                .unwrap_or(self.config.interval_seconds);
            let threshold = session
                .metadata_u64(THRESHOLD_OVERRIDE_KEY)
                .map(|t| t as u32)
                .unwrap_or(self.config.missed_threshold);

            if beat_state.missed_count >= threshold {
                let baseline = beat_state.last_beat_at.unwrap_or(beat_state.registered_at);
                stuck.push(StuckReport {
                    session_id,
                    job_class: session.job_class.clone(),
                    queue: session.queue.clone(),
                    missed_count: beat_state.missed_count,
                    last_beat_at: beat_state.last_beat_at,
                    expected_at: baseline + Duration::seconds(interval as i64),
                });
            }
        }

        stuck
    }

    /// Drop tracking state for a session; idempotent.
    pub fn remove_session(&self, session_id: Uuid) {
        self.store.remove_beat_state(session_id);
    }

    /// Session ids currently tracked for liveness.
    pub fn active_sessions(&self) -> Vec<Uuid> {
        self.store.active_session_ids()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::SupervisionSession;
    use serde_json::json;

    fn tracker_with_clock(
        store: Arc<SupervisionStore>,
        clock: Arc<ManualClock>,
    ) -> HeartbeatTracker {
        HeartbeatTracker::new(
            store,
            HeartbeatConfig::default(),
            QueueFilter::default(),
            clock,
            EventPublisher::new(64),
        )
    }

    fn start_session(store: &SupervisionStore, clock: &ManualClock) -> Uuid {
        let session = SupervisionSession::new("Imports::Feed", None, clock.now());
        let id = session.id;
        store.insert_session(session);
        id
    }

    #[tokio::test]
    async fn three_overdue_sweeps_classify_a_session_stuck() {
        let store = Arc::new(SupervisionStore::new());
        let clock = ManualClock::starting_now();
        let tracker = tracker_with_clock(store.clone(), clock.clone());

        let id = start_session(&store, &clock);
        tracker.register_session(id).unwrap();
        tracker.record_heartbeat(id, json!({})).unwrap();

        // Scenario: interval 30s, threshold 3, sweeps at >= 90s after the beat
        clock.advance_secs(90);
        assert!(tracker.sweep_for_stuck().is_empty());
        clock.advance_secs(1);
        assert!(tracker.sweep_for_stuck().is_empty());
        clock.advance_secs(1);

        let stuck = tracker.sweep_for_stuck();
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].session_id, id);
        assert_eq!(stuck[0].missed_count, 3);
        assert_eq!(
            store.session(id).unwrap().status,
            SessionStatus::Stalled
        );
    }

    #[tokio::test]
    async fn fresh_heartbeat_resets_the_missed_counter() {
        let store = Arc::new(SupervisionStore::new());
        let clock = ManualClock::starting_now();
        let tracker = tracker_with_clock(store.clone(), clock.clone());

        let id = start_session(&store, &clock);
        tracker.record_heartbeat(id, json!({})).unwrap();

        clock.advance_secs(95);
        tracker.sweep_for_stuck();
        tracker.sweep_for_stuck();
        assert_eq!(store.beat_state(id).unwrap().missed_count, 2);

        // A beat at the second sweep prevents the stuck classification
        tracker.record_heartbeat(id, json!({"progress": 0.5})).unwrap();
        assert_eq!(store.beat_state(id).unwrap().missed_count, 0);

        clock.advance_secs(31);
        let stuck = tracker.sweep_for_stuck();
        assert!(stuck.is_empty());
        assert_eq!(store.beat_state(id).unwrap().missed_count, 1);
    }

    #[tokio::test]
    async fn sessions_without_any_beat_become_stuck_after_registration() {
        let store = Arc::new(SupervisionStore::new());
        let clock = ManualClock::starting_now();
        let tracker = tracker_with_clock(store.clone(), clock.clone());

        let id = start_session(&store, &clock);
        tracker.register_session(id).unwrap();

        clock.advance_secs(31);
        tracker.sweep_for_stuck();
        clock.advance_secs(31);
        tracker.sweep_for_stuck();
        clock.advance_secs(31);
        let stuck = tracker.sweep_for_stuck();

        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].last_beat_at, None);
    }

    #[tokio::test]
    async fn metadata_overrides_take_precedence_over_defaults() {
        let store = Arc::new(SupervisionStore::new());
        let clock = ManualClock::starting_now();
        let tracker = tracker_with_clock(store.clone(), clock.clone());

        let session = SupervisionSession::new("Exports::Hourly", None, clock.now())
            .with_metadata(json!({ "heartbeat_interval_seconds": 5, "missed_threshold": 1 }));
        let id = session.id;
        store.insert_session(session);
        tracker.register_session(id).unwrap();

        clock.advance_secs(6);
        let stuck = tracker.sweep_for_stuck();
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].missed_count, 1);
    }

    #[tokio::test]
    async fn excluded_queues_are_not_swept() {
        let store = Arc::new(SupervisionStore::new());
        let clock = ManualClock::starting_now();
        let tracker = HeartbeatTracker::new(
            store.clone(),
            HeartbeatConfig::default(),
            QueueFilter::new(vec![], vec!["low_priority".to_string()]),
            clock.clone(),
            EventPublisher::new(64),
        );

        let session =
            SupervisionSession::new("Janitor::Sweep", Some("low_priority".to_string()), clock.now());
        let id = session.id;
        store.insert_session(session);
        tracker.register_session(id).unwrap();

        clock.advance_secs(600);
        assert!(tracker.sweep_for_stuck().is_empty());
        assert_eq!(store.beat_state(id).unwrap().missed_count, 0);
    }

    #[tokio::test]
    async fn remove_session_is_idempotent() {
        let store = Arc::new(SupervisionStore::new());
        let clock = ManualClock::starting_now();
        let tracker = tracker_with_clock(store.clone(), clock.clone());

        let id = start_session(&store, &clock);
        tracker.register_session(id).unwrap();

        tracker.remove_session(id);
        tracker.remove_session(id);
        assert!(tracker.active_sessions().is_empty());
    }

    #[tokio::test]
    async fn heartbeat_for_unknown_session_is_rejected() {
        let store = Arc::new(SupervisionStore::new());
        let clock = ManualClock::starting_now();
        let tracker = tracker_with_clock(store, clock);

        let result = tracker.record_heartbeat(Uuid::new_v4(), json!({}));
        assert!(matches!(result, Err(OverseerError::SessionNotFound(_))));
    }
}
