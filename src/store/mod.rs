//! # Shared Supervision Store
//!
//! Single source of truth for all cross-cutting supervision state: sessions,
//! heartbeat bookkeeping, health records, resource violations, dead letter
//! entries, and recorded job errors. Sweeps and job-originated calls mutate
//! it concurrently, so every mutation goes through an entry-level
//! read-modify-write; callers never cache values across sweeps.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::VecDeque;
use uuid::Uuid;

use crate::error::{OverseerError, Result};
use crate::models::{
    DeadLetterEntry, HealthRecord, Heartbeat, JobError, ResourceViolation, SessionStatus,
    SupervisionSession,
};

/// Bounded number of recent heartbeats kept in memory per session.
const HEARTBEAT_HISTORY_LIMIT: usize = 100;

/// Per-session heartbeat bookkeeping.
#[derive(Debug, Clone)]
pub struct BeatState {
    /// When the session entered the active index
    pub registered_at: DateTime<Utc>,
    pub last_beat_at: Option<DateTime<Utc>>,
    /// Consecutive sweeps that found the session overdue
    pub missed_count: u32,
    /// Recent beats, newest last
    pub recent: VecDeque<Heartbeat>,
}

impl BeatState {
    fn new(registered_at: DateTime<Utc>) -> Self {
        Self {
            registered_at,
            last_beat_at: None,
            missed_count: 0,
            recent: VecDeque::new(),
        }
    }
}

/// Concurrent in-memory store shared by all supervisory components.
#[derive(Debug, Default)]
pub struct SupervisionStore {
    sessions: DashMap<Uuid, SupervisionSession>,
    beats: DashMap<Uuid, BeatState>,
    health: DashMap<Uuid, HealthRecord>,
    violations: RwLock<Vec<ResourceViolation>>,
    dead_letters: DashMap<Uuid, DeadLetterEntry>,
    /// session id -> dead letter entry id, enforcing at-most-once moves
    dead_letter_index: DashMap<Uuid, Uuid>,
    job_errors: DashMap<Uuid, Vec<JobError>>,
}

impl SupervisionStore {
    pub fn new() -> Self {
        Self::default()
    }

    // --- sessions ---

    pub fn insert_session(&self, session: SupervisionSession) {
        self.sessions.insert(session.id, session);
    }

    pub fn session(&self, id: Uuid) -> Option<SupervisionSession> {
        self.sessions.get(&id).map(|entry| entry.clone())
    }

    pub fn sessions(&self) -> Vec<SupervisionSession> {
        self.sessions.iter().map(|entry| entry.clone()).collect()
    }

    /// Atomically mutate a session and return the updated copy.
    pub fn update_session<F>(&self, id: Uuid, mutate: F) -> Result<SupervisionSession>
    where
        F: FnOnce(&mut SupervisionSession),
    {
        let mut entry = self
            .sessions
            .get_mut(&id)
            .ok_or(OverseerError::SessionNotFound(id))?;
        mutate(&mut entry);
        Ok(entry.clone())
    }

    /// Transition a session's status. Terminal sessions are left untouched.
    pub fn set_session_status(&self, id: Uuid, status: SessionStatus) -> Result<SupervisionSession> {
        self.update_session(id, |session| {
            if !session.status.is_terminal() {
                session.status = status;
            }
        })
    }

    pub fn remove_session(&self, id: Uuid) {
        self.sessions.remove(&id);
    }

    /// Running (or stalled) sessions dispatched on any of the given queues.
    pub fn running_sessions_on(&self, queues: &[String]) -> Vec<SupervisionSession> {
        self.sessions
            .iter()
            .filter(|entry| entry.is_running())
            .filter(|entry| {
                entry
                    .queue
                    .as_ref()
                    .map(|queue| queues.contains(queue))
                    .unwrap_or(false)
            })
            .map(|entry| entry.clone())
            .collect()
    }

    // --- heartbeat bookkeeping ---

    /// Register a session in the active index; idempotent.
    pub fn register_beat_state(&self, id: Uuid, now: DateTime<Utc>) {
        self.beats.entry(id).or_insert_with(|| BeatState::new(now));
    }

    pub fn beat_state(&self, id: Uuid) -> Option<BeatState> {
        self.beats.get(&id).map(|entry| entry.clone())
    }

    /// Record a beat: stores the timestamp and metadata, resets the missed
    /// counter, and registers the session if it was not yet tracked.
    /// Timestamps are kept monotonically non-decreasing.
    pub fn record_beat(&self, beat: Heartbeat) -> Heartbeat {
        let mut entry = self
            .beats
            .entry(beat.session_id)
            .or_insert_with(|| BeatState::new(beat.recorded_at));

        let beat = match entry.last_beat_at {
            Some(last) if beat.recorded_at < last => Heartbeat { recorded_at: last, ..beat },
            _ => beat,
        };

        entry.last_beat_at = Some(beat.recorded_at);
        entry.missed_count = 0;
        entry.recent.push_back(beat.clone());
        while entry.recent.len() > HEARTBEAT_HISTORY_LIMIT {
            entry.recent.pop_front();
        }
        beat
    }

    /// Increment the missed-beat counter, returning the new value.
    pub fn increment_missed(&self, id: Uuid) -> Option<u32> {
        self.beats.get_mut(&id).map(|mut entry| {
            entry.missed_count += 1;
            entry.missed_count
        })
    }

    pub fn remove_beat_state(&self, id: Uuid) {
        self.beats.remove(&id);
    }

    /// Session ids currently in the active heartbeat index.
    pub fn active_session_ids(&self) -> Vec<Uuid> {
        self.beats.iter().map(|entry| *entry.key()).collect()
    }

    pub fn recent_heartbeats(&self, id: Uuid) -> Vec<Heartbeat> {
        self.beats
            .get(&id)
            .map(|entry| entry.recent.iter().cloned().collect())
            .unwrap_or_default()
    }

    // --- health records ---

    pub fn health_record(&self, id: Uuid) -> Option<HealthRecord> {
        self.health.get(&id).map(|entry| entry.clone())
    }

    pub fn health_records(&self, unhealthy_only: bool) -> Vec<HealthRecord> {
        self.health
            .iter()
            .filter(|entry| !unhealthy_only || entry.is_unhealthy())
            .map(|entry| entry.clone())
            .collect()
    }

    /// Atomically mutate (creating if absent) a session's health record.
    pub fn update_health<F>(&self, id: Uuid, now: DateTime<Utc>, mutate: F) -> HealthRecord
    where
        F: FnOnce(&mut HealthRecord),
    {
        let mut entry = self
            .health
            .entry(id)
            .or_insert_with(|| HealthRecord::new(id, now));
        mutate(&mut entry);
        entry.updated_at = now;
        entry.clone()
    }

    pub fn remove_health_record(&self, id: Uuid) {
        self.health.remove(&id);
    }

    // --- resource violations ---

    pub fn record_violation(&self, violation: ResourceViolation) {
        self.violations.write().push(violation);
    }

    pub fn violations(&self) -> Vec<ResourceViolation> {
        self.violations.read().clone()
    }

    pub fn violations_for(&self, id: Uuid) -> Vec<ResourceViolation> {
        self.violations
            .read()
            .iter()
            .filter(|violation| violation.session_id == id)
            .cloned()
            .collect()
    }

    // --- dead letter entries ---

    /// Insert an entry unless the session already has one. Returns the live
    /// entry either way, with a flag telling the caller whether it was fresh.
    pub fn insert_dead_letter_once(
        &self,
        session_id: Uuid,
        entry: DeadLetterEntry,
    ) -> (DeadLetterEntry, bool) {
        match self.dead_letter_index.entry(session_id) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                let existing_id = *existing.get();
                drop(existing);
                let existing_entry = self
                    .dead_letters
                    .get(&existing_id)
                    .map(|e| e.clone())
                    .unwrap_or(entry);
                (existing_entry, false)
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(entry.id);
                self.dead_letters.insert(entry.id, entry.clone());
                (entry, true)
            }
        }
    }

    pub fn dead_letter(&self, entry_id: Uuid) -> Option<DeadLetterEntry> {
        self.dead_letters.get(&entry_id).map(|entry| entry.clone())
    }

    pub fn dead_letters(&self) -> Vec<DeadLetterEntry> {
        self.dead_letters.iter().map(|entry| entry.clone()).collect()
    }

    pub fn dead_letter_for_session(&self, session_id: Uuid) -> Option<DeadLetterEntry> {
        self.dead_letter_index
            .get(&session_id)
            .and_then(|entry_id| self.dead_letter(*entry_id))
    }

    pub fn update_dead_letter<F>(&self, entry_id: Uuid, mutate: F) -> Result<DeadLetterEntry>
    where
        F: FnOnce(&mut DeadLetterEntry),
    {
        let mut entry = self
            .dead_letters
            .get_mut(&entry_id)
            .ok_or(OverseerError::DeadLetterEntryNotFound(entry_id))?;
        mutate(&mut entry);
        Ok(entry.clone())
    }

    /// Delete entries older than the cutoff, returning how many were removed.
    pub fn prune_dead_letters(&self, cutoff: DateTime<Utc>) -> usize {
        let expired: Vec<DeadLetterEntry> = self
            .dead_letters
            .iter()
            .filter(|entry| entry.failed_at < cutoff)
            .map(|entry| entry.clone())
            .collect();

        for entry in &expired {
            self.dead_letters.remove(&entry.id);
            if let Some(session_id) = entry.session_id {
                self.dead_letter_index.remove(&session_id);
            }
        }
        expired.len()
    }

    // --- job errors ---

    /// Append a recorded failure and return the session's new error count.
    pub fn append_job_error(&self, error: JobError) -> u32 {
        let mut entry = self.job_errors.entry(error.session_id).or_default();
        entry.push(error);
        entry.len() as u32
    }

    pub fn error_count(&self, session_id: Uuid) -> u32 {
        self.job_errors
            .get(&session_id)
            .map(|entry| entry.len() as u32)
            .unwrap_or(0)
    }

    pub fn errors_for(&self, session_id: Uuid) -> Vec<JobError> {
        self.job_errors
            .get(&session_id)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobErrorDetail;
    use serde_json::json;

    fn session(queue: Option<&str>) -> SupervisionSession {
        SupervisionSession::new("Reports::Nightly", queue.map(String::from), Utc::now())
    }

    #[test]
    fn terminal_sessions_are_not_restatused() {
        let store = SupervisionStore::new();
        let s = session(None);
        let id = s.id;
        store.insert_session(s);

        store.set_session_status(id, SessionStatus::Completed).unwrap();
        let after = store.set_session_status(id, SessionStatus::Stalled).unwrap();
        assert_eq!(after.status, SessionStatus::Completed);
    }

    #[test]
    fn record_beat_resets_missed_count_and_keeps_monotonic_timestamps() {
        let store = SupervisionStore::new();
        let id = Uuid::new_v4();
        let now = Utc::now();

        store.register_beat_state(id, now);
        store.increment_missed(id);
        store.increment_missed(id);
        assert_eq!(store.beat_state(id).unwrap().missed_count, 2);

        store.record_beat(Heartbeat::new(id, now, json!({})));
        assert_eq!(store.beat_state(id).unwrap().missed_count, 0);

        // An out-of-order beat must not move the timestamp backwards
        let stale = now - chrono::Duration::seconds(10);
        let recorded = store.record_beat(Heartbeat::new(id, stale, json!({})));
        assert_eq!(recorded.recorded_at, now);
        assert_eq!(store.beat_state(id).unwrap().last_beat_at, Some(now));
    }

    #[test]
    fn dead_letter_moves_are_at_most_once_per_session() {
        let store = SupervisionStore::new();
        let session_id = Uuid::new_v4();
        let now = Utc::now();

        let first = DeadLetterEntry {
            id: Uuid::new_v4(),
            session_id: Some(session_id),
            job_class: "Imports::Feed".to_string(),
            queue: None,
            error_class: "Timeout".to_string(),
            message: "deadline exceeded".to_string(),
            trace: None,
            payload: json!({}),
            failed_at: now,
            retried_at: None,
        };
        let second = DeadLetterEntry {
            id: Uuid::new_v4(),
            ..first.clone()
        };

        let (entry_a, fresh_a) = store.insert_dead_letter_once(session_id, first.clone());
        let (entry_b, fresh_b) = store.insert_dead_letter_once(session_id, second);

        assert!(fresh_a);
        assert!(!fresh_b);
        assert_eq!(entry_a.id, first.id);
        assert_eq!(entry_b.id, first.id);
        assert_eq!(store.dead_letters().len(), 1);
    }

    #[test]
    fn running_sessions_on_filters_by_queue_and_status() {
        let store = SupervisionStore::new();

        let on_queue = session(Some("mailers"));
        let other_queue = session(Some("default"));
        let mut done = session(Some("mailers"));
        done.status = SessionStatus::Completed;

        let wanted = on_queue.id;
        store.insert_session(on_queue);
        store.insert_session(other_queue);
        store.insert_session(done);

        let running = store.running_sessions_on(&["mailers".to_string()]);
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id, wanted);
    }

    #[test]
    fn job_error_counts_accumulate_per_session() {
        let store = SupervisionStore::new();
        let session_id = Uuid::new_v4();

        for n in 1..=3u32 {
            let count = store.append_job_error(JobError {
                session_id,
                detail: JobErrorDetail::new("RuntimeError", format!("attempt {n}")),
                occurred_at: Utc::now(),
            });
            assert_eq!(count, n);
        }
        assert_eq!(store.error_count(session_id), 3);
        assert_eq!(store.error_count(Uuid::new_v4()), 0);
    }
}
