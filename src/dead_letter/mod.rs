//! # Dead Letter Store
//!
//! Terminal-failure registry. Once a session's recorded error count reaches
//! the retry budget it is moved here exactly once, keeping the original
//! payload for replay. Entries survive retries so inspection stays possible,
//! and repeated retries of the same entry are a deliberate operational
//! escape hatch.

use chrono::Duration;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::DeadLetterConfig;
use crate::error::{OverseerError, Result};
use crate::events::{EventPublisher, SupervisionEvent};
use crate::models::{DeadLetterEntry, JobError, JobErrorDetail, SessionStatus};
use crate::queue::QueueBackend;
use crate::store::SupervisionStore;

#[derive(Debug)]
pub struct DeadLetterStore {
    store: Arc<SupervisionStore>,
    queue: Arc<dyn QueueBackend>,
    config: DeadLetterConfig,
    clock: Arc<dyn Clock>,
    events: EventPublisher,
}

impl DeadLetterStore {
    pub fn new(
        store: Arc<SupervisionStore>,
        queue: Arc<dyn QueueBackend>,
        config: DeadLetterConfig,
        clock: Arc<dyn Clock>,
        events: EventPublisher,
    ) -> Self {
        Self {
            store,
            queue,
            config,
            clock,
            events,
        }
    }

    /// Record one failure against a session and return the new error count.
    pub fn record_error(&self, session_id: Uuid, detail: JobErrorDetail) -> Result<u32> {
        if self.store.session(session_id).is_none() {
            return Err(OverseerError::SessionNotFound(session_id));
        }

        let count = self.store.append_job_error(JobError {
            session_id,
            detail,
            occurred_at: self.clock.now(),
        });

        Ok(count)
    }

    /// Whether the session has exhausted its retry budget and has not been
    /// moved yet.
    pub fn should_dead_letter(&self, session_id: Uuid) -> bool {
        self.store.error_count(session_id) >= self.config.max_retries
            && self.store.dead_letter_for_session(session_id).is_none()
    }

    /// Move a permanently-failed session to the dead letter queue.
    ///
    /// The move is at-most-once per session: a second call returns the
    /// existing entry without creating another. Calling before the retry
    /// budget is exhausted is a caller bug and is rejected.
    pub fn move_to_dead_letter(
        &self,
        session_id: Uuid,
        exception: &JobErrorDetail,
    ) -> Result<DeadLetterEntry> {
        let session = self
            .store
            .session(session_id)
            .ok_or(OverseerError::SessionNotFound(session_id))?;

        let error_count = self.store.error_count(session_id);
        if error_count < self.config.max_retries {
            return Err(OverseerError::Validation(format!(
                "session {session_id} has {error_count} recorded errors, below the retry budget of {}",
                self.config.max_retries
            )));
        }

        let payload = session
            .metadata
            .get("payload")
            .cloned()
            .unwrap_or_else(|| session.metadata.clone());

        let now = self.clock.now();
        let candidate = DeadLetterEntry {
            id: Uuid::new_v4(),
            session_id: Some(session_id),
            job_class: session.job_class.clone(),
            queue: session.queue.clone(),
            error_class: exception.error_class.clone(),
            message: exception.message.clone(),
            trace: exception.trace.clone(),
            payload,
            failed_at: now,
            retried_at: None,
        };

        let (entry, fresh) = self.store.insert_dead_letter_once(session_id, candidate);

        if fresh {
            let _ = self.store.set_session_status(session_id, SessionStatus::Failed);
            self.store.remove_beat_state(session_id);

            warn!(
                session_id = %session_id,
                job_class = %session.job_class,
                error_class = %exception.error_class,
                error_count,
                "job moved to dead letter queue"
            );

            self.events.publish(SupervisionEvent::JobMovedToDeadLetterQueue {
                session_id,
                entry_id: entry.id,
                job_class: session.job_class,
                error_class: exception.error_class.clone(),
            });
        }

        Ok(entry)
    }

    /// Re-dispatch the stored payload through the queue backend and stamp
    /// `retried_at`. The entry is kept, and retrying an already-retried
    /// entry dispatches again.
    pub async fn retry(&self, entry_id: Uuid) -> Result<DeadLetterEntry> {
        let entry = self
            .store
            .dead_letter(entry_id)
            .ok_or(OverseerError::DeadLetterEntryNotFound(entry_id))?;

        let queue_name = entry
            .queue
            .clone()
            .unwrap_or_else(|| self.config.fallback_queue.clone());

        self.queue.dispatch(&queue_name, entry.payload.clone()).await?;

        let now = self.clock.now();
        let updated = self
            .store
            .update_dead_letter(entry_id, |entry| entry.retried_at = Some(now))?;

        info!(
            entry_id = %entry_id,
            job_class = %updated.job_class,
            queue = %queue_name,
            "dead letter entry re-dispatched"
        );

        Ok(updated)
    }

    /// Delete entries whose failure is older than the retention horizon.
    /// A horizon of zero days means "never prune" and is a no-op.
    pub fn prune(&self, retention_days: u32) -> Result<usize> {
        if retention_days == 0 {
            return Ok(0);
        }

        let cutoff = self.clock.now() - Duration::days(i64::from(retention_days));
        let removed = self.store.prune_dead_letters(cutoff);

        if removed > 0 {
            info!(removed, retention_days, "pruned dead letter entries");
        }
        Ok(removed)
    }

    /// Prune with the configured retention horizon.
    pub fn prune_default(&self) -> Result<usize> {
        self.prune(self.config.retention_days)
    }

    pub fn entries(&self) -> Vec<DeadLetterEntry> {
        self.store.dead_letters()
    }

    pub fn entry(&self, entry_id: Uuid) -> Option<DeadLetterEntry> {
        self.store.dead_letter(entry_id)
    }

    pub fn entry_for_session(&self, session_id: Uuid) -> Option<DeadLetterEntry> {
        self.store.dead_letter_for_session(session_id)
    }

    pub fn error_count(&self, session_id: Uuid) -> u32 {
        self.store.error_count(session_id)
    }

    pub fn errors_for(&self, session_id: Uuid) -> Vec<JobError> {
        self.store.errors_for(session_id)
    }
}
