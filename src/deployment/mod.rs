//! # Deployment Coordinator
//!
//! Makes it safe to redeploy: pause ingestion on the named queues, poll the
//! job registry until in-flight work completes, and optionally force logical
//! cancellation of whatever is still running at the deadline. Resuming the
//! queues is deliberately left to the caller; the coordinator's job ends
//! when the queues are safe.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::DeploymentConfig;
use crate::error::{OverseerError, Result};
use crate::events::{EventPublisher, SupervisionEvent};
use crate::models::{SessionStatus, SupervisionSession};
use crate::queue::QueueBackend;
use crate::store::SupervisionStore;

/// Invoked with the still-running sessions when the wait times out.
pub type TimeoutCallback = Arc<dyn Fn(&[SupervisionSession]) + Send + Sync>;

pub struct DeploymentCoordinator {
    store: Arc<SupervisionStore>,
    queue: Arc<dyn QueueBackend>,
    events: EventPublisher,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    queues: Vec<String>,
    wait_timeout: Duration,
    cancel_long_running: bool,
    on_timeout: Option<TimeoutCallback>,
    shutdown: Arc<Notify>,
}

impl std::fmt::Debug for DeploymentCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentCoordinator")
            .field("queues", &self.queues)
            .field("wait_timeout", &self.wait_timeout)
            .field("cancel_long_running", &self.cancel_long_running)
            .finish()
    }
}

impl DeploymentCoordinator {
    pub fn new(
        store: Arc<SupervisionStore>,
        queue: Arc<dyn QueueBackend>,
        events: EventPublisher,
        clock: Arc<dyn Clock>,
        config: &DeploymentConfig,
    ) -> Self {
        Self {
            store,
            queue,
            events,
            clock,
            poll_interval: config.poll_interval(),
            queues: Vec::new(),
            wait_timeout: Duration::from_secs(config.default_timeout_seconds),
            cancel_long_running: false,
            on_timeout: None,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Stop admitting new work on the named queues during `execute`.
    pub fn drain_queues<S: Into<String>>(mut self, names: Vec<S>) -> Self {
        self.queues = names.into_iter().map(Into::into).collect();
        self
    }

    /// Budget for in-flight work to finish before the drain is declared
    /// timed out.
    pub fn wait_for_completion(mut self, timeout_seconds: u64) -> Self {
        self.wait_timeout = Duration::from_secs(timeout_seconds);
        self
    }

    /// On timeout, mark every remaining running session failed. Cancellation
    /// is logical; no OS resources are released here.
    pub fn cancel_long_running(mut self) -> Self {
        self.cancel_long_running = true;
        self
    }

    /// Callback invoked with the still-running sessions when the wait times
    /// out, whether or not cancellation is enabled.
    pub fn on_timeout<F>(mut self, callback: F) -> Self
    where
        F: Fn(&[SupervisionSession]) + Send + Sync + 'static,
    {
        self.on_timeout = Some(Arc::new(callback));
        self
    }

    /// Override the polling cadence (tests, aggressive drains).
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Handle for aborting the drain from outside (e.g. deploy cancelled).
    pub fn cancellation_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the drain. Returns `true` iff all in-flight work completed before
    /// the timeout; a forced cancellation still counts as `false`.
    pub async fn execute(&self) -> Result<bool> {
        if self.queues.is_empty() {
            return Err(OverseerError::Validation(
                "no queues configured to drain".to_string(),
            ));
        }

        info!(queues = ?self.queues, timeout_secs = self.wait_timeout.as_secs(), "deployment drain starting");
        self.events.publish(SupervisionEvent::DeploymentStarted {
            queues: self.queues.clone(),
        });

        for queue in &self.queues {
            self.queue.pause_queue(queue).await?;
        }

        let started = self.clock.now();
        let deadline = started
            + chrono::Duration::from_std(self.wait_timeout)
                .map_err(|e| OverseerError::Deployment(e.to_string()))?;

        loop {
            let remaining = self.store.running_sessions_on(&self.queues);

            if remaining.is_empty() {
                let waited = (self.clock.now() - started).num_seconds();
                info!(queues = ?self.queues, waited_seconds = waited, "deployment drain complete");
                self.events.publish(SupervisionEvent::DeploymentCompleted {
                    queues: self.queues.clone(),
                    waited_seconds: waited,
                });
                return Ok(true);
            }

            if self.clock.now() >= deadline {
                return self.handle_timeout(remaining);
            }

            tokio::select! {
                _ = self.shutdown.notified() => {
                    warn!(queues = ?self.queues, "deployment drain cancelled externally");
                    return Err(OverseerError::Deployment(
                        "deployment drain cancelled".to_string(),
                    ));
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    fn handle_timeout(&self, remaining: Vec<SupervisionSession>) -> Result<bool> {
        warn!(
            queues = ?self.queues,
            remaining = remaining.len(),
            cancel = self.cancel_long_running,
            "deployment drain timed out"
        );

        if let Some(callback) = &self.on_timeout {
            callback(&remaining);
        }

        if self.cancel_long_running {
            for session in &remaining {
                let _ = self
                    .store
                    .set_session_status(session.id, SessionStatus::Failed);
                self.store.remove_beat_state(session.id);
            }
        }

        self.events.publish(SupervisionEvent::DeploymentTimedOut {
            queues: self.queues.clone(),
            remaining_sessions: remaining.iter().map(|session| session.id).collect(),
        });

        Ok(false)
    }
}
