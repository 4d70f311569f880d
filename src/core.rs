//! # Overseer Core
//!
//! Wires the shared store, event publisher, clock, and every supervisory
//! component together from loaded configuration, and exposes the session
//! lifecycle plus the query surface that CLI and dashboard tooling render.

use serde_json::Value;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::OverseerConfig;
use crate::dead_letter::DeadLetterStore;
use crate::deployment::DeploymentCoordinator;
use crate::error::Result;
use crate::events::EventPublisher;
use crate::models::{
    CircuitBreakerState, DeadLetterEntry, HealthRecord, Heartbeat, JobErrorDetail, SessionStatus,
    SupervisionSession,
};
use crate::queue::{QueueBackend, QueueFilter};
use crate::resilience::CircuitBreakerRegistry;
use crate::storage::SupervisionRepository;
use crate::store::SupervisionStore;
use crate::supervision::{
    HealthMonitor, HeartbeatTracker, ResourceGuard, ResourceSampler, StuckReport,
    SupervisionSweeper, SystemSampler,
};
use crate::worker_pool::{WorkerLauncher, WorkerPoolSupervisor};

#[derive(Debug)]
pub struct OverseerCore {
    config: OverseerConfig,
    store: Arc<SupervisionStore>,
    events: EventPublisher,
    clock: Arc<dyn Clock>,
    filter: QueueFilter,
    queue: Arc<dyn QueueBackend>,
    tracker: Arc<HeartbeatTracker>,
    guard: Arc<ResourceGuard>,
    monitor: Arc<HealthMonitor>,
    breakers: Arc<CircuitBreakerRegistry>,
    dead_letters: Arc<DeadLetterStore>,
}

impl OverseerCore {
    /// Build a core with the production clock and system resource sampler.
    pub fn new(config: OverseerConfig, queue: Arc<dyn QueueBackend>) -> Result<Self> {
        Self::with_components(
            config,
            queue,
            Arc::new(SystemClock),
            Arc::new(SystemSampler::new()),
        )
    }

    /// Build a core with explicit clock and sampler implementations.
    pub fn with_components(
        config: OverseerConfig,
        queue: Arc<dyn QueueBackend>,
        clock: Arc<dyn Clock>,
        sampler: Arc<dyn ResourceSampler>,
    ) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(SupervisionStore::new());
        let events = EventPublisher::new(config.events.channel_capacity);
        let filter = QueueFilter::from_config(&config.queues);

        let tracker = Arc::new(HeartbeatTracker::new(
            store.clone(),
            config.heartbeats.clone(),
            filter.clone(),
            clock.clone(),
            events.clone(),
        ));

        let guard = Arc::new(ResourceGuard::new(
            store.clone(),
            config.resources.clone(),
            sampler,
            clock.clone(),
            events.clone(),
        ));

        let monitor = Arc::new(HealthMonitor::new(
            store.clone(),
            guard.clone(),
            config.heartbeats.clone(),
            clock.clone(),
            events.clone(),
        ));

        let breakers = Arc::new(CircuitBreakerRegistry::new(
            config.circuit_breakers.clone(),
            clock.clone(),
            events.clone(),
        ));

        let dead_letters = Arc::new(DeadLetterStore::new(
            store.clone(),
            queue.clone(),
            config.dead_letter.clone(),
            clock.clone(),
            events.clone(),
        ));

        info!(
            heartbeat_interval = config.heartbeats.interval_seconds,
            missed_threshold = config.heartbeats.missed_threshold,
            max_retries = config.dead_letter.max_retries,
            "overseer core initialized"
        );

        Ok(Self {
            config,
            store,
            events,
            clock,
            filter,
            queue,
            tracker,
            guard,
            monitor,
            breakers,
            dead_letters,
        })
    }

    // --- session lifecycle ---

    /// Begin supervising a job instance. Sessions on queues the filter
    /// excludes are tracked for bookkeeping but kept out of liveness sweeps.
    pub fn start_session(
        &self,
        job_class: &str,
        queue: Option<String>,
        metadata: Value,
    ) -> Result<SupervisionSession> {
        let session = SupervisionSession::new(job_class, queue, self.clock.now())
            .with_metadata(metadata);
        let supervised = session
            .queue
            .as_deref()
            .map(|queue| self.filter.should_supervise(queue))
            .unwrap_or(true);

        self.store.insert_session(session.clone());
        if supervised {
            self.tracker.register_session(session.id)?;
        }

        Ok(session)
    }

    pub fn record_heartbeat(&self, session_id: Uuid, metadata: Value) -> Result<Heartbeat> {
        self.tracker.record_heartbeat(session_id, metadata)
    }

    /// Mark a session finished and drop its tracking state.
    pub fn complete_session(&self, session_id: Uuid) -> Result<SupervisionSession> {
        let session = self
            .store
            .set_session_status(session_id, SessionStatus::Completed)?;
        self.tracker.remove_session(session_id);
        Ok(session)
    }

    /// Record a failure. Once the retry budget is exhausted the session is
    /// moved to the dead letter queue and the fresh entry is returned;
    /// transient failures return `None` and stay retryable.
    pub fn fail_session(
        &self,
        session_id: Uuid,
        error: JobErrorDetail,
    ) -> Result<Option<DeadLetterEntry>> {
        self.dead_letters.record_error(session_id, error.clone())?;

        if self.dead_letters.should_dead_letter(session_id) {
            let entry = self.dead_letters.move_to_dead_letter(session_id, &error)?;
            return Ok(Some(entry));
        }
        Ok(None)
    }

    // --- component access ---

    pub fn heartbeats(&self) -> &Arc<HeartbeatTracker> {
        &self.tracker
    }

    pub fn resources(&self) -> &Arc<ResourceGuard> {
        &self.guard
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    pub fn circuit_breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    pub fn dead_letters(&self) -> &Arc<DeadLetterStore> {
        &self.dead_letters
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    pub fn store(&self) -> &Arc<SupervisionStore> {
        &self.store
    }

    pub fn config(&self) -> &OverseerConfig {
        &self.config
    }

    // --- periodic machinery ---

    /// Build the sweep loop over this core's components.
    pub fn sweeper(&self) -> Arc<SupervisionSweeper> {
        Arc::new(SupervisionSweeper::new(
            self.tracker.clone(),
            self.monitor.clone(),
            self.breakers.clone(),
            self.config.sweeper.interval(),
        ))
    }

    /// Start configuring a deployment drain against this core's queue
    /// backend and job registry.
    pub fn deployment(&self) -> DeploymentCoordinator {
        DeploymentCoordinator::new(
            self.store.clone(),
            self.queue.clone(),
            self.events.clone(),
            self.clock.clone(),
            &self.config.deployment,
        )
    }

    /// Build a worker pool supervisor from the configured pool settings.
    pub fn worker_pool(&self, launcher: Arc<dyn WorkerLauncher>) -> Result<WorkerPoolSupervisor> {
        WorkerPoolSupervisor::new(launcher, self.config.worker_pool.clone(), self.clock.clone())
    }

    // --- observability queries (rendered by external tooling) ---

    pub fn sessions(&self) -> Vec<SupervisionSession> {
        self.store.sessions()
    }

    pub fn session(&self, session_id: Uuid) -> Option<SupervisionSession> {
        self.store.session(session_id)
    }

    pub fn stuck_sessions(&self) -> Vec<StuckReport> {
        self.tracker.list_stuck()
    }

    pub fn health_record(&self, session_id: Uuid) -> Option<HealthRecord> {
        self.monitor.health_record(session_id)
    }

    pub fn health_records(&self, unhealthy_only: bool) -> Vec<HealthRecord> {
        self.monitor.health_records(unhealthy_only)
    }

    pub fn breaker_states(&self) -> Vec<CircuitBreakerState> {
        self.breakers.states()
    }

    pub fn dead_letter_entries(&self) -> Vec<DeadLetterEntry> {
        self.dead_letters.entries()
    }

    pub fn queue_filter(&self) -> &QueueFilter {
        &self.filter
    }

    // --- persistence ---

    /// Write the current upsertable state (sessions, health records, breaker
    /// snapshots, dead letter entries) through the persistence collaborator.
    /// Append-only streams (heartbeats, violations, job errors) are written
    /// by embedders at the point of record.
    pub async fn persist(&self, repository: &dyn SupervisionRepository) -> Result<()> {
        for session in self.store.sessions() {
            repository.upsert_session(&session).await?;
        }
        for record in self.store.health_records(false) {
            repository.upsert_health_record(&record).await?;
        }
        for state in self.breakers.states() {
            repository.upsert_breaker_state(&state).await?;
        }
        for entry in self.store.dead_letters() {
            repository.insert_dead_letter(&entry).await?;
        }
        Ok(())
    }
}
