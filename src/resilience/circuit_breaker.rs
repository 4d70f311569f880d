//! # Circuit Breaker Implementation
//!
//! Classic three-state circuit breaker: Closed (normal operation), Open
//! (failing fast), HalfOpen (testing recovery with a bounded number of
//! probes). Failure/success accounting and the resulting transition happen
//! under a single lock so concurrent probes cannot close or reopen the
//! circuit from stale reads.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::config::CircuitBreakerConfig;
use crate::events::{EventPublisher, SupervisionEvent};
use crate::models::{CircuitBreakerState, CircuitState};

/// Errors that can occur during circuit breaker operation
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open and no fallback was configured
    #[error("Circuit breaker is open for {service}")]
    CircuitOpen { service: String },

    /// Operation ran and failed; the failure was recorded
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

/// Outcome of asking the breaker for admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    /// Circuit is closed, call proceeds normally
    Allowed,
    /// Circuit is half-open, call proceeds as a recovery probe
    Probe,
    /// Circuit is open, call must not execute
    Rejected,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    /// Probes admitted since entering HalfOpen
    half_open_probes: u32,
    last_failure_at: Option<DateTime<Utc>>,
    last_success_at: Option<DateTime<Utc>>,
    opened_at: Option<DateTime<Utc>>,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            half_open_probes: 0,
            last_failure_at: None,
            last_success_at: None,
            opened_at: None,
        }
    }

    /// Counters reset on every state entry.
    fn reset_counters(&mut self) {
        self.failure_count = 0;
        self.success_count = 0;
        self.half_open_probes = 0;
    }
}

/// Per-service circuit breaker with atomic state management.
#[derive(Debug)]
pub struct CircuitBreaker {
    service: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    clock: Arc<dyn Clock>,
    events: EventPublisher,
}

impl CircuitBreaker {
    pub fn new(
        service: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
        events: EventPublisher,
    ) -> Self {
        let service = service.into();
        info!(
            service = %service,
            failure_threshold = config.failure_threshold,
            timeout_seconds = config.timeout_seconds,
            success_threshold = config.success_threshold,
            "🛡️ Circuit breaker initialized"
        );

        Self {
            service,
            config,
            inner: Mutex::new(BreakerInner::new()),
            clock,
            events,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Point-in-time snapshot of the breaker's live record.
    pub fn snapshot(&self) -> CircuitBreakerState {
        let inner = self.inner.lock();
        CircuitBreakerState {
            service: self.service.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            last_failure_at: inner.last_failure_at,
            last_success_at: inner.last_success_at,
            opened_at: inner.opened_at,
        }
    }

    /// Execute an operation with circuit breaker protection. When the
    /// circuit is open the operation is not run and the caller observes
    /// [`CircuitBreakerError::CircuitOpen`].
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.try_acquire() {
            Admission::Rejected => Err(CircuitBreakerError::CircuitOpen {
                service: self.service.clone(),
            }),
            Admission::Allowed | Admission::Probe => self.run_recorded(operation).await,
        }
    }

    /// Like [`CircuitBreaker::execute`], but an open circuit runs the
    /// fallback instead of failing fast.
    pub async fn execute_with_fallback<F, Fut, G, GFut, T, E>(
        &self,
        operation: F,
        fallback: G,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = T>,
    {
        match self.try_acquire() {
            Admission::Rejected => {
                warn!(service = %self.service, "circuit open, serving fallback");
                Ok(fallback().await)
            }
            Admission::Allowed | Admission::Probe => self.run_recorded(operation).await,
        }
    }

    async fn run_recorded<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let result = operation().await;
        match &result {
            Ok(_) => self.record_success(),
            Err(_) => self.record_failure(),
        }
        result.map_err(CircuitBreakerError::OperationFailed)
    }

    /// Record a successful call, closing the circuit once the half-open
    /// success threshold is reached.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.last_success_at = Some(self.clock.now());

        let event = match inner.state {
            CircuitState::Closed => {
                inner.success_count += 1;
                inner.failure_count = 0;
                None
            }
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    Some(self.settle_closed(&mut inner))
                } else {
                    None
                }
            }
            CircuitState::Open => {
                warn!(service = %self.service, "success recorded while circuit is open");
                None
            }
        };

        drop(inner);
        self.emit(event);
    }

    /// Record a failed call. Reaching the failure threshold while closed, or
    /// any failure while half-open, opens the circuit.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.last_failure_at = Some(self.clock.now());

        let event = match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    Some(self.trip_open(&mut inner))
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                inner.failure_count += 1;
                Some(self.trip_open(&mut inner))
            }
            CircuitState::Open => None,
        };

        drop(inner);
        self.emit(event);
    }

    /// Drive the Open → HalfOpen timeout transition without a call, so
    /// periodic sweeps keep breaker state moving even on idle services.
    pub fn tick(&self) {
        let mut inner = self.inner.lock();
        let event = self.half_open_if_expired(&mut inner);
        drop(inner);
        self.emit(event);
    }

    /// Force circuit to open state (for emergency situations)
    pub fn force_open(&self) {
        warn!(service = %self.service, "🚨 Circuit breaker forced open");
        let mut inner = self.inner.lock();
        let event = self.trip_open(&mut inner);
        drop(inner);
        self.emit(Some(event));
    }

    /// Force circuit to closed state (for emergency recovery)
    pub fn force_close(&self) {
        warn!(service = %self.service, "🚨 Circuit breaker forced closed");
        let mut inner = self.inner.lock();
        let event = self.settle_closed(&mut inner);
        drop(inner);
        self.emit(Some(event));
    }

    /// Force circuit to half-open state for a manual recovery probe.
    pub fn force_half_open(&self) {
        warn!(service = %self.service, "🚨 Circuit breaker forced half-open");
        let mut inner = self.inner.lock();
        let event = self.enter_half_open(&mut inner);
        drop(inner);
        self.emit(Some(event));
    }

    /// Reset to a pristine closed breaker, clearing counters and timestamps.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        let was_closed = inner.state == CircuitState::Closed;
        *inner = BreakerInner::new();
        drop(inner);
        if !was_closed {
            self.emit(Some(SupervisionEvent::CircuitBreakerClosed {
                service: self.service.clone(),
            }));
        }
    }

    fn try_acquire(&self) -> Admission {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::Open => {
                if let Some(event) = self.half_open_if_expired(&mut inner) {
                    inner.half_open_probes = 1;
                    drop(inner);
                    self.emit(Some(event));
                    Admission::Probe
                } else {
                    Admission::Rejected
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_probes < self.config.half_open_attempts {
                    inner.half_open_probes += 1;
                    Admission::Probe
                } else {
                    Admission::Rejected
                }
            }
        }
    }

    fn half_open_if_expired(&self, inner: &mut BreakerInner) -> Option<SupervisionEvent> {
        if inner.state != CircuitState::Open {
            return None;
        }
        let opened_at = inner.opened_at?;
        let elapsed = self.clock.now() - opened_at;
        if elapsed >= Duration::seconds(self.config.timeout_seconds as i64) {
            Some(self.enter_half_open(inner))
        } else {
            None
        }
    }

    fn trip_open(&self, inner: &mut BreakerInner) -> SupervisionEvent {
        let failures = inner.failure_count;
        let now = self.clock.now();

        inner.state = CircuitState::Open;
        inner.reset_counters();
        inner.opened_at = Some(now);

        error!(
            service = %self.service,
            failure_count = failures,
            timeout_seconds = self.config.timeout_seconds,
            "🔴 Circuit breaker opened (failing fast)"
        );

        SupervisionEvent::CircuitBreakerOpened {
            service: self.service.clone(),
            failure_count: failures,
            opened_at: now,
        }
    }

    fn settle_closed(&self, inner: &mut BreakerInner) -> SupervisionEvent {
        inner.state = CircuitState::Closed;
        inner.reset_counters();
        inner.opened_at = None;

        info!(service = %self.service, "🟢 Circuit breaker closed (recovered)");

        SupervisionEvent::CircuitBreakerClosed {
            service: self.service.clone(),
        }
    }

    fn enter_half_open(&self, inner: &mut BreakerInner) -> SupervisionEvent {
        inner.state = CircuitState::HalfOpen;
        inner.reset_counters();

        info!(
            service = %self.service,
            success_threshold = self.config.success_threshold,
            "🟡 Circuit breaker half-open (testing recovery)"
        );

        SupervisionEvent::CircuitBreakerHalfOpened {
            service: self.service.clone(),
        }
    }

    fn emit(&self, event: Option<SupervisionEvent>) {
        if let Some(event) = event {
            self.events.publish(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn breaker(config: CircuitBreakerConfig, clock: Arc<ManualClock>) -> CircuitBreaker {
        CircuitBreaker::new("payments", config, clock, EventPublisher::new(64))
    }

    fn config(failures: u32, timeout: u64, successes: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: failures,
            timeout_seconds: timeout,
            success_threshold: successes,
            half_open_attempts: 3,
        }
    }

    #[tokio::test]
    async fn stays_closed_below_the_failure_threshold() {
        let clock = ManualClock::starting_now();
        let circuit = breaker(config(5, 300, 2), clock);

        for _ in 0..4 {
            let _ = circuit.execute(|| async { Err::<(), _>("boom") }).await;
            assert_eq!(circuit.state(), CircuitState::Closed);
        }

        let _ = circuit.execute(|| async { Err::<(), _>("boom") }).await;
        assert_eq!(circuit.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn open_circuit_fails_fast_without_executing() {
        let clock = ManualClock::starting_now();
        let circuit = breaker(config(1, 300, 1), clock);

        let _ = circuit.execute(|| async { Err::<(), _>("boom") }).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        let mut executed = false;
        let result = circuit
            .execute(|| {
                executed = true;
                async { Ok::<_, String>("should not run") }
            })
            .await;

        assert!(matches!(result, Err(CircuitBreakerError::CircuitOpen { .. })));
        assert!(!executed);
    }

    #[tokio::test]
    async fn fallback_serves_callers_while_open() {
        let clock = ManualClock::starting_now();
        let circuit = breaker(config(1, 300, 1), clock);

        let _ = circuit.execute(|| async { Err::<&str, _>("boom") }).await;

        let result: Result<&str, CircuitBreakerError<&str>> = circuit
            .execute_with_fallback(|| async { Ok("live") }, || async { "cached" })
            .await;
        assert_eq!(result.unwrap(), "cached");
    }

    #[tokio::test]
    async fn recovery_scenario_closes_after_two_probe_successes() {
        // failure_threshold=5, timeout=300s, success_threshold=2
        let clock = ManualClock::starting_now();
        let circuit = breaker(config(5, 300, 2), clock.clone());

        for _ in 0..5 {
            let _ = circuit.execute(|| async { Err::<(), _>("boom") }).await;
        }
        assert_eq!(circuit.state(), CircuitState::Open);

        // Before the timeout the circuit stays shut
        clock.advance_secs(299);
        let result = circuit.execute(|| async { Ok::<_, String>(()) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::CircuitOpen { .. })));

        // At the timeout the next call is admitted as a probe
        clock.advance_secs(1);
        circuit.execute(|| async { Ok::<_, String>(()) }).await.unwrap();
        assert_eq!(circuit.state(), CircuitState::HalfOpen);

        circuit.execute(|| async { Ok::<_, String>(()) }).await.unwrap();
        assert_eq!(circuit.state(), CircuitState::Closed);

        let snapshot = circuit.snapshot();
        assert_eq!(snapshot.failure_count, 0);
        assert_eq!(snapshot.success_count, 0);
        assert_eq!(snapshot.opened_at, None);
    }

    #[tokio::test]
    async fn half_open_failure_reopens_with_a_fresh_opened_at() {
        let clock = ManualClock::starting_now();
        let circuit = breaker(config(1, 300, 2), clock.clone());

        let _ = circuit.execute(|| async { Err::<(), _>("boom") }).await;
        let first_opened_at = circuit.snapshot().opened_at.unwrap();

        clock.advance_secs(300);
        let _ = circuit.execute(|| async { Err::<(), _>("still broken") }).await;

        assert_eq!(circuit.state(), CircuitState::Open);
        let snapshot = circuit.snapshot();
        assert!(snapshot.opened_at.unwrap() > first_opened_at);
        assert_eq!(snapshot.failure_count, 0);
        assert_eq!(snapshot.success_count, 0);
    }

    #[tokio::test]
    async fn half_open_admits_a_bounded_number_of_probes() {
        let clock = ManualClock::starting_now();
        let circuit = CircuitBreaker::new(
            "search",
            CircuitBreakerConfig {
                failure_threshold: 1,
                timeout_seconds: 60,
                success_threshold: 10,
                half_open_attempts: 2,
            },
            clock.clone(),
            EventPublisher::new(64),
        );

        let _ = circuit.execute(|| async { Err::<(), _>("boom") }).await;
        clock.advance_secs(60);

        // Two probes are admitted, the third caller is rejected
        circuit.execute(|| async { Ok::<_, String>(()) }).await.unwrap();
        circuit.execute(|| async { Ok::<_, String>(()) }).await.unwrap();
        let result = circuit.execute(|| async { Ok::<_, String>(()) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::CircuitOpen { .. })));
        assert_eq!(circuit.state(), CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn tick_transitions_idle_open_circuits_to_half_open() {
        let clock = ManualClock::starting_now();
        let circuit = breaker(config(1, 120, 1), clock.clone());

        let _ = circuit.execute(|| async { Err::<(), _>("boom") }).await;

        circuit.tick();
        assert_eq!(circuit.state(), CircuitState::Open);

        clock.advance_secs(120);
        circuit.tick();
        assert_eq!(circuit.state(), CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn manual_overrides_move_the_state_machine() {
        let clock = ManualClock::starting_now();
        let circuit = breaker(config(5, 300, 2), clock);

        circuit.force_open();
        assert_eq!(circuit.state(), CircuitState::Open);

        circuit.force_half_open();
        assert_eq!(circuit.state(), CircuitState::HalfOpen);

        circuit.force_close();
        assert_eq!(circuit.state(), CircuitState::Closed);

        circuit.record_failure();
        circuit.reset();
        let snapshot = circuit.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.failure_count, 0);
        assert_eq!(snapshot.last_failure_at, None);
    }

    #[tokio::test]
    async fn success_in_closed_state_clears_the_failure_streak() {
        let clock = ManualClock::starting_now();
        let circuit = breaker(config(3, 300, 2), clock);

        let _ = circuit.execute(|| async { Err::<(), _>("boom") }).await;
        let _ = circuit.execute(|| async { Err::<(), _>("boom") }).await;
        circuit.execute(|| async { Ok::<_, String>(()) }).await.unwrap();

        // Two fresh failures must not trip a threshold of three
        let _ = circuit.execute(|| async { Err::<(), _>("boom") }).await;
        let _ = circuit.execute(|| async { Err::<(), _>("boom") }).await;
        assert_eq!(circuit.state(), CircuitState::Closed);

        let _ = circuit.execute(|| async { Err::<(), _>("boom") }).await;
        assert_eq!(circuit.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn opening_emits_exactly_one_event() {
        let clock = ManualClock::starting_now();
        let events = EventPublisher::new(64);
        let mut receiver = events.subscribe();
        let circuit = CircuitBreaker::new("mail", config(2, 300, 1), clock, events);

        let _ = circuit.execute(|| async { Err::<(), _>("boom") }).await;
        let _ = circuit.execute(|| async { Err::<(), _>("boom") }).await;
        let _ = circuit.execute(|| async { Ok::<_, String>(()) }).await;

        let mut opened = 0;
        while let Ok(published) = receiver.try_recv() {
            if matches!(published.event, SupervisionEvent::CircuitBreakerOpened { .. }) {
                opened += 1;
            }
        }
        assert_eq!(opened, 1);
    }
}
