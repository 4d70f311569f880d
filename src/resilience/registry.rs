//! Registry handing out one circuit breaker per service name.

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerError};
use crate::clock::Clock;
use crate::config::CircuitBreakerSettings;
use crate::events::EventPublisher;
use crate::models::{CircuitBreakerState, CircuitState};

/// Per-service breaker registry. Exactly one live breaker exists per service
/// name; lookups create it on first use with the configured (or default)
/// thresholds.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    settings: CircuitBreakerSettings,
    clock: Arc<dyn Clock>,
    events: EventPublisher,
}

impl CircuitBreakerRegistry {
    pub fn new(
        settings: CircuitBreakerSettings,
        clock: Arc<dyn Clock>,
        events: EventPublisher,
    ) -> Self {
        Self {
            breakers: DashMap::new(),
            settings,
            clock,
            events,
        }
    }

    /// Fetch (or create) the breaker guarding a service.
    pub fn breaker(&self, service: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(service.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    service,
                    self.settings.for_service(service),
                    self.clock.clone(),
                    self.events.clone(),
                ))
            })
            .clone()
    }

    /// Run an operation guarded by the named service's breaker.
    pub async fn execute<F, Fut, T, E>(
        &self,
        service: &str,
        operation: F,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.breaker(service).execute(operation).await
    }

    /// Run an operation with a fallback served while the circuit is open.
    pub async fn execute_with_fallback<F, Fut, G, GFut, T, E>(
        &self,
        service: &str,
        operation: F,
        fallback: G,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = T>,
    {
        self.breaker(service)
            .execute_with_fallback(operation, fallback)
            .await
    }

    pub fn record_success(&self, service: &str) {
        self.breaker(service).record_success();
    }

    pub fn record_failure(&self, service: &str) {
        self.breaker(service).record_failure();
    }

    pub fn is_open(&self, service: &str) -> bool {
        self.breaker(service).is_open()
    }

    pub fn state(&self, service: &str) -> CircuitState {
        self.breaker(service).state()
    }

    /// Snapshots of every known breaker, for the observability surface.
    pub fn states(&self) -> Vec<CircuitBreakerState> {
        self.breakers
            .iter()
            .map(|entry| entry.snapshot())
            .collect()
    }

    /// Drive timeout transitions on every breaker; called by the sweep loop.
    pub fn tick(&self) {
        for entry in self.breakers.iter() {
            entry.tick();
        }
    }

    // Manual operational overrides

    pub fn open(&self, service: &str) {
        self.breaker(service).force_open();
    }

    pub fn close(&self, service: &str) {
        self.breaker(service).force_close();
    }

    pub fn half_open(&self, service: &str) {
        self.breaker(service).force_half_open();
    }

    pub fn reset(&self, service: &str) {
        self.breaker(service).reset();
    }
}
