//! # Resilience Module
//!
//! Per-service circuit breakers preventing cascade failures when downstream
//! services degrade. Each service name owns a three-state machine (Closed,
//! Open, HalfOpen); the registry hands out breakers on demand and drives
//! their timeout transitions during sweeps.

pub mod circuit_breaker;
pub mod registry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError};
pub use registry::CircuitBreakerRegistry;
