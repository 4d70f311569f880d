//! # Supervision Data Model
//!
//! Entity types shared by every supervisory component. Each type maps to one
//! table of the persistence collaborator contract (see [`crate::storage`]) and
//! is owned in memory by the [`crate::store::SupervisionStore`].

pub mod breaker;
pub mod dead_letter;
pub mod health;
pub mod heartbeat;
pub mod job_error;
pub mod session;
pub mod violation;
pub mod worker;

pub use breaker::{CircuitBreakerState, CircuitState};
pub use dead_letter::DeadLetterEntry;
pub use health::{HealthRecord, HealthStatus};
pub use heartbeat::Heartbeat;
pub use job_error::{JobError, JobErrorDetail};
pub use session::{SessionStatus, SupervisionSession};
pub use violation::{ResourceViolation, ViolationKind};
pub use worker::{WorkerHandle, WorkerStatus};
