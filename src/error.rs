//! # Structured Error Handling
//!
//! Crate-wide error taxonomy. Monitoring outcomes (stuck sessions, resource
//! violations, open circuits) are reported through events and return values,
//! not through this type; `OverseerError` is reserved for genuine failures
//! such as invalid inputs, unknown identifiers, and collaborator errors.

use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum OverseerError {
    /// Caller supplied an invalid input (e.g. worker count < 1)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Persistence collaborator failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Queue backend collaborator failed
    #[error("Queue backend error: {0}")]
    Queue(String),

    /// No supervision session registered under the given id
    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    /// No dead letter entry registered under the given id
    #[error("Dead letter entry not found: {0}")]
    DeadLetterEntryNotFound(Uuid),

    /// Worker pool lifecycle failure
    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    /// Deployment coordination failure (including external cancellation)
    #[error("Deployment error: {0}")]
    Deployment(String),
}

impl From<sqlx::Error> for OverseerError {
    fn from(err: sqlx::Error) -> Self {
        OverseerError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OverseerError>;
