#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Overseer Core
//!
//! Supervision and resilience engine for long-running background jobs.
//!
//! ## Overview
//!
//! Overseer watches a fixed set of supervised job instances and worker
//! processes: it detects liveness via heartbeats, tracks a tri-state health
//! verdict per session, enforces resource ceilings, protects unreliable
//! downstream services with per-service circuit breakers, routes
//! permanently-failed work to a dead letter store, coordinates graceful
//! queue draining during deployments, and supervises pools of worker
//! processes with crash recovery.
//!
//! Persistence, CLI presentation, notification delivery, and the queue
//! backend itself are external collaborators behind explicit traits; the
//! core owns the concurrent state machines, threshold logic, and
//! time-window bookkeeping.
//!
//! ## Module Organization
//!
//! - [`models`] - Entity types shared by every component
//! - [`store`] - Shared in-memory state, the single source of truth
//! - [`supervision`] - Heartbeat tracking, resource guard, health monitor, sweeper
//! - [`resilience`] - Per-service circuit breakers
//! - [`dead_letter`] - Terminal-failure registry with retry and pruning
//! - [`deployment`] - Queue draining for safe redeploys
//! - [`worker_pool`] - Worker process supervision with crash recovery
//! - [`queue`] - Queue backend trait and supervision filter
//! - [`storage`] - Persistence collaborator contract and Postgres implementation
//! - [`events`] - Typed lifecycle events and the broadcast publisher
//! - [`config`] - Configuration structs and environment-aware loading
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use overseer_core::config::OverseerConfig;
//! use overseer_core::queue::MemoryQueueBackend;
//! use overseer_core::OverseerCore;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let core = OverseerCore::new(
//!     OverseerConfig::default(),
//!     Arc::new(MemoryQueueBackend::new()),
//! )?;
//!
//! let session = core.start_session(
//!     "Billing::InvoiceSync",
//!     Some("billing".to_string()),
//!     serde_json::json!({ "pid": std::process::id() }),
//! )?;
//!
//! core.record_heartbeat(session.id, serde_json::json!({ "progress": 0.1 }))?;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod core;
pub mod dead_letter;
pub mod deployment;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod queue;
pub mod resilience;
pub mod storage;
pub mod store;
pub mod supervision;
pub mod worker_pool;

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::config::{ConfigManager, OverseerConfig};
pub use self::core::OverseerCore;
pub use self::error::{OverseerError, Result};
pub use self::events::{EventPublisher, SupervisionEvent};
pub use self::models::{
    CircuitBreakerState, CircuitState, DeadLetterEntry, HealthRecord, HealthStatus, Heartbeat,
    JobError, JobErrorDetail, ResourceViolation, SessionStatus, SupervisionSession, ViolationKind,
    WorkerHandle, WorkerStatus,
};
