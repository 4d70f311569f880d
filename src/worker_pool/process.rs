//! Process-control seam between the supervisor and whatever actually runs
//! worker processes.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;

/// One live worker process under supervision.
#[async_trait]
pub trait WorkerProcess: Send + Sync + fmt::Debug {
    fn id(&self) -> Uuid;

    fn pid(&self) -> u32;

    /// Whether the OS process still exists.
    async fn is_alive(&self) -> bool;

    /// Whether the worker responds to its liveness signal.
    async fn is_responsive(&self) -> bool;

    /// Resident memory in bytes.
    async fn memory_bytes(&self) -> u64;

    /// Ask the worker to exit. Must be safe to call on a dead worker.
    async fn terminate(&self);
}

/// Spawns replacement workers to keep the pool at its configured size.
#[async_trait]
pub trait WorkerLauncher: Send + Sync + fmt::Debug {
    async fn launch(&self) -> Result<Arc<dyn WorkerProcess>>;
}
