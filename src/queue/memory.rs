//! In-process queue backend used by tests and broker-less embeddings.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;

use super::QueueBackend;
use crate::error::Result;

#[derive(Debug, Default)]
struct QueueState {
    paused: bool,
    running: usize,
}

/// Queue backend holding all state in memory.
#[derive(Debug, Default)]
pub struct MemoryQueueBackend {
    queues: DashMap<String, QueueState>,
    dispatched: Mutex<Vec<(String, Value)>>,
}

impl MemoryQueueBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_paused(&self, queue: &str) -> bool {
        self.queues
            .get(queue)
            .map(|state| state.paused)
            .unwrap_or(false)
    }

    /// Set the simulated number of running jobs on a queue.
    pub fn set_running(&self, queue: &str, count: usize) {
        self.queues.entry(queue.to_string()).or_default().running = count;
    }

    /// Payloads dispatched so far, in order.
    pub fn dispatched(&self) -> Vec<(String, Value)> {
        self.dispatched.lock().clone()
    }
}

#[async_trait]
impl QueueBackend for MemoryQueueBackend {
    async fn pause_queue(&self, queue: &str) -> Result<()> {
        self.queues.entry(queue.to_string()).or_default().paused = true;
        Ok(())
    }

    async fn resume_queue(&self, queue: &str) -> Result<()> {
        self.queues.entry(queue.to_string()).or_default().paused = false;
        Ok(())
    }

    async fn running_count(&self, queue: &str) -> Result<usize> {
        Ok(self
            .queues
            .get(queue)
            .map(|state| state.running)
            .unwrap_or(0))
    }

    async fn dispatch(&self, queue: &str, payload: Value) -> Result<()> {
        self.dispatched.lock().push((queue.to_string(), payload));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn pause_and_resume_toggle_state() {
        let backend = MemoryQueueBackend::new();
        backend.pause_queue("default").await.unwrap();
        assert!(backend.is_paused("default"));

        backend.resume_queue("default").await.unwrap();
        assert!(!backend.is_paused("default"));
    }

    #[tokio::test]
    async fn dispatch_records_payloads_in_order() {
        let backend = MemoryQueueBackend::new();
        backend.dispatch("default", json!({"n": 1})).await.unwrap();
        backend.dispatch("mailers", json!({"n": 2})).await.unwrap();

        let dispatched = backend.dispatched();
        assert_eq!(dispatched.len(), 2);
        assert_eq!(dispatched[0].0, "default");
        assert_eq!(dispatched[1].0, "mailers");
    }
}
