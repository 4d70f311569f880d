//! # Supervision Sweeper
//!
//! Timer-driven loop that runs stuck detection, health checks, and circuit
//! breaker timeout ticks on a fixed cadence. The loop selects on a shutdown
//! signal every iteration so `stop()` takes effect within one sweep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::resilience::CircuitBreakerRegistry;
use crate::supervision::health_monitor::HealthMonitor;
use crate::supervision::heartbeat_tracker::{HeartbeatTracker, StuckReport};

/// Outcome of one sweep pass.
#[derive(Debug, Clone)]
pub struct SweepReport {
    pub stuck: Vec<StuckReport>,
    pub sessions_checked: usize,
}

#[derive(Debug)]
pub struct SupervisionSweeper {
    tracker: Arc<HeartbeatTracker>,
    monitor: Arc<HealthMonitor>,
    breakers: Arc<CircuitBreakerRegistry>,
    interval: Duration,
    running: AtomicBool,
    shutdown: Notify,
}

impl SupervisionSweeper {
    pub fn new(
        tracker: Arc<HeartbeatTracker>,
        monitor: Arc<HealthMonitor>,
        breakers: Arc<CircuitBreakerRegistry>,
        interval: Duration,
    ) -> Self {
        Self {
            tracker,
            monitor,
            breakers,
            interval,
            running: AtomicBool::new(false),
            shutdown: Notify::new(),
        }
    }

    /// Run one pass: stuck detection, a health check per active session, and
    /// breaker timeout ticks.
    pub fn sweep_once(&self) -> SweepReport {
        let stuck = self.tracker.sweep_for_stuck();

        let mut sessions_checked = 0;
        for session_id in self.tracker.active_sessions() {
            // Sessions removed mid-sweep are simply skipped
            if self.monitor.perform_health_check(session_id).is_ok() {
                sessions_checked += 1;
            }
        }

        self.breakers.tick();

        debug!(
            stuck = stuck.len(),
            sessions_checked, "supervision sweep complete"
        );

        SweepReport {
            stuck,
            sessions_checked,
        }
    }

    /// Long-running sweep loop; returns once [`SupervisionSweeper::stop`] is
    /// called.
    pub async fn run(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }

        info!(interval_ms = self.interval.as_millis() as u64, "supervision sweeper started");

        while self.running.load(Ordering::Acquire) {
            self.sweep_once();

            tokio::select! {
                _ = self.shutdown.notified() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("supervision sweeper stopped");
    }

    /// Spawn the loop on the runtime.
    pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let sweeper = Arc::clone(self);
        tokio::spawn(async move { sweeper.run().await })
    }

    /// Signal the loop to exit; takes effect within one sweep interval and
    /// is safe to call repeatedly.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        // notify_one stores a permit, so a stop landing between sweeps is
        // picked up by the next select instead of being lost
        self.shutdown.notify_one();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}
