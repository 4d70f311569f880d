//! # Worker Pool Supervisor
//!
//! Continuously evaluates each worker: a crashed worker (process gone) is
//! removed and replaced; a worker failing its health check is restarted in
//! place unless the caller supplied an `on_unhealthy` callback, in which
//! case the callback decides. The supervision loop selects on a shutdown
//! signal every sweep so `stop()` returns promptly and never blocks on a
//! full interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::WorkerPoolConfig;
use crate::error::{OverseerError, Result};
use crate::models::{WorkerHandle, WorkerStatus};

use super::process::{WorkerLauncher, WorkerProcess};

/// Invoked with the affected worker's handle on crash / unhealthy verdicts.
pub type WorkerCallback = Arc<dyn Fn(&WorkerHandle) + Send + Sync>;

/// Custom health check; fully replaces the default (responsive AND under the
/// memory ceiling) when supplied.
pub type WorkerHealthCheck = Arc<dyn Fn(&WorkerHandle) -> bool + Send + Sync>;

#[derive(Debug)]
struct ManagedWorker {
    process: Arc<dyn WorkerProcess>,
    handle: WorkerHandle,
}

/// Outcome of one supervision sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub crashed: usize,
    pub restarted: usize,
    /// Workers that failed their health check this sweep
    pub unhealthy: usize,
}

/// Pool status for the observability surface.
#[derive(Debug, Clone)]
pub struct PoolStatus {
    pub configured_workers: usize,
    pub active_workers: usize,
    pub supervising: bool,
    pub workers: Vec<WorkerHandle>,
}

pub struct WorkerPoolSupervisor {
    launcher: Arc<dyn WorkerLauncher>,
    config: WorkerPoolConfig,
    clock: Arc<dyn Clock>,
    workers: Mutex<Vec<ManagedWorker>>,
    running: AtomicBool,
    /// Cleared by stop(); gates replenishment so a sweep racing a stop
    /// cannot relaunch workers into a drained pool
    accepting: AtomicBool,
    shutdown: Notify,
    on_crash: Option<WorkerCallback>,
    on_unhealthy: Option<WorkerCallback>,
    health_check: Option<WorkerHealthCheck>,
}

impl std::fmt::Debug for WorkerPoolSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPoolSupervisor")
            .field("worker_count", &self.config.worker_count)
            .field("active", &self.workers.lock().len())
            .field("supervising", &self.running.load(Ordering::Acquire))
            .finish()
    }
}

impl WorkerPoolSupervisor {
    pub fn new(
        launcher: Arc<dyn WorkerLauncher>,
        config: WorkerPoolConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if config.worker_count < 1 {
            return Err(OverseerError::Validation(
                "worker pool requires at least one worker".to_string(),
            ));
        }

        Ok(Self {
            launcher,
            config,
            clock,
            workers: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            accepting: AtomicBool::new(true),
            shutdown: Notify::new(),
            on_crash: None,
            on_unhealthy: None,
            health_check: None,
        })
    }

    /// Replace the default health check entirely.
    pub fn with_health_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&WorkerHandle) -> bool + Send + Sync + 'static,
    {
        self.health_check = Some(Arc::new(check));
        self
    }

    /// Observe crashed workers before they are replaced.
    pub fn on_crash<F>(mut self, callback: F) -> Self
    where
        F: Fn(&WorkerHandle) + Send + Sync + 'static,
    {
        self.on_crash = Some(Arc::new(callback));
        self
    }

    /// Take over the unhealthy response; the default restart is suppressed
    /// when this is set.
    pub fn on_unhealthy<F>(mut self, callback: F) -> Self
    where
        F: Fn(&WorkerHandle) + Send + Sync + 'static,
    {
        self.on_unhealthy = Some(Arc::new(callback));
        self
    }

    /// Launch workers until the pool is at its configured size.
    pub async fn start(&self) -> Result<()> {
        self.accepting.store(true, Ordering::Release);
        let launched = self.replenish().await?;
        info!(
            launched,
            worker_count = self.config.worker_count,
            "🏊 worker pool started"
        );
        Ok(())
    }

    /// One evaluation pass over every worker.
    pub async fn sweep(&self) -> Result<SweepSummary> {
        let now = self.clock.now();
        let mut summary = SweepSummary::default();

        // Probe outside the lock; the pool only mutates in this sweep and in
        // stop(), and stop() drains everything anyway.
        let probes: Vec<(Uuid, Arc<dyn WorkerProcess>)> = {
            let workers = self.workers.lock();
            workers
                .iter()
                .map(|worker| (worker.handle.id, worker.process.clone()))
                .collect()
        };

        let mut crashed: Vec<WorkerHandle> = Vec::new();
        let mut unhealthy: Vec<WorkerHandle> = Vec::new();
        let mut to_restart: Vec<Arc<dyn WorkerProcess>> = Vec::new();

        for (worker_id, process) in probes {
            let alive = process.is_alive().await;

            if !alive {
                let mut workers = self.workers.lock();
                if let Some(position) = workers.iter().position(|w| w.handle.id == worker_id) {
                    let mut removed = workers.remove(position);
                    removed.handle.status = WorkerStatus::Crashed;
                    removed.handle.last_health_check_at = Some(now);
                    crashed.push(removed.handle);
                }
                continue;
            }

            let responsive = process.is_responsive().await;
            let memory_bytes = process.memory_bytes().await;

            let handle = {
                let mut workers = self.workers.lock();
                let Some(worker) = workers.iter_mut().find(|w| w.handle.id == worker_id) else {
                    continue;
                };
                worker.handle.status = WorkerStatus::Running;
                worker.handle.last_health_check_at = Some(now);
                worker.handle.memory_usage_bytes = memory_bytes;
                worker.handle.clone()
            };

            let healthy = match &self.health_check {
                Some(check) => check(&handle),
                None => responsive && self.under_memory_ceiling(memory_bytes),
            };

            if healthy {
                continue;
            }

            if self.on_unhealthy.is_some() {
                unhealthy.push(handle);
            } else {
                // Default action: restart the worker in place
                let mut workers = self.workers.lock();
                if let Some(position) = workers.iter().position(|w| w.handle.id == worker_id) {
                    let removed = workers.remove(position);
                    to_restart.push(removed.process);
                }
                unhealthy.push(handle);
                summary.restarted += 1;
            }
        }

        summary.crashed = crashed.len();
        summary.unhealthy = unhealthy.len();

        for handle in &crashed {
            warn!(worker_id = %handle.id, pid = handle.pid, "worker crashed, replacing");
            if let Some(callback) = &self.on_crash {
                callback(handle);
            }
        }

        if let Some(callback) = &self.on_unhealthy {
            for handle in &unhealthy {
                warn!(worker_id = %handle.id, pid = handle.pid, "worker unhealthy");
                callback(handle);
            }
        }

        for process in to_restart {
            warn!(worker_id = %process.id(), pid = process.pid(), "restarting unhealthy worker");
            process.terminate().await;
        }

        self.replenish().await?;
        Ok(summary)
    }

    /// Long-running supervision loop; exits promptly after
    /// [`WorkerPoolSupervisor::stop`].
    pub async fn supervise(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }

        info!(
            worker_count = self.config.worker_count,
            interval_ms = self.config.sweep_interval_ms,
            "worker pool supervision started"
        );

        while self.running.load(Ordering::Acquire) {
            if let Err(error) = self.sweep().await {
                warn!(%error, "worker pool sweep failed");
            }

            tokio::select! {
                _ = self.shutdown.notified() => break,
                _ = tokio::time::sleep(self.config.sweep_interval()) => {}
            }
        }

        info!("worker pool supervision stopped");
    }

    /// Spawn the supervision loop on the runtime.
    pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let supervisor = Arc::clone(self);
        tokio::spawn(async move { supervisor.supervise().await })
    }

    /// Terminate supervision and every managed worker, then clear the pool.
    /// Safe to call repeatedly; the loop exits within one sweep.
    pub async fn stop(&self) {
        self.accepting.store(false, Ordering::Release);
        self.running.store(false, Ordering::Release);
        self.shutdown.notify_one();

        let drained: Vec<ManagedWorker> = {
            let mut workers = self.workers.lock();
            workers.drain(..).collect()
        };

        for worker in &drained {
            worker.process.terminate().await;
        }

        if !drained.is_empty() {
            info!(stopped = drained.len(), "worker pool stopped");
        }
    }

    pub fn status(&self) -> PoolStatus {
        let workers = self.workers.lock();
        PoolStatus {
            configured_workers: self.config.worker_count,
            active_workers: workers.len(),
            supervising: self.running.load(Ordering::Acquire),
            workers: workers.iter().map(|worker| worker.handle.clone()).collect(),
        }
    }

    fn under_memory_ceiling(&self, memory_bytes: u64) -> bool {
        match self.config.memory_ceiling_mb {
            Some(ceiling_mb) => memory_bytes < ceiling_mb * 1024 * 1024,
            None => true,
        }
    }

    /// Launch workers until the pool is back at its configured size,
    /// returning how many were launched.
    async fn replenish(&self) -> Result<usize> {
        let mut launched = 0;

        loop {
            if !self.accepting.load(Ordering::Acquire) {
                break;
            }
            {
                let workers = self.workers.lock();
                if workers.len() >= self.config.worker_count {
                    break;
                }
            }

            let process = self.launcher.launch().await?;
            let handle = WorkerHandle::new(process.id(), process.pid(), self.clock.now());

            self.workers.lock().push(ManagedWorker { process, handle });
            launched += 1;
        }

        Ok(launched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, AtomicU64};
    use std::time::Duration;

    #[derive(Debug)]
    struct FakeWorker {
        id: Uuid,
        pid: u32,
        alive: AtomicBool,
        responsive: AtomicBool,
        memory: AtomicU64,
        terminated: AtomicBool,
    }

    impl FakeWorker {
        fn new(pid: u32) -> Arc<Self> {
            Arc::new(Self {
                id: Uuid::new_v4(),
                pid,
                alive: AtomicBool::new(true),
                responsive: AtomicBool::new(true),
                memory: AtomicU64::new(64 * 1024 * 1024),
                terminated: AtomicBool::new(false),
            })
        }

        fn kill(&self) {
            self.alive.store(false, Ordering::Release);
        }
    }

    #[async_trait]
    impl WorkerProcess for FakeWorker {
        fn id(&self) -> Uuid {
            self.id
        }

        fn pid(&self) -> u32 {
            self.pid
        }

        async fn is_alive(&self) -> bool {
            self.alive.load(Ordering::Acquire)
        }

        async fn is_responsive(&self) -> bool {
            self.responsive.load(Ordering::Acquire)
        }

        async fn memory_bytes(&self) -> u64 {
            self.memory.load(Ordering::Acquire)
        }

        async fn terminate(&self) {
            self.terminated.store(true, Ordering::Release);
            self.alive.store(false, Ordering::Release);
        }
    }

    #[derive(Debug, Default)]
    struct FakeLauncher {
        next_pid: AtomicU32,
        spawned: Mutex<Vec<Arc<FakeWorker>>>,
    }

    impl FakeLauncher {
        fn spawned(&self) -> Vec<Arc<FakeWorker>> {
            self.spawned.lock().clone()
        }
    }

    #[async_trait]
    impl WorkerLauncher for FakeLauncher {
        async fn launch(&self) -> Result<Arc<dyn WorkerProcess>> {
            let pid = 1000 + self.next_pid.fetch_add(1, Ordering::AcqRel);
            let worker = FakeWorker::new(pid);
            self.spawned.lock().push(worker.clone());
            Ok(worker)
        }
    }

    fn pool_config(count: usize) -> WorkerPoolConfig {
        WorkerPoolConfig {
            worker_count: count,
            memory_ceiling_mb: Some(512),
            sweep_interval_ms: 10,
        }
    }

    fn supervisor(
        launcher: Arc<FakeLauncher>,
        config: WorkerPoolConfig,
    ) -> WorkerPoolSupervisor {
        WorkerPoolSupervisor::new(launcher, config, ManualClock::starting_now()).unwrap()
    }

    #[tokio::test]
    async fn zero_worker_count_fails_fast() {
        let result = WorkerPoolSupervisor::new(
            Arc::new(FakeLauncher::default()),
            pool_config(0),
            ManualClock::starting_now(),
        );
        assert!(matches!(result, Err(OverseerError::Validation(_))));
    }

    #[tokio::test]
    async fn start_launches_the_configured_worker_count() {
        let launcher = Arc::new(FakeLauncher::default());
        let pool = supervisor(launcher.clone(), pool_config(3));

        pool.start().await.unwrap();
        assert_eq!(pool.status().active_workers, 3);
        assert_eq!(launcher.spawned().len(), 3);
    }

    #[tokio::test]
    async fn crashed_workers_are_reported_and_replaced() {
        let launcher = Arc::new(FakeLauncher::default());
        let crashed_ids: Arc<Mutex<Vec<Uuid>>> = Arc::new(Mutex::new(Vec::new()));
        let seen = crashed_ids.clone();

        let pool = supervisor(launcher.clone(), pool_config(2)).on_crash(move |handle| {
            seen.lock().push(handle.id);
        });
        pool.start().await.unwrap();

        let victim = launcher.spawned()[0].clone();
        victim.kill();

        let summary = pool.sweep().await.unwrap();
        assert_eq!(summary.crashed, 1);
        assert_eq!(pool.status().active_workers, 2);
        assert_eq!(launcher.spawned().len(), 3);
        assert_eq!(*crashed_ids.lock(), vec![victim.id]);
    }

    #[tokio::test]
    async fn unresponsive_workers_are_restarted_by_default() {
        let launcher = Arc::new(FakeLauncher::default());
        let pool = supervisor(launcher.clone(), pool_config(2));
        pool.start().await.unwrap();

        let sluggish = launcher.spawned()[1].clone();
        sluggish.responsive.store(false, Ordering::Release);

        let summary = pool.sweep().await.unwrap();
        assert_eq!(summary.restarted, 1);
        assert!(sluggish.terminated.load(Ordering::Acquire));
        assert_eq!(pool.status().active_workers, 2);
        assert!(!pool
            .status()
            .workers
            .iter()
            .any(|handle| handle.id == sluggish.id));
    }

    #[tokio::test]
    async fn memory_ceiling_breaches_fail_the_default_health_check() {
        let launcher = Arc::new(FakeLauncher::default());
        let pool = supervisor(launcher.clone(), pool_config(1));
        pool.start().await.unwrap();

        let hog = launcher.spawned()[0].clone();
        hog.memory.store(513 * 1024 * 1024, Ordering::Release);

        let summary = pool.sweep().await.unwrap();
        assert_eq!(summary.restarted, 1);
        assert!(hog.terminated.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn custom_health_check_fully_replaces_the_default() {
        let launcher = Arc::new(FakeLauncher::default());
        // Always-healthy custom check: even an unresponsive worker stays
        let pool = supervisor(launcher.clone(), pool_config(1)).with_health_check(|_| true);
        pool.start().await.unwrap();

        launcher.spawned()[0].responsive.store(false, Ordering::Release);

        let summary = pool.sweep().await.unwrap();
        assert_eq!(summary.restarted, 0);
        assert!(!launcher.spawned()[0].terminated.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn on_unhealthy_callback_suppresses_the_default_restart() {
        let launcher = Arc::new(FakeLauncher::default());
        let notified: Arc<Mutex<Vec<Uuid>>> = Arc::new(Mutex::new(Vec::new()));
        let seen = notified.clone();

        let pool = supervisor(launcher.clone(), pool_config(1)).on_unhealthy(move |handle| {
            seen.lock().push(handle.id);
        });
        pool.start().await.unwrap();

        let worker = launcher.spawned()[0].clone();
        worker.responsive.store(false, Ordering::Release);

        let summary = pool.sweep().await.unwrap();
        assert_eq!(summary.restarted, 0);
        assert_eq!(summary.unhealthy, 1);
        assert_eq!(*notified.lock(), vec![worker.id]);
        assert!(!worker.terminated.load(Ordering::Acquire));
        assert_eq!(pool.status().active_workers, 1);
    }

    #[tokio::test]
    async fn stop_terminates_workers_and_is_idempotent() {
        let launcher = Arc::new(FakeLauncher::default());
        let pool = supervisor(launcher.clone(), pool_config(2));
        pool.start().await.unwrap();

        pool.stop().await;
        assert_eq!(pool.status().active_workers, 0);
        assert!(launcher
            .spawned()
            .iter()
            .all(|worker| worker.terminated.load(Ordering::Acquire)));

        pool.stop().await;
        assert_eq!(pool.status().active_workers, 0);
    }

    #[tokio::test]
    async fn stop_interrupts_the_supervision_loop_promptly() {
        let launcher = Arc::new(FakeLauncher::default());
        let pool = Arc::new(
            WorkerPoolSupervisor::new(
                launcher,
                WorkerPoolConfig {
                    worker_count: 1,
                    memory_ceiling_mb: None,
                    sweep_interval_ms: 3_600_000,
                },
                ManualClock::starting_now(),
            )
            .unwrap(),
        );
        pool.start().await.unwrap();

        let handle = pool.spawn();
        tokio::time::sleep(Duration::from_millis(20)).await;

        pool.stop().await;
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("supervision loop should exit promptly")
            .unwrap();
    }
}
