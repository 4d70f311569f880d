//! # Resource Guard
//!
//! Samples memory/CPU/disk usage for supervised sessions and compares each
//! point-in-time measurement against the configured ceilings. Every observed
//! breach appends a violation row and emits an event; deduplication and
//! rate-limiting are the alerting collaborator's concern.

use parking_lot::Mutex;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use sysinfo::System;
use tracing::warn;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::ResourceLimitsConfig;
use crate::error::{OverseerError, Result};
use crate::events::{EventPublisher, SupervisionEvent};
use crate::models::{ResourceViolation, SupervisionSession, ViolationKind};
use crate::store::SupervisionStore;

/// Point-in-time resource usage for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceSample {
    pub memory_mb: f64,
    pub cpu_percent: f64,
    pub disk_mb: f64,
}

/// Source of resource measurements.
pub trait ResourceSampler: Send + Sync + fmt::Debug {
    fn sample(&self, session: &SupervisionSession) -> ResourceSample;
}

/// Production sampler backed by `sysinfo`, resolving the process id from
/// session metadata. Sessions without a recorded pid sample as zero usage.
#[derive(Debug)]
pub struct SystemSampler {
    system: Mutex<System>,
}

impl SystemSampler {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSampler for SystemSampler {
    fn sample(&self, session: &SupervisionSession) -> ResourceSample {
        let Some(pid) = session.pid() else {
            return ResourceSample::default();
        };

        let pid = sysinfo::Pid::from_u32(pid);
        let mut system = self.system.lock();
        system.refresh_process(pid);

        match system.process(pid) {
            Some(process) => {
                let disk = process.disk_usage();
                ResourceSample {
                    memory_mb: process.memory() as f64 / (1024.0 * 1024.0),
                    cpu_percent: f64::from(process.cpu_usage()),
                    disk_mb: (disk.total_written_bytes + disk.total_read_bytes) as f64
                        / (1024.0 * 1024.0),
                }
            }
            None => ResourceSample::default(),
        }
    }
}

/// Sampler returning a configurable fixed measurement, for tests.
#[derive(Debug, Default)]
pub struct FixedSampler {
    sample: RwLock<ResourceSample>,
}

impl FixedSampler {
    pub fn new(sample: ResourceSample) -> Self {
        Self {
            sample: RwLock::new(sample),
        }
    }

    pub fn set(&self, sample: ResourceSample) {
        *self.sample.write() = sample;
    }
}

impl ResourceSampler for FixedSampler {
    fn sample(&self, _session: &SupervisionSession) -> ResourceSample {
        *self.sample.read()
    }
}

/// Result of comparing one measurement against its ceiling.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitCheck {
    pub kind: ViolationKind,
    pub within_limit: bool,
    pub current: f64,
    pub limit: Option<f64>,
}

#[derive(Debug)]
pub struct ResourceGuard {
    store: Arc<SupervisionStore>,
    config: ResourceLimitsConfig,
    sampler: Arc<dyn ResourceSampler>,
    clock: Arc<dyn Clock>,
    events: EventPublisher,
}

impl ResourceGuard {
    pub fn new(
        store: Arc<SupervisionStore>,
        config: ResourceLimitsConfig,
        sampler: Arc<dyn ResourceSampler>,
        clock: Arc<dyn Clock>,
        events: EventPublisher,
    ) -> Self {
        Self {
            store,
            config,
            sampler,
            clock,
            events,
        }
    }

    pub fn check_memory(&self, session_id: Uuid) -> Result<LimitCheck> {
        let session = self.session(session_id)?;
        let sample = self.sampler.sample(&session);
        Ok(self.evaluate(session_id, ViolationKind::Memory, sample.memory_mb, self.config.max_memory_mb))
    }

    pub fn check_cpu(&self, session_id: Uuid) -> Result<LimitCheck> {
        let session = self.session(session_id)?;
        let sample = self.sampler.sample(&session);
        Ok(self.evaluate(session_id, ViolationKind::Cpu, sample.cpu_percent, self.config.max_cpu_percent))
    }

    pub fn check_disk(&self, session_id: Uuid) -> Result<LimitCheck> {
        let session = self.session(session_id)?;
        let sample = self.sampler.sample(&session);
        Ok(self.evaluate(session_id, ViolationKind::Disk, sample.disk_mb, self.config.max_disk_mb))
    }

    /// Wall-clock runtime ceiling; sessions running longer than the limit
    /// record a `Time` violation.
    pub fn check_runtime(&self, session_id: Uuid) -> Result<LimitCheck> {
        let session = self.session(session_id)?;
        let elapsed = (self.clock.now() - session.started_at).num_seconds().max(0) as f64;
        Ok(self.evaluate(
            session_id,
            ViolationKind::Time,
            elapsed,
            self.config.max_runtime_seconds.map(|s| s as f64),
        ))
    }

    /// Logical AND of the memory, CPU, and disk checks. Each check is still
    /// individually recorded and emitted even when another also breaches.
    pub fn is_within_limits(&self, session_id: Uuid) -> Result<bool> {
        let memory = self.check_memory(session_id)?;
        let cpu = self.check_cpu(session_id)?;
        let disk = self.check_disk(session_id)?;
        Ok(memory.within_limit && cpu.within_limit && disk.within_limit)
    }

    /// First breaching check among memory/CPU/disk, if any.
    pub fn first_breach(&self, session_id: Uuid) -> Result<Option<LimitCheck>> {
        for check in [
            self.check_memory(session_id)?,
            self.check_cpu(session_id)?,
            self.check_disk(session_id)?,
        ] {
            if !check.within_limit {
                return Ok(Some(check));
            }
        }
        Ok(None)
    }

    pub fn violations_for(&self, session_id: Uuid) -> Vec<ResourceViolation> {
        self.store.violations_for(session_id)
    }

    fn session(&self, session_id: Uuid) -> Result<SupervisionSession> {
        self.store
            .session(session_id)
            .ok_or(OverseerError::SessionNotFound(session_id))
    }

    fn evaluate(
        &self,
        session_id: Uuid,
        kind: ViolationKind,
        current: f64,
        limit: Option<f64>,
    ) -> LimitCheck {
        // A boundary measurement equal to the limit is within it
        let within_limit = limit.map(|limit| current <= limit).unwrap_or(true);

        if !within_limit {
            let limit = limit.unwrap_or_default();

            warn!(
                session_id = %session_id,
                kind = %kind,
                limit,
                actual = current,
                "resource ceiling breached"
            );

            self.store.record_violation(ResourceViolation {
                session_id,
                kind,
                limit,
                actual: current,
                detected_at: self.clock.now(),
            });

            self.events.publish(SupervisionEvent::ResourceViolationDetected {
                session_id,
                kind,
                limit,
                actual: current,
            });
        }

        LimitCheck {
            kind,
            within_limit,
            current,
            limit,
        }
    }
}
