//! # Overseer Configuration System
//!
//! Explicit configuration structs passed at construction time. There is no
//! global config facade: [`loader::ConfigManager`] loads and validates an
//! [`OverseerConfig`] once, and components receive the sections they need.

pub mod loader;

pub use loader::ConfigManager;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct OverseerConfig {
    /// Database connection settings for the persistence collaborator
    pub database: DatabaseConfig,

    /// Heartbeat tracking and stuck detection
    pub heartbeats: HeartbeatConfig,

    /// Resource ceilings enforced by the resource guard
    pub resources: ResourceLimitsConfig,

    /// Per-service circuit breaker thresholds
    pub circuit_breakers: CircuitBreakerSettings,

    /// Dead letter retry budget and retention
    pub dead_letter: DeadLetterConfig,

    /// Deployment drain polling
    pub deployment: DeploymentConfig,

    /// Worker pool sizing and health ceilings
    pub worker_pool: WorkerPoolConfig,

    /// Queue supervision allowlist/denylist
    pub queues: QueueFilterConfig,

    /// Event channel sizing
    pub events: EventsConfig,

    /// Supervision sweep cadence
    pub sweeper: SweeperConfig,
}

/// Database connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub pool: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: None, pool: 10 }
    }
}

/// Heartbeat tracking defaults; per-session overrides come from session
/// metadata (`heartbeat_interval_seconds`, `missed_threshold`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Expected seconds between beats
    pub interval_seconds: u64,
    /// Missed beats before a session is classified stuck
    pub missed_threshold: u32,
    /// Staleness multiplier used by the health monitor grace window
    pub stale_grace_multiplier: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 30,
            missed_threshold: 3,
            stale_grace_multiplier: 2,
        }
    }
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

/// Resource ceilings. `None` means unlimited and the corresponding check
/// always passes.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ResourceLimitsConfig {
    pub max_memory_mb: Option<f64>,
    pub max_cpu_percent: Option<f64>,
    pub max_disk_mb: Option<f64>,
    pub max_runtime_seconds: Option<u64>,
}

/// Thresholds for a single circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip the circuit
    pub failure_threshold: u32,
    /// Seconds the circuit stays open before admitting a probe
    pub timeout_seconds: u64,
    /// Probe successes required to close a half-open circuit
    pub success_threshold: u32,
    /// Probes admitted while half-open
    pub half_open_attempts: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout_seconds: 300,
            success_threshold: 2,
            half_open_attempts: 3,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Registry-level breaker settings: shared defaults plus per-service
/// overrides keyed by service name.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub default: CircuitBreakerConfig,
    pub services: HashMap<String, CircuitBreakerConfig>,
}

impl CircuitBreakerSettings {
    pub fn for_service(&self, service: &str) -> CircuitBreakerConfig {
        self.services.get(service).cloned().unwrap_or_else(|| self.default.clone())
    }
}

/// Dead letter behavior.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeadLetterConfig {
    /// Recorded errors at which a session is moved to the dead letter queue
    pub max_retries: u32,
    /// Default retention horizon for `prune`; 0 means never prune
    pub retention_days: u32,
    /// Queue used for retry dispatch when the entry has no recorded queue
    pub fallback_queue: String,
}

impl Default for DeadLetterConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retention_days: 0,
            fallback_queue: "default".to_string(),
        }
    }
}

/// Deployment drain polling.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeploymentConfig {
    /// Seconds between registry polls while draining
    pub poll_interval_seconds: u64,
    /// Default wait budget when the caller does not configure one
    pub default_timeout_seconds: u64,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 5,
            default_timeout_seconds: 300,
        }
    }
}

impl DeploymentConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }
}

/// Worker pool sizing and health ceilings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// Number of worker processes the pool maintains
    pub worker_count: usize,
    /// Default health check memory ceiling; `None` disables the memory term
    pub memory_ceiling_mb: Option<u64>,
    /// Milliseconds between supervision sweeps
    pub sweep_interval_ms: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            memory_ceiling_mb: Some(512),
            sweep_interval_ms: 1000,
        }
    }
}

impl WorkerPoolConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

/// Queue supervision filter. Exclusion always wins; an empty allowlist
/// supervises every queue that is not excluded.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueFilterConfig {
    pub supervised: Vec<String>,
    pub excluded: Vec<String>,
}

/// Event channel sizing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { channel_capacity: 1024 }
    }
}

/// Supervision sweep cadence.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SweeperConfig {
    pub interval_seconds: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self { interval_seconds: 30 }
    }
}

impl SweeperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

impl OverseerConfig {
    /// Validate cross-field constraints that serde defaults cannot express.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::OverseerError;

        if self.heartbeats.interval_seconds == 0 {
            return Err(OverseerError::Configuration(
                "heartbeats.interval_seconds must be greater than zero".to_string(),
            ));
        }
        if self.heartbeats.missed_threshold == 0 {
            return Err(OverseerError::Configuration(
                "heartbeats.missed_threshold must be greater than zero".to_string(),
            ));
        }
        if self.worker_pool.worker_count < 1 {
            return Err(OverseerError::Configuration(
                "worker_pool.worker_count must be at least 1".to_string(),
            ));
        }
        for (service, breaker) in &self.circuit_breakers.services {
            if breaker.failure_threshold == 0 || breaker.success_threshold == 0 {
                return Err(OverseerError::Configuration(format!(
                    "circuit breaker thresholds for '{service}' must be greater than zero"
                )));
            }
        }
        if self.circuit_breakers.default.failure_threshold == 0
            || self.circuit_breakers.default.success_threshold == 0
        {
            return Err(OverseerError::Configuration(
                "default circuit breaker thresholds must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_thresholds() {
        let config = OverseerConfig::default();
        assert_eq!(config.heartbeats.interval_seconds, 30);
        assert_eq!(config.heartbeats.missed_threshold, 3);
        assert_eq!(config.circuit_breakers.default.failure_threshold, 5);
        assert_eq!(config.circuit_breakers.default.timeout_seconds, 300);
        assert_eq!(config.circuit_breakers.default.success_threshold, 2);
        assert_eq!(config.circuit_breakers.default.half_open_attempts, 3);
        assert_eq!(config.dead_letter.max_retries, 3);
        assert_eq!(config.deployment.poll_interval_seconds, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn per_service_breaker_overrides_fall_back_to_default() {
        let mut settings = CircuitBreakerSettings::default();
        settings.services.insert(
            "payments".to_string(),
            CircuitBreakerConfig {
                failure_threshold: 2,
                ..CircuitBreakerConfig::default()
            },
        );

        assert_eq!(settings.for_service("payments").failure_threshold, 2);
        assert_eq!(settings.for_service("search").failure_threshold, 5);
    }

    #[test]
    fn zero_worker_count_fails_validation() {
        let config = OverseerConfig {
            worker_pool: WorkerPoolConfig {
                worker_count: 0,
                ..WorkerPoolConfig::default()
            },
            ..OverseerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
