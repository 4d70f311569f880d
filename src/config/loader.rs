//! Configuration Loader
//!
//! Environment-aware configuration loading. Discovers a base file plus an
//! optional environment-specific override, then applies `OVERSEER_*`
//! environment variables on top. Missing files fall back to documented
//! defaults so embedding the core never requires a config directory.

use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::OverseerConfig;
use crate::error::{OverseerError, Result};

/// Loads and holds the validated configuration for one process.
#[derive(Debug)]
pub struct ConfigManager {
    config: OverseerConfig,
    environment: String,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection from the default
    /// `config/` directory.
    pub fn load() -> Result<Arc<ConfigManager>> {
        Self::load_from_directory(Path::new("config"))
    }

    /// Load configuration from a specific directory.
    pub fn load_from_directory(config_dir: &Path) -> Result<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with an explicit
    /// environment, useful for tests that must not mutate process env vars.
    pub fn load_from_directory_with_env(
        config_dir: &Path,
        environment: &str,
    ) -> Result<Arc<ConfigManager>> {
        let base = config_dir.join("overseer.yaml");
        let overlay = config_dir.join(format!("overseer.{environment}.yaml"));

        debug!(
            environment,
            base = %base.display(),
            "loading supervision configuration"
        );

        let config = Self::build(&base, &overlay)?;
        config.validate()?;

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
        }))
    }

    /// Build a manager directly from an in-memory config (embedders, tests).
    pub fn from_config(config: OverseerConfig) -> Result<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
        }))
    }

    fn build(base: &Path, overlay: &Path) -> Result<OverseerConfig> {
        let settings = config::Config::builder()
            .add_source(config::File::from(base.to_path_buf()).required(false))
            .add_source(config::File::from(overlay.to_path_buf()).required(false))
            .add_source(config::Environment::with_prefix("OVERSEER").separator("__"))
            .build()
            .map_err(|e| OverseerError::Configuration(e.to_string()))?;

        settings
            .try_deserialize::<OverseerConfig>()
            .map_err(|e| OverseerError::Configuration(e.to_string()))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &OverseerConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    fn detect_environment() -> String {
        std::env::var("OVERSEER_ENV")
            .or_else(|_| std::env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }
}
