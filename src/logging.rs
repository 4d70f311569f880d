//! # Structured Logging
//!
//! Environment-aware structured logging that outputs to console and,
//! optionally, to a JSON log file for post-hoc inspection of supervision
//! sweeps and state transitions.

use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific defaults.
///
/// Console output is always enabled; when `OVERSEER_LOG_DIR` is set a JSON
/// file layer is added alongside it. Safe to call more than once.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = detect_environment();
        let log_level = default_log_level(&environment);

        let console_layer = fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_ansi(true)
            .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.clone())));

        let registry = tracing_subscriber::registry().with(console_layer);

        if let Ok(dir) = std::env::var("OVERSEER_LOG_DIR") {
            let log_dir = PathBuf::from(dir);
            if !log_dir.exists() {
                let _ = fs::create_dir_all(&log_dir);
            }

            let filename = format!("overseer.{}.{}.log", environment, process::id());
            let file_appender = tracing_appender::rolling::never(&log_dir, filename);
            let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

            let file_layer = fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .json()
                .with_filter(EnvFilter::new(log_level));

            if registry.with(file_layer).try_init().is_ok() {
                // Keep the appender guard alive for the process lifetime
                std::mem::forget(guard);
            }
        } else if registry.try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized");
        }
    });
}

/// Get current environment from environment variables
fn detect_environment() -> String {
    std::env::var("OVERSEER_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn default_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}
