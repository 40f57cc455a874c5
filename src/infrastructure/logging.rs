//! Logging system configuration and initialization
//!
//! Console logging via `tracing-subscriber` with an env-filter derived
//! from the configuration (overridable with `RUST_LOG`), plus optional
//! non-blocking file output via `tracing-appender`.

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::infrastructure::config::LoggingConfig;

// Keeps the non-blocking file writer alive for the process lifetime.
static LOG_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Initialize the logging system from configuration.
///
/// `RUST_LOG` takes precedence over the configured level so operators can
/// raise verbosity without touching the config file.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false);

    if config.file_output {
        let log_dir = Path::new(&config.log_dir);
        std::fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory: {log_dir:?}"))?;

        let file_appender = tracing_appender::rolling::daily(log_dir, "parts-grabber.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        LOG_GUARD.set(guard).ok();

        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(non_blocking);

        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(file_layer)
            .try_init()
            .context("Failed to initialize logging")?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .try_init()
            .context("Failed to initialize logging")?;
    }

    Ok(())
}
