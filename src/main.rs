//! parts-grabber process entry point
//!
//! Bootstraps configuration and logging, wires the pipeline together,
//! and runs the scheduler loop until Ctrl-C. Exit code 1 signals an
//! unrecoverable startup or loop-fatal error.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use parts_grabber::application::{Dispatcher, ParserRegistry, Reconciler, Scheduler};
use parts_grabber::infrastructure::health::SourceHealthChecker;
use parts_grabber::infrastructure::images::ImageAcquirer;
use parts_grabber::infrastructure::{
    ApiClient, AppConfig, ConfigManager, ProxyClientPool, ProxyGate, init_logging,
};

#[tokio::main]
async fn main() {
    let config = match load_config().await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e:#}");
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("failed to initialize logging: {e:#}");
        std::process::exit(1);
    }

    let cancel = CancellationToken::new();
    spawn_stop_signal(cancel.clone());

    match run(config, cancel).await {
        Ok(()) => {
            info!("normal termination");
        }
        Err(e) => {
            error!("fatal error: {e:#}");
            std::process::exit(1);
        }
    }
}

/// Configuration path comes from the first CLI argument when given,
/// otherwise the per-user config directory.
async fn load_config() -> Result<AppConfig> {
    let manager = match std::env::args().nth(1) {
        Some(path) => ConfigManager::with_path(PathBuf::from(path)),
        None => ConfigManager::new()?,
    };
    manager.load_config().await
}

/// Cancel the token on Ctrl-C; the scheduler notices between iterations.
fn spawn_stop_signal(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("stop signal received, finishing current iteration");
            cancel.cancel();
        }
    });
}

async fn run(config: AppConfig, cancel: CancellationToken) -> Result<()> {
    let api = Arc::new(ApiClient::new(config.api.clone())?);
    let gate = Arc::new(ProxyGate::new(config.proxies.max_concurrent_per_proxy));
    let clients = Arc::new(ProxyClientPool::new(
        config.proxies.user_agent.clone(),
        Duration::from_secs(config.scrape.request_timeout_seconds),
    ));

    let health = SourceHealthChecker::new(
        Arc::clone(&gate),
        Arc::clone(&clients),
        Duration::from_secs(config.proxies.probe_timeout_seconds),
        Duration::from_millis(config.scrape.lease_wait_ms),
    );
    let dispatcher = Dispatcher::new(
        ParserRegistry::with_builtin(),
        Arc::clone(&gate),
        Arc::clone(&clients),
        Duration::from_secs(config.scrape.request_timeout_seconds),
        Duration::from_millis(config.scrape.lease_wait_ms),
    );
    let images = ImageAcquirer::new(
        config.images.root_dir.clone(),
        Duration::from_secs(config.images.download_timeout_seconds),
    )?;
    let reconciler = Reconciler::new(Arc::clone(&api), images);

    let scheduler = Scheduler::new(
        api,
        health,
        dispatcher,
        reconciler,
        Duration::from_secs(config.scheduler.interval_seconds),
        Duration::from_millis(config.scheduler.idle_tick_ms),
        config.sources.reactivate_on_probe,
        cancel,
    );

    info!("press Ctrl-C to stop");
    scheduler.run().await
}
