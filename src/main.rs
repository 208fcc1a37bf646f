//! Zone monitor - watches remote playback zones and alerts on sustained outages
//!
//! Module structure:
//! - `domain/` - Core types (Zone, ZoneStatus, errors)
//! - `io/` - External interfaces (status API, persistence, notification channels, HTTP endpoint)
//! - `services/` - Monitoring engine (classifier, stability, scheduler, notifier)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;
use zone_monitor::domain::types::ZoneStatus;
use zone_monitor::infra::{Config, Metrics};
use zone_monitor::io::{
    start_status_server, HttpStatusClient, JsonFileStore, PersistenceGateway, StatusState,
};
use zone_monitor::services::{
    NotificationChain, PollingScheduler, SchedulerSettings, ZoneRegistry,
};

/// Zone monitor - status polling and outage alerting
#[derive(Parser, Debug)]
#[command(name = "zone-monitor", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for per-zone detail
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), git_hash = env!("GIT_HASH"), "zone-monitor starting");

    let args = Args::parse();
    let config = Config::load_from_path(&Config::resolve_config_path(args.config.as_deref()));

    info!(
        config_file = %config.config_file(),
        api_url = %config.api_url(),
        zones = %config.zone_ids().len(),
        main_interval_secs = %config.main_interval().as_secs(),
        priority_interval_secs = %config.priority_interval().as_secs(),
        confirmations = %config.confirmations(),
        offline_threshold_secs = %config.offline_threshold().as_secs(),
        server_port = %config.server_port(),
        persistence = ?config.persistence_path(),
        "config_loaded"
    );

    if config.zone_ids().is_empty() {
        warn!("no_zones_configured");
    }
    if !config.has_api_key() {
        warn!("status_api_key_missing");
    }

    // Zone state, optionally restored from the last run
    let mut registry = ZoneRegistry::new(config.zone_ids());
    let persistence: Option<Arc<dyn PersistenceGateway>> = match config.persistence_path() {
        Some(path) => {
            let store = Arc::new(JsonFileStore::new(path));
            match store.load_all().await {
                Ok(saved) => {
                    registry.hydrate(saved, chrono::Utc::now());
                    Some(store as Arc<dyn PersistenceGateway>)
                }
                Err(e) => {
                    warn!(error = %e, path = %path, "persistence_load_failed_memory_only");
                    None
                }
            }
        }
        None => None,
    };
    let registry = Arc::new(parking_lot::RwLock::new(registry));

    let metrics = Arc::new(Metrics::new());
    let client = Arc::new(
        HttpStatusClient::new(config.status_api()).context("Failed to build status API client")?,
    );
    let notifier = Arc::new(
        NotificationChain::from_config(&config)
            .context("Failed to build notification chain")?
            .with_metrics(metrics.clone()),
    );
    info!(channels = ?notifier.channel_names(), "notification_chain_ready");

    let mut scheduler = PollingScheduler::new(
        registry.clone(),
        client,
        notifier,
        metrics.clone(),
        SchedulerSettings::from_config(&config),
    );
    if let Some(gateway) = persistence {
        scheduler = scheduler.with_persistence(gateway);
    }

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start status/metrics HTTP server (if port > 0)
    let server_port = config.server_port();
    if server_port > 0 {
        let state = StatusState {
            registry: registry.clone(),
            metrics: metrics.clone(),
            budget: scheduler.budget(),
        };
        let server_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = start_status_server(server_port, state, server_shutdown).await {
                error!(error = %e, "status_server_error");
            }
        });
    }

    // Start metrics reporter
    let reporter_metrics = metrics.clone();
    let reporter_registry = registry.clone();
    let metrics_interval = config.metrics_interval_secs();
    let mut reporter_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let summary = reporter_registry.read().status_summary();
                    reporter_metrics.report(summary.total, summary.count(ZoneStatus::Offline)).log();
                }
                _ = reporter_shutdown.changed() => break,
            }
        }
    });

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    // Run the scheduler until shutdown or a fatal error
    let result = scheduler.run(shutdown_rx).await;
    let _ = shutdown_tx.send(true);

    match result {
        Ok(()) => {
            info!("zone-monitor shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "zone-monitor stopped");
            Err(e.into())
        }
    }
}
