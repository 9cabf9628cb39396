// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parley serve` command implementation.
//!
//! Connects the configured state and record stores, builds the engine,
//! optionally exposes Prometheus metrics, and runs the expiry sweeper until
//! a shutdown signal arrives.

use std::sync::Arc;

use parley_config::model::{MetricsConfig, ParleyConfig};
use parley_core::{ParleyError, RecordStore};
use parley_engine::{Engine, EngineEvent, shutdown};
use parley_storage::SqliteRecords;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Runs the `parley serve` command.
pub async fn run_serve(config: ParleyConfig) -> Result<(), ParleyError> {
    init_tracing(&config.service.log_level);
    info!(name = %config.service.name, "parley starting");

    start_metrics(&config.metrics);

    let store = parley_state::connect(&config.state).await?;
    let records = SqliteRecords::new(config.storage.clone());
    records.initialize().await?;
    let records: Arc<dyn RecordStore> = Arc::new(records);

    let engine = Engine::new(config.engine.clone(), store, records);
    let cancel = shutdown::install_signal_handler();

    let logger = tokio::spawn(log_events(engine.clone(), cancel.clone()));

    if config.worker.enabled {
        let sweeper = engine.sweeper(config.worker.sweep_interval());
        sweeper.run(cancel.clone()).await;
    } else {
        info!("expiry worker disabled, waiting for shutdown");
        cancel.cancelled().await;
    }

    if let Err(e) = logger.await {
        warn!(error = %e, "event logger task failed");
    }
    engine.shutdown().await?;
    info!("parley serve shutdown complete");
    Ok(())
}

/// Logs engine events until shutdown. A transport layer subscribes the
/// same way to turn them into notifications.
async fn log_events(engine: Engine, cancel: CancellationToken) {
    let mut events = engine.subscribe();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Ok(EngineEvent::DialogEnded { dialog_id, reason, .. }) => {
                    debug!(%dialog_id, %reason, "dialog ended");
                }
                Ok(EngineEvent::UserBanned { user, until }) => {
                    debug!(%user, %until, "user banned");
                }
                Ok(event) => debug!(?event, "engine event"),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event logger lagged behind");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
}

#[cfg(feature = "prometheus")]
fn start_metrics(metrics: &MetricsConfig) {
    if !metrics.enabled {
        debug!("prometheus metrics disabled by configuration");
        return;
    }
    if let Err(e) = install_prometheus(&metrics.bind_address) {
        warn!(error = %e, "prometheus initialization failed, continuing without metrics");
    }
}

#[cfg(not(feature = "prometheus"))]
fn start_metrics(metrics: &MetricsConfig) {
    if metrics.enabled {
        warn!("metrics.enabled is set but parley was built without the `prometheus` feature");
    }
}

#[cfg(feature = "prometheus")]
fn install_prometheus(bind_address: &str) -> Result<(), ParleyError> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let addr: std::net::SocketAddr = bind_address
        .parse()
        .map_err(|e| ParleyError::Config(format!("invalid metrics.bind_address: {e}")))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| ParleyError::Internal(format!("failed to install Prometheus exporter: {e}")))?;

    parley_engine::recording::register_metrics();
    info!(%addr, "prometheus metrics exporter listening");
    Ok(())
}

/// Initialize the tracing subscriber with the configured log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("parley={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
