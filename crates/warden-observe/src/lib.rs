//! # Warden Observe - Observability Layer
//!
//! Centralized tracing, metrics and structured logging.

use anyhow::Result;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use warden_config::ObservabilityConfig;

pub mod logging;
pub mod metrics;

pub use logging::{LogConfig, LogFormat};

/// Initialize tracing with the default filter (`info,warden=debug`
/// unless `RUST_LOG` is set)
pub fn init_tracing() -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,warden=debug"));

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true));

    // Try to init, but don't fail if already initialized
    if subscriber.try_init().is_err() {
        tracing::debug!("Tracing already initialized, skipping");
        return Ok(());
    }

    tracing::info!("Tracing initialized");
    Ok(())
}

/// Install the Prometheus recorder and describe every metric.
///
/// The returned handle renders the exposition text; serving it is left
/// to the embedding service.
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;

    metrics::init_metrics_descriptions();

    tracing::info!("Metrics recorder initialized");

    Ok(handle)
}

/// Initialize logging and, when enabled, metrics from configuration
pub fn init(config: &ObservabilityConfig) -> Result<Option<PrometheusHandle>> {
    logging::init_logging(LogConfig::from_config(config)?)?;

    if config.metrics_enabled {
        Ok(Some(init_metrics()?))
    } else {
        Ok(None)
    }
}
