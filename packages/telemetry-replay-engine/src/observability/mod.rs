// packages/telemetry-replay-engine/src/observability/mod.rs
//! Logging and metrics setup
//!
//! Logging goes through `tracing`; `RUST_LOG` overrides the configured level.
//! Metrics are recorded with the `metrics` facade everywhere and only
//! exported when a Prometheus listen address is configured.

use crate::utils::errors::{EngineError, Result};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. `info` or `telemetry_replay_engine=debug`
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Metrics export configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Address for the Prometheus scrape endpoint; disabled when unset
    pub listen_addr: Option<String>,
}

/// Install the global tracing subscriber
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            EngineError::InvalidConfig(format!("log level {:?}: {}", config.level, e))
        })?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };

    installed.map_err(|e| EngineError::InvalidConfig(format!("tracing subscriber: {}", e)))
}

/// Start the Prometheus exporter if an address is configured
///
/// Returns the bound scrape address, or `None` when export is disabled.
pub fn init_metrics(config: &MetricsConfig) -> Result<Option<SocketAddr>> {
    let Some(listen_addr) = config.listen_addr.as_deref() else {
        return Ok(None);
    };
    let addr: SocketAddr = listen_addr.parse().map_err(|e| {
        EngineError::InvalidConfig(format!("metrics listen address {:?}: {}", listen_addr, e))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| EngineError::InvalidConfig(format!("prometheus exporter: {}", e)))?;
    register_metrics();

    info!("Prometheus metrics exported on http://{}/metrics", addr);
    Ok(Some(addr))
}

fn register_metrics() {
    describe_counter!(
        "replay_messages_recorded_total",
        "Messages appended to a recording session"
    );
    describe_counter!(
        "replay_invalid_messages_total",
        "Records skipped because they failed to decode"
    );
    describe_counter!("replay_chunks_written_total", "Chunk files persisted");
    describe_counter!(
        "replay_chunk_bytes_written_total",
        "Compressed bytes persisted in chunk files"
    );
    describe_counter!(
        "replay_messages_sent_total",
        "Messages delivered to replay clients"
    );
    describe_gauge!("replay_clients_active", "Connected replay clients");
}
