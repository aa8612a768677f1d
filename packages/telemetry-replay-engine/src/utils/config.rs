// packages/telemetry-replay-engine/src/utils/config.rs
//! Engine configuration
//!
//! Layered with the `config` crate: an optional `config/engine.{toml,yaml,json}`
//! file first, then `REPLAY__`-prefixed environment variables
//! (e.g. `REPLAY__SERVER__PORT=9000`).

use crate::bridge::client::SourceConfig;
use crate::observability::{LoggingConfig, MetricsConfig};
use crate::recording::recorder::RecorderConfig;
use crate::replay::engine::ReplayConfig;
use crate::replay::server::ServerConfig;
use crate::utils::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_CONFIG_FILE: &str = "config/engine";
const ENV_PREFIX: &str = "REPLAY";

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub recorder: RecorderConfig,
    pub replay: ReplayConfig,
    pub server: ServerConfig,
    pub source: SourceConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

impl EngineConfig {
    /// Load configuration from the default file location and environment
    pub fn load() -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name(DEFAULT_CONFIG_FILE).required(false));
        Self::build(builder)
    }

    /// Load configuration from an explicit file, still honoring environment overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(true));
        Self::build(builder)
    }

    fn build(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self> {
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| EngineError::InvalidConfig(e.to_string()))?;

        let config: EngineConfig = settings
            .try_deserialize()
            .map_err(|e| EngineError::InvalidConfig(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.recorder.chunk_rotation_size == 0 {
            return Err(EngineError::InvalidConfig(
                "recorder.chunk_rotation_size must be at least 1".into(),
            ));
        }
        self.replay.validate()?;
        if self.server.host.is_empty() {
            return Err(EngineError::InvalidConfig("server.host must not be empty".into()));
        }
        Ok(())
    }
}
