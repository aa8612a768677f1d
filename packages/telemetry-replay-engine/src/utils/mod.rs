// packages/telemetry-replay-engine/src/utils/mod.rs
//! Shared utilities
//!
//! - **errors**: Engine-wide error taxonomy and `Result` alias
//! - **config**: Layered configuration (file + environment)

pub mod config;
pub mod errors;

pub use config::EngineConfig;
pub use errors::{EngineError, Result};
