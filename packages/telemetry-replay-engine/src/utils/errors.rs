// packages/telemetry-replay-engine/src/utils/errors.rs
//! Engine error types
//!
//! Capture-path errors (`InvalidMessage`) are local and non-fatal: the record is
//! skipped and counted. Load-path errors (`NotFound`, `CorruptChunk`) abort the
//! whole load. Replay errors never cross from one client to another.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the engine
pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or unrecognized wire record
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// API misuse (e.g. recording after stop)
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Unknown session id or missing session directory
    #[error("session not found: {0}")]
    NotFound(String),

    /// A chunk failed to decompress or parse during load
    #[error("corrupt chunk {index} at {}: {reason}", .path.display())]
    CorruptChunk {
        path: PathBuf,
        index: u32,
        reason: String,
    },

    /// Seek target beyond the sequence bounds
    #[error("seek target {target} out of range (sequence length {len})")]
    OutOfRange { target: String, len: usize },

    /// Client disconnected during replay
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("compression failed: {0}")]
    CompressionFailed(String),

    #[error("storage failed: {0}")]
    StorageFailed(String),

    #[error("export failed: {0}")]
    ExportFailed(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Whether the error only affects a single record and capture may continue
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EngineError::InvalidMessage(_))
    }
}
