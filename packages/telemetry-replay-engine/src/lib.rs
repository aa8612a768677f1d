// packages/telemetry-replay-engine/src/lib.rs
//! Telemetry Replay Engine
//!
//! Records a live, newline-delimited JSON game telemetry stream into durable
//! compressed sessions and replays them deterministically over the same wire
//! protocol, so consumers can be developed without a running game.
//!
//! # Architecture
//!
//! - **protocol**: Message model and newline-delimited JSON codec
//! - **bridge**: Live stream client and typed event dispatch
//! - **recording**: Chunked session recording, storage, loading and export
//! - **replay**: Timed playback engine and multi-client TCP server
//! - **observability**: Logging and metrics setup
//! - **utils**: Configuration and the error taxonomy

pub mod bridge;
pub mod observability;
pub mod protocol;
pub mod recording;
pub mod replay;
pub mod utils;

pub use bridge::{BridgeEvent, EventBus, EventKind, StreamClient};
pub use protocol::{Message, MessageType};
pub use recording::{Recorder, RecorderConfig, SessionLoader, SessionMetadata, SessionStore};
pub use replay::{ReplayConfig, ReplayEngine, ReplayServer, SeekTarget};
pub use utils::config::EngineConfig;
pub use utils::errors::{EngineError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
