// packages/telemetry-replay-engine/src/bridge/mod.rs
//! Live stream bridge
//!
//! - **Events**: Typed stream events and the ordered handler registry
//! - **Client**: TCP client that decodes a telemetry stream into events

pub mod client;
pub mod events;

pub use client::{attach_recorder, SourceConfig, StreamClient, StreamStats};
pub use events::{BridgeEvent, DisconnectReason, EventBus, EventKind};
