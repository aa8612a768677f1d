// packages/telemetry-replay-engine/src/replay/mod.rs
//! Deterministic replay
//!
//! - **Engine**: Timed, controllable playback (pause/resume/seek/loop/speed)
//! - **Server**: TCP listener serving one independent engine per client
//!
//! # Timing
//!
//! The gap before each message is `(frame - previous_frame) / tick_rate / speed`
//! seconds. Messages sharing a frame are sent back-to-back; the first message
//! after a start, seek or loop wrap is sent immediately.

pub mod engine;
pub mod server;

pub use engine::{ReplayConfig, ReplayEngine, ReplayHandle, RunState, SeekTarget};
pub use server::{ClientSummary, ReplayServer, ServerConfig};
