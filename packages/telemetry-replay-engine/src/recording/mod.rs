// packages/telemetry-replay-engine/src/recording/mod.rs
//! Session recording and storage
//!
//! - **Recorder**: Buffers live messages and rotates them into chunk files
//! - **Compressor**: zstd chunk compression
//! - **Storage**: Session directory layout, metadata and durable writes
//! - **Loader**: Rebuilds the ordered message sequence of a session
//! - **Exporter**: Export to JSON Lines or JSON
//!
//! # Architecture
//!
//! ```text
//! live source → record() → buffer (chunk_rotation_size messages)
//!                              ↓ size-triggered rotation
//!                          serialize {"messages": [...]}
//!                              ↓
//!                          compress (zstd)
//!                              ↓
//!                          write tmp → fsync → rename
//!                              ↓
//!                 <root>/<session_id>/<session_id>_chunk_NNNN.json.zst
//! ```

pub mod compressor;
pub mod exporter;
pub mod loader;
pub mod recorder;
pub mod storage;

pub use compressor::{CompressionLevel, Compressor};
pub use exporter::{ExportFormat, Exporter};
pub use loader::{LoadedSession, SessionLoader};
pub use recorder::{Recorder, RecorderConfig, RecorderState, RecorderStats};
pub use storage::{SessionMetadata, SessionStore};
