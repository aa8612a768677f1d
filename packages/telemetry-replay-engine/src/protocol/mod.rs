// packages/telemetry-replay-engine/src/protocol/mod.rs
//! Wire protocol
//!
//! - **Message**: Immutable telemetry record
//! - **Codec**: Newline-delimited JSON encoding, incremental decoding and a
//!   `tokio_util` framing codec

pub mod codec;
pub mod message;

pub use codec::{decode, decode_line, encode, MessageCodec};
pub use message::{Message, MessageType, PROTOCOL_VERSION};
