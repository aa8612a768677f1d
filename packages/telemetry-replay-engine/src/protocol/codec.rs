// packages/telemetry-replay-engine/src/protocol/codec.rs
//! Newline-delimited JSON wire codec
//!
//! Each record is one compact JSON object terminated by `\n`. Compact JSON
//! never contains a raw newline (string contents are escaped), so the newline
//! is an unambiguous delimiter.

use crate::protocol::message::Message;
use crate::utils::errors::{EngineError, Result};
use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};
use tracing::trace;

/// Upper bound on a single wire record
pub const MAX_LINE_LENGTH: usize = 8 * 1024 * 1024;

/// Encode a message as one wire line (including the trailing newline)
pub fn encode(message: &Message) -> Result<String> {
    let mut line = serde_json::to_string(message)
        .map_err(|e| EngineError::InvalidMessage(format!("serialization error: {}", e)))?;
    line.push('\n');
    Ok(line)
}

/// Decode a single wire line (with or without its terminator)
pub fn decode_line(line: &str) -> Result<Message> {
    let line = line.trim_end_matches(|c: char| c == '\n' || c == '\r');
    if line.trim().is_empty() {
        return Err(EngineError::InvalidMessage("empty record".into()));
    }

    let message: Message =
        serde_json::from_str(line).map_err(|e| EngineError::InvalidMessage(e.to_string()))?;
    message.check().map_err(EngineError::InvalidMessage)?;

    Ok(message)
}

/// Consume exactly one complete record from the front of `buf`
///
/// Returns `Ok(None)` when no full record is buffered yet; the caller keeps
/// the remaining bytes and retries once more data arrives. Blank lines are
/// skipped. On `Err` the offending record has already been consumed, so the
/// caller can continue with the next one.
pub fn decode(buf: &mut BytesMut) -> Result<Option<Message>> {
    loop {
        let Some(newline) = buf.iter().position(|b| *b == b'\n') else {
            return Ok(None);
        };

        let record = buf.split_to(newline + 1);
        let text = std::str::from_utf8(&record)
            .map_err(|e| EngineError::InvalidMessage(format!("invalid UTF-8: {}", e)))?;

        if text.trim().is_empty() {
            continue;
        }

        return decode_line(text).map(Some);
    }
}

/// `tokio_util` codec for framed wire streams
///
/// Decoded items are themselves `Result`s: a malformed record yields
/// `Some(Err(InvalidMessage))` and the stream keeps going, while transport
/// failures surface as the decoder error and end the stream.
#[derive(Debug)]
pub struct MessageCodec {
    lines: LinesCodec,
}

impl MessageCodec {
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_length),
        }
    }

    fn map_line(
        result: std::result::Result<Option<String>, LinesCodecError>,
    ) -> Result<Option<Result<Message>>> {
        match result {
            Ok(Some(line)) => {
                trace!("Decoding record of {} bytes", line.len());
                Ok(Some(decode_line(&line)))
            }
            Ok(None) => Ok(None),
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Err(
                EngineError::InvalidMessage("record exceeds maximum line length".into()),
            ))),
            // The offending line has already been consumed.
            Err(LinesCodecError::Io(e)) if e.kind() == std::io::ErrorKind::InvalidData => Ok(Some(
                Err(EngineError::InvalidMessage(format!("invalid UTF-8: {}", e))),
            )),
            Err(LinesCodecError::Io(e)) => Err(EngineError::Io(e)),
        }
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MessageCodec {
    type Item = Result<Message>;
    type Error = EngineError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            match self.lines.decode(src) {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                other => return Self::map_line(other),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            match self.lines.decode_eof(src) {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                other => return Self::map_line(other),
            }
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = EngineError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        serde_json::to_writer(dst.writer(), &item)
            .map_err(|e| EngineError::InvalidMessage(format!("serialization error: {}", e)))?;
        dst.put_u8(b'\n');
        Ok(())
    }
}
