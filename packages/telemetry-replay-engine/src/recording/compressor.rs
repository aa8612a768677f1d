// packages/telemetry-replay-engine/src/recording/compressor.rs
//! zstd compression for chunk files
//!
//! Chunk documents are serialized straight into the zstd stream (and parsed
//! straight out of it) so a chunk never exists uncompressed in memory as a
//! whole.

use crate::utils::errors::{EngineError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use tracing::trace;

/// Compression levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    /// zstd level 1
    Fast,

    /// zstd level 3
    #[default]
    Balanced,

    /// zstd level 19
    Best,
}

impl CompressionLevel {
    pub fn as_i32(&self) -> i32 {
        match self {
            CompressionLevel::Fast => 1,
            CompressionLevel::Balanced => 3,
            CompressionLevel::Best => 19,
        }
    }
}

/// Chunk compressor using zstd
#[derive(Debug, Clone, Copy, Default)]
pub struct Compressor {
    level: CompressionLevel,
}

impl Compressor {
    pub fn new(level: CompressionLevel) -> Self {
        Self { level }
    }

    pub fn level(&self) -> CompressionLevel {
        self.level
    }

    /// Serialize `value` as JSON into a compressed buffer
    pub fn encode_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        let failed = |e: std::io::Error| EngineError::CompressionFailed(e.to_string());

        let mut encoder = zstd::stream::Encoder::new(Vec::new(), self.level.as_i32()).map_err(failed)?;
        serde_json::to_writer(&mut encoder, value)
            .map_err(|e| EngineError::StorageFailed(format!("chunk serialization: {}", e)))?;
        let compressed = encoder.finish().map_err(failed)?;

        trace!("Encoded chunk document to {} bytes", compressed.len());
        Ok(compressed)
    }

    /// Parse a JSON document out of a compressed buffer
    ///
    /// Both a broken zstd frame and malformed JSON are reported as
    /// `CompressionFailed`; callers attach the chunk context.
    pub fn decode_json<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        let decoder = zstd::stream::Decoder::new(data)
            .map_err(|e| EngineError::CompressionFailed(e.to_string()))?;
        serde_json::from_reader(decoder).map_err(|e| EngineError::CompressionFailed(e.to_string()))
    }

    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = zstd::stream::Encoder::new(Vec::with_capacity(data.len() / 4), self.level.as_i32())
            .map_err(|e| EngineError::CompressionFailed(e.to_string()))?;
        encoder
            .write_all(data)
            .map_err(|e| EngineError::CompressionFailed(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| EngineError::CompressionFailed(e.to_string()))
    }

    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        zstd::stream::Decoder::new(data)
            .and_then(|mut decoder| decoder.read_to_end(&mut out))
            .map_err(|e| EngineError::CompressionFailed(e.to_string()))?;
        Ok(out)
    }
}
