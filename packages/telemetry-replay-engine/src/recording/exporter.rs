// packages/telemetry-replay-engine/src/recording/exporter.rs
//! Export loaded sessions for offline inspection
//!
//! Supports:
//! - JSON Lines (the wire format, one record per line; can be piped into any
//!   consumer that speaks the live protocol)
//! - Pretty JSON (session metadata plus the full message list)

use crate::protocol::codec;
use crate::protocol::message::Message;
use crate::recording::loader::LoadedSession;
use crate::recording::storage::SessionMetadata;
use crate::utils::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

/// Export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Jsonl,
    Json,
}

impl FromStr for ExportFormat {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "jsonl" | "ndjson" => Ok(ExportFormat::Jsonl),
            "json" => Ok(ExportFormat::Json),
            other => Err(EngineError::ExportFailed(format!("unknown export format '{}'", other))),
        }
    }
}

#[derive(Serialize)]
struct SessionDocument<'a> {
    metadata: &'a SessionMetadata,
    messages: &'a [Message],
}

/// Exporter for loaded sessions
pub struct Exporter {
    format: ExportFormat,
}

impl Exporter {
    pub fn new(format: ExportFormat) -> Self {
        Self { format }
    }

    pub fn export(&self, session: &LoadedSession) -> Result<String> {
        debug!(
            "Exporting {} messages of {} as {:?}",
            session.messages.len(),
            session.metadata.session_id,
            self.format
        );

        match self.format {
            ExportFormat::Jsonl => session
                .messages
                .iter()
                .map(codec::encode)
                .collect::<Result<String>>()
                .map_err(|e| EngineError::ExportFailed(e.to_string())),
            ExportFormat::Json => serde_json::to_string_pretty(&SessionDocument {
                metadata: &session.metadata,
                messages: &session.messages,
            })
            .map_err(|e| EngineError::ExportFailed(format!("JSON serialization error: {}", e))),
        }
    }
}
