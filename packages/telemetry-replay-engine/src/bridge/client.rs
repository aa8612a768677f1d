// packages/telemetry-replay-engine/src/bridge/client.rs
//! Live stream client
//!
//! Connects to a telemetry source, decodes newline-delimited records and
//! dispatches them through an [`EventBus`]. Malformed records are reported as
//! [`BridgeEvent::InvalidMessage`] and skipped; the stream keeps going.

use crate::bridge::events::{BridgeEvent, DisconnectReason, EventBus, EventKind};
use crate::protocol::codec::MessageCodec;
use crate::recording::recorder::Recorder;
use crate::utils::errors::{EngineError, Result};
use futures::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Where the live telemetry source listens
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub host: String,
    pub port: u16,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9999,
        }
    }
}

/// Counters for one client run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamStats {
    pub messages: u64,
    pub invalid: u64,
    pub disconnect: DisconnectReason,
}

/// Client for a live (or replayed) telemetry stream
#[derive(Debug)]
pub struct StreamClient {
    config: SourceConfig,
    bus: EventBus,
}

impl StreamClient {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config,
            bus: EventBus::new(),
        }
    }

    pub fn with_bus(config: SourceConfig, bus: EventBus) -> Self {
        Self { config, bus }
    }

    pub fn bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    /// Connect and dispatch events until the source closes or `cancel` fires
    ///
    /// Fails only if the connection cannot be established; a drop after that
    /// is reported in the returned stats and through a `Disconnected` event.
    pub async fn run(&self, cancel: CancellationToken) -> Result<StreamStats> {
        let address = format!("{}:{}", self.config.host, self.config.port);
        let stream = TcpStream::connect(&address)
            .await
            .map_err(|e| EngineError::ConnectionLost(format!("connect to {}: {}", address, e)))?;
        let peer = stream.peer_addr()?;
        info!("Connected to telemetry source {}", peer);
        self.bus.emit(&BridgeEvent::Connected { peer });

        let mut frames = FramedRead::new(stream, MessageCodec::new());
        let mut messages = 0u64;
        let mut invalid = 0u64;

        let reason = loop {
            tokio::select! {
                _ = cancel.cancelled() => break DisconnectReason::Cancelled,
                item = frames.next() => match item {
                    Some(Ok(Ok(message))) => {
                        messages += 1;
                        self.bus.emit(&BridgeEvent::Message(message));
                    }
                    Some(Ok(Err(e))) => {
                        invalid += 1;
                        warn!("Invalid record from {}: {}", peer, e);
                        self.bus.emit(&BridgeEvent::InvalidMessage { error: e.to_string() });
                    }
                    Some(Err(e)) => {
                        error!("Stream from {} failed: {}", peer, e);
                        break DisconnectReason::Error(e.to_string());
                    }
                    None => break DisconnectReason::EndOfStream,
                }
            }
        };

        info!(
            "Disconnected from {} ({}): {} messages, {} invalid",
            peer, reason, messages, invalid
        );
        self.bus.emit(&BridgeEvent::Disconnected {
            reason: reason.clone(),
        });

        Ok(StreamStats {
            messages,
            invalid,
            disconnect: reason,
        })
    }
}

/// Route decoded messages (and skipped records) from `bus` into `recorder`
///
/// Handlers run on the receiving task, so a chunk write blocks reads for its
/// duration. Record failures are logged; the stream is not interrupted.
pub fn attach_recorder(bus: &mut EventBus, recorder: Arc<Mutex<Recorder>>) {
    let sink = Arc::clone(&recorder);
    bus.on_message(move |message| {
        if let Err(e) = sink.lock().record(message.clone()) {
            error!("Failed to record frame {}: {}", message.frame(), e);
        }
    });
    bus.on(EventKind::InvalidMessage, move |event| {
        if let BridgeEvent::InvalidMessage { error } = event {
            recorder
                .lock()
                .note_invalid(&EngineError::InvalidMessage(error.clone()));
        }
    });
}
