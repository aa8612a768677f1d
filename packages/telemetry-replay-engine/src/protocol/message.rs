// packages/telemetry-replay-engine/src/protocol/message.rs
//! Telemetry message value type
//!
//! A [`Message`] is the atomic unit of the wire protocol. It is immutable once
//! built: fields are private and only exposed through accessors. The payload is
//! carried as an opaque `serde_json::Value` (key order preserved) because its
//! semantics belong to downstream consumers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Protocol version written by this engine when none is given
pub const PROTOCOL_VERSION: u32 = 1;

/// Message kinds understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    /// Periodic state snapshot
    Data,

    /// Discrete occurrence (requires `event_type`)
    Event,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Data => write!(f, "DATA"),
            MessageType::Event => write!(f, "EVENT"),
        }
    }
}

/// One telemetry record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default = "default_version")]
    version: u32,

    #[serde(rename = "type")]
    msg_type: MessageType,

    frame: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    room_index: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    event_type: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    channels: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
}

fn default_version() -> u32 {
    PROTOCOL_VERSION
}

impl Message {
    /// Periodic state message for `frame`
    pub fn data(frame: u64) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            msg_type: MessageType::Data,
            frame,
            room_index: None,
            event_type: None,
            channels: Vec::new(),
            payload: None,
        }
    }

    /// Discrete event message for `frame`
    pub fn event(frame: u64, event_type: impl Into<String>) -> Self {
        Self {
            msg_type: MessageType::Event,
            event_type: Some(event_type.into()),
            ..Self::data(frame)
        }
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn with_room_index(mut self, room_index: i64) -> Self {
        self.room_index = Some(room_index);
        self
    }

    pub fn with_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels = channels.into_iter().map(Into::into).collect();
        self
    }

    /// Attach a payload; `null` is treated as absent
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = (!payload.is_null()).then_some(payload);
        self
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn msg_type(&self) -> MessageType {
        self.msg_type
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn room_index(&self) -> Option<i64> {
        self.room_index
    }

    pub fn event_type(&self) -> Option<&str> {
        self.event_type.as_deref()
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// Check the cross-field invariants serde cannot express
    pub(crate) fn check(&self) -> std::result::Result<(), String> {
        match (self.msg_type, &self.event_type) {
            (MessageType::Event, None) => Err("EVENT message without event_type".into()),
            (MessageType::Event, Some(name)) if name.is_empty() => {
                Err("EVENT message with empty event_type".into())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_constructor_sets_type() {
        let msg = Message::event(42, "player_damaged").with_room_index(3);
        assert_eq!(msg.msg_type(), MessageType::Event);
        assert_eq!(msg.event_type(), Some("player_damaged"));
        assert_eq!(msg.room_index(), Some(3));
        assert!(msg.check().is_ok());
    }

    #[test]
    fn test_data_has_no_event_type() {
        let msg = Message::data(7)
            .with_channels(["player_position", "enemies"])
            .with_payload(json!({"player_position": {"x": 1.5, "y": -2.0}}));
        assert_eq!(msg.event_type(), None);
        assert_eq!(msg.channels(), &["player_position", "enemies"]);
        assert_eq!(msg.version(), PROTOCOL_VERSION);
    }

    #[test]
    fn test_message_type_display() {
        assert_eq!(MessageType::Data.to_string(), "DATA");
        assert_eq!(MessageType::Event.to_string(), "EVENT");
    }
}
