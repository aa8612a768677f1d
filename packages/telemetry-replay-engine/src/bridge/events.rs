// packages/telemetry-replay-engine/src/bridge/events.rs
//! Typed stream events and handler registry
//!
//! Handlers are registered per [`EventKind`] and invoked synchronously, in
//! registration order, on the task that receives the stream.

use crate::protocol::message::Message;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

/// Event kinds a handler can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Disconnected,
    Message,
    InvalidMessage,
}

/// Why a stream ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The source closed the connection
    EndOfStream,
    /// Local cancellation
    Cancelled,
    /// Transport failure
    Error(String),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::EndOfStream => write!(f, "end of stream"),
            DisconnectReason::Cancelled => write!(f, "cancelled"),
            DisconnectReason::Error(e) => write!(f, "error: {}", e),
        }
    }
}

/// An event observed on a telemetry stream
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    Connected { peer: SocketAddr },
    Disconnected { reason: DisconnectReason },
    Message(Message),
    InvalidMessage { error: String },
}

impl BridgeEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            BridgeEvent::Connected { .. } => EventKind::Connected,
            BridgeEvent::Disconnected { .. } => EventKind::Disconnected,
            BridgeEvent::Message(_) => EventKind::Message,
            BridgeEvent::InvalidMessage { .. } => EventKind::InvalidMessage,
        }
    }
}

type Handler = Box<dyn Fn(&BridgeEvent) + Send + Sync>;

/// Maps event kinds to ordered handler lists
#[derive(Default)]
pub struct EventBus {
    handlers: HashMap<EventKind, Vec<Handler>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events of `kind`
    pub fn on<F>(&mut self, kind: EventKind, handler: F)
    where
        F: Fn(&BridgeEvent) + Send + Sync + 'static,
    {
        self.handlers.entry(kind).or_default().push(Box::new(handler));
    }

    /// Register a handler that receives decoded messages directly
    pub fn on_message<F>(&mut self, handler: F)
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.on(EventKind::Message, move |event| {
            if let BridgeEvent::Message(message) = event {
                handler(message);
            }
        });
    }

    /// Invoke every handler registered for the event's kind; returns how many ran
    pub fn emit(&self, event: &BridgeEvent) -> usize {
        let Some(handlers) = self.handlers.get(&event.kind()) else {
            return 0;
        };
        for handler in handlers {
            handler(event);
        }
        handlers.len()
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut counts: Vec<(EventKind, usize)> =
            self.handlers.iter().map(|(kind, list)| (*kind, list.len())).collect();
        counts.sort_by_key(|(kind, _)| *kind as u8);
        f.debug_struct("EventBus").field("handlers", &counts).finish()
    }
}
