// packages/telemetry-replay-engine/src/replay/server.rs
//! TCP replay server
//!
//! Serves a loaded session over the live wire protocol. Every accepted
//! connection gets its own [`ReplayEngine`] built over the same shared,
//! read-only sequence, so clients never share a cursor and each one starts at
//! message 0 (or the configured start offset).
//!
//! # Architecture
//!
//! ```text
//! accept loop ──┬─ client task (engine A) → FramedWrite → socket A
//!               ├─ client task (engine B) → FramedWrite → socket B
//!               └─ ...
//!        registry: ulid → (peer, ReplayHandle)   [dashmap]
//!        shutdown: CancellationToken → every task
//! ```
//!
//! A disconnect or write error ends only that client's task.

use crate::protocol::codec::MessageCodec;
use crate::protocol::message::Message;
use crate::replay::engine::{ReplayConfig, ReplayEngine, ReplayHandle, RunState};
use crate::utils::errors::{EngineError, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::SinkExt;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use ulid::Ulid;

/// Back-off after a failed accept (e.g. file descriptor exhaustion)
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9999,
        }
    }
}

struct ClientEntry {
    peer: SocketAddr,
    connected_at: DateTime<Utc>,
    handle: ReplayHandle,
}

/// Snapshot of one connected client
#[derive(Debug, Clone)]
pub struct ClientSummary {
    pub id: Ulid,
    pub peer: SocketAddr,
    pub connected_at: DateTime<Utc>,
    pub state: RunState,
}

struct Shared {
    messages: Arc<[Message]>,
    replay: ReplayConfig,
    clients: DashMap<Ulid, ClientEntry>,
    connections_accepted: AtomicU64,
    messages_sent: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Running,
    Stopped,
}

/// Replay server handing one independent engine to each connection
pub struct ReplayServer {
    config: ServerConfig,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    accept_task: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
    lifecycle: Lifecycle,
}

impl ReplayServer {
    /// Create a server for `messages`
    ///
    /// The replay configuration is validated here (including the start offset
    /// against the sequence) so a bad setting fails before any client connects.
    pub fn new(
        messages: impl Into<Arc<[Message]>>,
        config: ServerConfig,
        replay: ReplayConfig,
    ) -> Result<Self> {
        let messages = messages.into();
        ReplayEngine::new(Arc::clone(&messages), &replay)?;

        Ok(Self {
            config,
            shared: Arc::new(Shared {
                messages,
                replay,
                clients: DashMap::new(),
                connections_accepted: AtomicU64::new(0),
                messages_sent: AtomicU64::new(0),
            }),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            accept_task: None,
            local_addr: None,
            lifecycle: Lifecycle::Created,
        })
    }

    /// Bind the listener and start accepting connections
    ///
    /// Returns the bound address, which differs from the configured one when
    /// port 0 is used.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        if self.lifecycle != Lifecycle::Created {
            return Err(EngineError::InvalidState(format!(
                "replay server cannot start from {:?}",
                self.lifecycle
            )));
        }

        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let local_addr = listener.local_addr()?;

        info!(
            "Replay server listening on {} ({} messages per client)",
            local_addr,
            self.shared.messages.len()
        );

        let shared = Arc::clone(&self.shared);
        let shutdown = self.shutdown.clone();
        let tracker = self.tracker.clone();
        self.accept_task = Some(tokio::spawn(accept_loop(listener, shared, shutdown, tracker)));
        self.local_addr = Some(local_addr);
        self.lifecycle = Lifecycle::Running;

        Ok(local_addr)
    }

    /// Stop accepting, end every client session and wait for their tasks
    pub async fn stop(&mut self) {
        if self.lifecycle != Lifecycle::Running {
            self.lifecycle = Lifecycle::Stopped;
            return;
        }

        info!("Stopping replay server");
        self.shutdown.cancel();

        if let Some(task) = self.accept_task.take() {
            if let Err(e) = task.await {
                error!("Accept loop ended abnormally: {}", e);
            }
        }

        self.tracker.close();
        self.tracker.wait().await;
        self.lifecycle = Lifecycle::Stopped;

        info!(
            "Replay server stopped after {} connections",
            self.connections_accepted()
        );
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Currently connected clients
    pub fn clients(&self) -> Vec<ClientSummary> {
        self.shared
            .clients
            .iter()
            .map(|entry| ClientSummary {
                id: *entry.key(),
                peer: entry.peer,
                connected_at: entry.connected_at,
                state: entry.handle.state(),
            })
            .collect()
    }

    /// Control handle of one client's playback
    pub fn client(&self, id: Ulid) -> Option<ReplayHandle> {
        self.shared.clients.get(&id).map(|entry| entry.handle.clone())
    }

    /// Control handle of the client connected from `peer`
    pub fn client_by_peer(&self, peer: SocketAddr) -> Option<ReplayHandle> {
        self.shared
            .clients
            .iter()
            .find(|entry| entry.peer == peer)
            .map(|entry| entry.handle.clone())
    }

    pub fn connections_accepted(&self) -> u64 {
        self.shared.connections_accepted.load(Ordering::Relaxed)
    }

    pub fn messages_sent(&self) -> u64 {
        self.shared.messages_sent.load(Ordering::Relaxed)
    }
}

impl Drop for ReplayServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn accept_loop(
    listener: TcpListener,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    shared.connections_accepted.fetch_add(1, Ordering::Relaxed);
                    tracker.spawn(serve_client(
                        stream,
                        peer,
                        Arc::clone(&shared),
                        shutdown.child_token(),
                    ));
                }
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(ACCEPT_RETRY_DELAY) => {}
                    }
                }
            }
        }
    }
    debug!("Accept loop exited");
}

async fn serve_client(
    stream: TcpStream,
    peer: SocketAddr,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) {
    let id = Ulid::new();
    let mut engine = match ReplayEngine::new(Arc::clone(&shared.messages), &shared.replay) {
        Ok(engine) => engine,
        Err(e) => {
            error!("Cannot create replay engine for {}: {}", peer, e);
            return;
        }
    };

    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not set TCP_NODELAY for {}: {}", peer, e);
    }

    shared.clients.insert(
        id,
        ClientEntry {
            peer,
            connected_at: Utc::now(),
            handle: engine.handle(),
        },
    );
    metrics::gauge!("replay_clients_active").increment(1.0);
    info!("Replay client {} connected from {}", id, peer);

    let (mut reader, writer) = stream.into_split();
    let mut sink = FramedWrite::new(writer, MessageCodec::new());

    engine.play();
    let outcome = stream_to_client(&mut engine, &mut sink, &mut reader, &cancel, &shared).await;

    shared.clients.remove(&id);
    metrics::gauge!("replay_clients_active").decrement(1.0);

    match outcome {
        Ok(sent) => {
            // A stalled peer must not hold up shutdown while we close.
            tokio::select! {
                _ = cancel.cancelled() => {}
                closed = sink.close() => {
                    if let Err(e) = closed {
                        debug!("Closing connection to {} failed: {}", peer, e);
                    }
                }
            }
            info!("Replay client {} finished ({} messages sent)", id, sent);
        }
        Err(EngineError::ConnectionLost(reason)) => {
            info!(
                "Replay client {} disconnected after {} messages: {}",
                id,
                engine.emitted(),
                reason
            );
        }
        Err(e) => warn!("Replay client {} ended with error: {}", id, e),
    }
}

/// Drive one engine into one connection until it ends, the peer goes away,
/// or the server shuts down
async fn stream_to_client(
    engine: &mut ReplayEngine,
    sink: &mut FramedWrite<tokio::net::tcp::OwnedWriteHalf, MessageCodec>,
    reader: &mut OwnedReadHalf,
    cancel: &CancellationToken,
    shared: &Shared,
) -> Result<u64> {
    let mut sent = 0u64;
    let mut scratch = [0u8; 512];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(sent),

            // Clients never send anything; reading only detects a closed socket.
            read = reader.read(&mut scratch) => match read {
                Ok(0) => return Err(EngineError::ConnectionLost("peer closed connection".into())),
                Ok(_) => continue,
                Err(e) => return Err(EngineError::ConnectionLost(e.to_string())),
            },

            next = engine.next() => {
                let Some(message) = next else {
                    return Ok(sent);
                };

                tokio::select! {
                    _ = cancel.cancelled() => return Ok(sent),
                    written = sink.send(message) => {
                        written.map_err(|e| EngineError::ConnectionLost(e.to_string()))?;
                    }
                }

                sent += 1;
                shared.messages_sent.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("replay_messages_sent_total").increment(1);
            }
        }
    }
}
