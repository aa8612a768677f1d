// packages/telemetry-replay-engine/src/main.rs
//! Telemetry Replay Engine
//!
//! Records a live telemetry stream to disk and replays stored sessions over
//! the same wire protocol.
//!
//! ```text
//! telemetry-replay-engine record
//! telemetry-replay-engine replay [session_id]
//! telemetry-replay-engine list
//! telemetry-replay-engine export [session_id] [jsonl|json]
//! ```

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use telemetry_replay_engine::bridge::{attach_recorder, StreamClient};
use telemetry_replay_engine::observability::{init_metrics, init_tracing};
use telemetry_replay_engine::recording::{
    ExportFormat, Exporter, LoadedSession, Recorder, SessionLoader, SessionStore,
};
use telemetry_replay_engine::replay::ReplayServer;
use telemetry_replay_engine::utils::config::EngineConfig;
use telemetry_replay_engine::EngineError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const USAGE: &str = "usage: telemetry-replay-engine <record|replay|list|export> [session_id] [format]";

#[tokio::main]
async fn main() -> Result<()> {
    let config = EngineConfig::load()?;
    init_tracing(&config.logging)?;
    init_metrics(&config.metrics)?;

    info!("Starting Telemetry Replay Engine v{}", env!("CARGO_PKG_VERSION"));

    let args: Vec<String> = std::env::args().skip(1).collect();
    let session_arg = args.get(1).map(String::as_str);

    match args.first().map(String::as_str) {
        Some("record") => record(&config).await,
        Some("replay") => replay(&config, session_arg).await,
        Some("list") => list(&config),
        Some("export") => {
            let format = match args.get(2) {
                Some(name) => name.parse()?,
                None => ExportFormat::Jsonl,
            };
            export(&config, session_arg, format).await
        }
        _ => bail!(USAGE),
    }
}

/// Capture the configured source until it disconnects or Ctrl-C
async fn record(config: &EngineConfig) -> Result<()> {
    let recorder = Arc::new(Mutex::new(Recorder::new(config.recorder.clone())?));
    let mut client = StreamClient::new(config.source.clone());
    attach_recorder(client.bus_mut(), Arc::clone(&recorder));

    let session_id = recorder.lock().start()?.session_id.clone();
    let cancel = CancellationToken::new();
    spawn_shutdown_signal(cancel.clone());

    let outcome = client.run(cancel).await;

    // Finalize whatever was captured, even when the connection failed.
    let metadata = recorder.lock().stop()?;
    let stats = outcome.with_context(|| format!("recording session {}", session_id))?;
    info!(
        "Session {} finalized: {} messages in {} chunks ({} invalid skipped, {})",
        metadata.session_id, metadata.total_messages, metadata.chunk_count, stats.invalid, stats.disconnect
    );
    Ok(())
}

/// Serve a stored session until Ctrl-C
async fn replay(config: &EngineConfig, session_id: Option<&str>) -> Result<()> {
    let session = load(config, session_id).await?;
    let mut server = ReplayServer::new(session.messages, config.server.clone(), config.replay.clone())?;
    let addr = server.start().await?;
    info!("Replaying session {} on {}", session.metadata.session_id, addr);

    tokio::signal::ctrl_c()
        .await
        .context("failed to install Ctrl-C handler")?;
    info!("Received shutdown signal, cleaning up...");

    server.stop().await;
    info!(
        "Replay server stopped: {} connections, {} messages sent",
        server.connections_accepted(),
        server.messages_sent()
    );
    Ok(())
}

fn list(config: &EngineConfig) -> Result<()> {
    let store = SessionStore::new(&config.replay.recordings_dir);
    for metadata in store.list_sessions() {
        let status = if metadata.is_finalized() { "complete" } else { "incomplete" };
        println!(
            "{}\t{}\t{} messages\t{} frames\t{} chunks\t{}",
            metadata.session_id,
            metadata.start_time.to_rfc3339(),
            metadata.total_messages,
            metadata.total_frames,
            metadata.chunk_count,
            status
        );
    }
    Ok(())
}

async fn export(config: &EngineConfig, session_id: Option<&str>, format: ExportFormat) -> Result<()> {
    let session = load(config, session_id).await?;
    let output = Exporter::new(format).export(&session)?;
    print!("{}", output);
    Ok(())
}

/// Load `session_id`, or the most recent session when none is given
async fn load(config: &EngineConfig, session_id: Option<&str>) -> Result<LoadedSession> {
    let store = SessionStore::new(&config.replay.recordings_dir);
    let session_id = match session_id {
        Some(id) => id.to_string(),
        None => store
            .latest()
            .map(|metadata| metadata.session_id)
            .ok_or_else(|| EngineError::NotFound(format!("no sessions in {:?}", store.root())))?,
    };
    let loader = SessionLoader::new(store);
    Ok(loader.load_session_async(&session_id).await?)
}

fn spawn_shutdown_signal(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal, cleaning up...");
                cancel.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });
}
