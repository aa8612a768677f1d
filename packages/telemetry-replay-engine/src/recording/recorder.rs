// packages/telemetry-replay-engine/src/recording/recorder.rs
//! Session recorder
//!
//! Accepts live messages into an in-memory buffer and writes a compressed chunk
//! each time the buffer reaches `chunk_rotation_size`. Rotation is purely
//! size-triggered so chunk boundaries are deterministic.
//!
//! The rotation write happens on the caller's thread and is fsynced before
//! `record` returns; this is the only point where `record` blocks on disk.
//! Messages still sitting in the buffer when the process dies are lost.

use crate::protocol::codec;
use crate::protocol::message::Message;
use crate::recording::compressor::{CompressionLevel, Compressor};
use crate::recording::storage::{session_id_for, SessionMetadata, SessionStore};
use crate::utils::errors::{EngineError, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Recorder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Directory under which session directories are created
    pub root_dir: PathBuf,

    /// Messages per chunk
    pub chunk_rotation_size: usize,

    /// Chunk compression level
    pub compression_level: CompressionLevel,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("recordings"),
            chunk_rotation_size: 1000,
            compression_level: CompressionLevel::Balanced,
        }
    }
}

/// Recorder lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
    Finalized,
}

/// Recorder statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecorderStats {
    pub messages_recorded: u64,
    pub invalid_skipped: u64,
    pub chunks_written: u64,
    pub bytes_written: u64,
}

#[derive(Serialize)]
struct ChunkBody<'a> {
    messages: &'a [Message],
}

/// Distinct-frame count for a non-decreasing frame stream
///
/// A frame counts as new whenever it differs from the previous message's
/// frame. A sender whose frame counter goes backwards (e.g. a restarted
/// simulation) therefore has each repeated run counted again.
#[derive(Debug, Default, Clone, Copy)]
struct FrameTally {
    last: Option<u64>,
    distinct: u64,
}

impl FrameTally {
    fn observe(&mut self, frame: u64) {
        if let Some(last) = self.last {
            if frame == last {
                return;
            }
            if frame < last {
                debug!("Frame went backwards from {} to {}", last, frame);
            }
        }
        self.last = Some(frame);
        self.distinct += 1;
    }
}

struct ActiveSession {
    dir: PathBuf,
    metadata: SessionMetadata,
    buffer: Vec<Message>,
    frames: FrameTally,
}

/// Writes one live capture to a session directory
pub struct Recorder {
    config: RecorderConfig,
    store: SessionStore,
    compressor: Compressor,
    state: RecorderState,
    session: Option<ActiveSession>,
    stats: RecorderStats,
}

impl Recorder {
    pub fn new(config: RecorderConfig) -> Result<Self> {
        if config.chunk_rotation_size == 0 {
            return Err(EngineError::InvalidConfig(
                "chunk_rotation_size must be at least 1".into(),
            ));
        }

        Ok(Self {
            store: SessionStore::new(config.root_dir.clone()),
            compressor: Compressor::new(config.compression_level),
            config,
            state: RecorderState::Idle,
            session: None,
            stats: RecorderStats::default(),
        })
    }

    /// Start a new session named after the current wall-clock time
    pub fn start(&mut self) -> Result<&SessionMetadata> {
        self.start_at(Local::now())
    }

    /// Start a new session with an explicit start time
    pub fn start_at(&mut self, start_time: DateTime<Local>) -> Result<&SessionMetadata> {
        if self.state != RecorderState::Idle {
            return Err(EngineError::InvalidState(format!(
                "cannot start recorder in {:?} state",
                self.state
            )));
        }

        let session_id = session_id_for(start_time);
        let dir = self.store.create_session_dir(&session_id)?;
        let metadata =
            SessionMetadata::started(session_id, start_time, self.config.chunk_rotation_size);
        SessionStore::write_metadata(&dir, &metadata)?;

        info!(
            "Recording session {} to {:?} (rotation every {} messages)",
            metadata.session_id, dir, self.config.chunk_rotation_size
        );

        self.state = RecorderState::Recording;
        let session = self.session.insert(ActiveSession {
            dir,
            metadata,
            buffer: Vec::with_capacity(self.config.chunk_rotation_size),
            frames: FrameTally::default(),
        });
        Ok(&session.metadata)
    }

    /// Append a message, writing a chunk when the buffer is full
    ///
    /// If the rotation write fails the message is taken back out of the
    /// buffer and nothing is counted, so `Err` always means "not captured"
    /// and the caller may retry the same message. Messages buffered by
    /// earlier calls stay buffered and are written by the next rotation or
    /// at stop.
    pub fn record(&mut self, message: Message) -> Result<()> {
        let rotation_size = self.config.chunk_rotation_size;
        let frame = message.frame();
        let session = self.active_session_mut()?;

        session.buffer.push(message);
        if session.buffer.len() >= rotation_size {
            if let Err(e) = self.flush_chunk() {
                if let Some(session) = self.session.as_mut() {
                    session.buffer.pop();
                }
                return Err(e);
            }
        }

        let session = self.active_session_mut()?;
        session.frames.observe(frame);
        session.metadata.total_messages += 1;
        self.stats.messages_recorded += 1;
        metrics::counter!("replay_messages_recorded_total").increment(1);
        Ok(())
    }

    /// Decode one wire line and record it
    ///
    /// Returns `Ok(false)` when the line is not a valid message; it is skipped
    /// and counted so capture can continue.
    pub fn record_line(&mut self, line: &str) -> Result<bool> {
        // Reject misuse before looking at the line so invalid input has no effect either.
        self.active_session_mut()?;

        match codec::decode_line(line) {
            Ok(message) => self.record(message).map(|_| true),
            Err(e) if e.is_recoverable() => {
                self.note_invalid(&e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Count a record that failed to decode upstream
    pub fn note_invalid(&mut self, error: &EngineError) {
        self.stats.invalid_skipped += 1;
        metrics::counter!("replay_invalid_messages_total").increment(1);
        debug!("Skipping invalid record: {}", error);
    }

    /// Flush the remaining buffer and finalize metadata
    pub fn stop(&mut self) -> Result<SessionMetadata> {
        self.active_session_mut()?;

        if self.session.as_ref().is_some_and(|s| !s.buffer.is_empty()) {
            self.flush_chunk()?;
        }

        let mut session = self
            .session
            .take()
            .ok_or_else(|| EngineError::InvalidState("no active session".into()))?;

        let end_time = Local::now();
        let elapsed = end_time.signed_duration_since(session.metadata.start_time);
        session.metadata.end_time = Some(end_time);
        session.metadata.duration = Some(elapsed.num_milliseconds().max(0) as f64 / 1000.0);
        session.metadata.total_frames = session.frames.distinct;
        SessionStore::write_metadata(&session.dir, &session.metadata)?;

        self.state = RecorderState::Finalized;

        info!(
            "Finalized session {}: {} messages, {} frames, {} chunks",
            session.metadata.session_id,
            session.metadata.total_messages,
            session.metadata.total_frames,
            session.metadata.chunk_count
        );

        Ok(session.metadata)
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn stats(&self) -> &RecorderStats {
        &self.stats
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.metadata.session_id.as_str())
    }

    pub fn session_dir(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.dir.as_path())
    }

    /// Messages accepted but not yet written to disk
    pub fn buffered(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.buffer.len())
    }

    fn active_session_mut(&mut self) -> Result<&mut ActiveSession> {
        match (self.state, self.session.as_mut()) {
            (RecorderState::Recording, Some(session)) => Ok(session),
            (state, _) => Err(EngineError::InvalidState(format!(
                "recorder is not recording (state: {:?})",
                state
            ))),
        }
    }

    /// Compress and durably write the buffer as the next chunk
    ///
    /// On failure the buffer is left untouched.
    fn flush_chunk(&mut self) -> Result<()> {
        let start = Instant::now();
        let compressor = self.compressor;
        let session = self.active_session_mut()?;
        let index = session.metadata.chunk_count;

        let compressed = compressor.encode_json(&ChunkBody {
            messages: &session.buffer,
        })?;

        SessionStore::write_chunk(
            &session.dir,
            &session.metadata.session_id,
            index,
            &compressed,
        )?;

        let count = session.buffer.len();
        session.buffer.clear();
        session.metadata.chunk_count += 1;

        self.stats.chunks_written += 1;
        self.stats.bytes_written += compressed.len() as u64;
        metrics::counter!("replay_chunks_written_total").increment(1);
        metrics::counter!("replay_chunk_bytes_written_total").increment(compressed.len() as u64);

        debug!(
            "Rotated chunk {} ({} messages, {} bytes) in {:?}",
            index,
            count,
            compressed.len(),
            start.elapsed()
        );
        Ok(())
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Some(session) = &self.session {
            if !session.buffer.is_empty() {
                warn!(
                    "Recorder for {} dropped without stop(); {} buffered messages discarded",
                    session.metadata.session_id,
                    session.buffer.len()
                );
            }
        }
    }
}
