// packages/telemetry-replay-engine/src/recording/loader.rs
//! Session loader
//!
//! Rebuilds the full ordered message sequence of a stored session. Loading is
//! all-or-nothing: any unreadable chunk, or a gap in the chunk index
//! sequence, fails the whole load with `CorruptChunk`.

use crate::protocol::message::Message;
use crate::recording::compressor::Compressor;
use crate::recording::storage::{chunk_file_name, SessionMetadata, SessionStore};
use crate::utils::errors::{EngineError, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Upper bound on the up-front allocation for a session's messages
const MAX_PREALLOCATED_MESSAGES: usize = 1 << 16;

#[derive(Deserialize)]
struct ChunkDocument {
    messages: Vec<Message>,
}

/// A fully loaded session
#[derive(Debug, Clone)]
pub struct LoadedSession {
    pub metadata: SessionMetadata,
    pub messages: Vec<Message>,
}

/// Reads sessions back from a [`SessionStore`]
#[derive(Debug, Clone)]
pub struct SessionLoader {
    store: SessionStore,
    compressor: Compressor,
}

impl SessionLoader {
    pub fn new(store: SessionStore) -> Self {
        Self {
            store,
            compressor: Compressor::default(),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Ordered message sequence of `session_id`
    pub fn load(&self, session_id: &str) -> Result<Vec<Message>> {
        self.load_session(session_id).map(|session| session.messages)
    }

    /// Metadata and ordered message sequence of `session_id`
    pub fn load_session(&self, session_id: &str) -> Result<LoadedSession> {
        let start = Instant::now();
        let dir = self.store.resolve(session_id)?;
        let metadata = SessionStore::read_metadata(&dir).map_err(|e| match e {
            EngineError::NotFound(_) => EngineError::NotFound(session_id.to_string()),
            other => other,
        })?;

        let chunks = SessionStore::chunk_files(&dir)?;
        // Metadata is only a hint; a damaged count must not drive the allocation.
        let hint = usize::try_from(metadata.total_messages).unwrap_or(0);
        let mut messages = Vec::with_capacity(hint.min(MAX_PREALLOCATED_MESSAGES));

        for (expected, (index, path)) in (0u32..).zip(chunks) {
            if index != expected {
                return Err(EngineError::CorruptChunk {
                    path: dir.join(chunk_file_name(session_id, expected)),
                    index: expected,
                    reason: "chunk file missing".into(),
                });
            }
            messages.extend(read_chunk(&self.compressor, &path, index)?);
        }

        info!(
            "Loaded session {}: {} messages in {:?}",
            session_id,
            messages.len(),
            start.elapsed()
        );

        Ok(LoadedSession { metadata, messages })
    }

    /// Load on the blocking pool so async callers are not stalled by disk I/O
    pub async fn load_session_async(&self, session_id: &str) -> Result<LoadedSession> {
        let loader = self.clone();
        let session_id = session_id.to_string();
        tokio::task::spawn_blocking(move || loader.load_session(&session_id))
            .await
            .map_err(|e| EngineError::StorageFailed(format!("Load task failed: {}", e)))?
    }
}

/// Decompress and parse one chunk file
pub(crate) fn read_chunk(compressor: &Compressor, path: &Path, index: u32) -> Result<Vec<Message>> {
    let corrupt = |reason: String| EngineError::CorruptChunk {
        path: path.to_path_buf(),
        index,
        reason,
    };

    let compressed = std::fs::read(path).map_err(|e| corrupt(e.to_string()))?;
    let document: ChunkDocument = compressor
        .decode_json(&compressed)
        .map_err(|e| corrupt(e.to_string()))?;

    for message in &document.messages {
        message.check().map_err(&corrupt)?;
    }

    debug!("Read chunk {} with {} messages", index, document.messages.len());
    Ok(document.messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::recorder::{Recorder, RecorderConfig};
    use crate::recording::storage::METADATA_FILE;
    use serde_json::json;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn record_session(root: &Path, rotation: usize, count: u64) -> (String, PathBuf) {
        let mut recorder = Recorder::new(RecorderConfig {
            root_dir: root.to_path_buf(),
            chunk_rotation_size: rotation,
            ..Default::default()
        })
        .unwrap();
        recorder.start().unwrap();
        for seq in 0..count {
            let msg = if seq % 4 == 3 {
                Message::event(seq, "tear_fired")
            } else {
                Message::data(seq).with_room_index(1)
            };
            recorder.record(msg.with_payload(json!({ "seq": seq }))).unwrap();
        }
        let dir = recorder.session_dir().unwrap().to_path_buf();
        let metadata = recorder.stop().unwrap();
        (metadata.session_id, dir)
    }

    fn seqs(messages: &[Message]) -> Vec<u64> {
        messages
            .iter()
            .map(|m| m.payload().unwrap()["seq"].as_u64().unwrap())
            .collect()
    }

    #[test]
    fn test_order_preserved_across_chunks() {
        let dir = tempdir().unwrap();
        let (session_id, session_dir) = record_session(dir.path(), 3, 5);
        assert_eq!(SessionStore::chunk_files(&session_dir).unwrap().len(), 2);

        let loader = SessionLoader::new(SessionStore::new(dir.path()));
        let messages = loader.load(&session_id).unwrap();

        assert_eq!(seqs(&messages), vec![0, 1, 2, 3, 4]);
        assert_eq!(messages[3].event_type(), Some("tear_fired"));
    }

    #[test]
    fn test_unknown_session_not_found() {
        let dir = tempdir().unwrap();
        let loader = SessionLoader::new(SessionStore::new(dir.path()));
        assert!(matches!(
            loader.load("session_20000101_000000"),
            Err(EngineError::NotFound(id)) if id == "session_20000101_000000"
        ));
    }

    #[test]
    fn test_missing_metadata_not_found() {
        let dir = tempdir().unwrap();
        let (session_id, session_dir) = record_session(dir.path(), 3, 4);
        std::fs::remove_file(session_dir.join(METADATA_FILE)).unwrap();

        let loader = SessionLoader::new(SessionStore::new(dir.path()));
        assert!(matches!(loader.load(&session_id), Err(EngineError::NotFound(_))));
    }

    #[test]
    fn test_corrupt_middle_chunk_fails_whole_load() {
        let dir = tempdir().unwrap();
        let (session_id, session_dir) = record_session(dir.path(), 3, 9);
        let chunks = SessionStore::chunk_files(&session_dir).unwrap();
        assert_eq!(chunks.len(), 3);

        let (_, second) = &chunks[1];
        std::fs::write(second, b"\x28\xb5\x2f\xfd garbage").unwrap();

        let loader = SessionLoader::new(SessionStore::new(dir.path()));
        match loader.load(&session_id) {
            Err(EngineError::CorruptChunk { path, index, .. }) => {
                assert_eq!(&path, second);
                assert_eq!(index, 1);
            }
            other => panic!("expected CorruptChunk, got {:?}", other.map(|m| m.len())),
        }
    }

    #[test]
    fn test_chunk_with_bad_json_is_corrupt() {
        let dir = tempdir().unwrap();
        let (session_id, session_dir) = record_session(dir.path(), 2, 4);
        let compressed = Compressor::default()
            .compress(br#"{"messages":[{"type":"NOPE","frame":1}]}"#)
            .unwrap();
        SessionStore::write_chunk(&session_dir, &session_id, 0, &compressed).unwrap();

        let loader = SessionLoader::new(SessionStore::new(dir.path()));
        assert!(matches!(
            loader.load(&session_id),
            Err(EngineError::CorruptChunk { index: 0, .. })
        ));
    }

    #[test]
    fn test_missing_chunk_is_corrupt() {
        let dir = tempdir().unwrap();
        let (session_id, session_dir) = record_session(dir.path(), 2, 6);
        let chunks = SessionStore::chunk_files(&session_dir).unwrap();
        std::fs::remove_file(&chunks[1].1).unwrap();

        let loader = SessionLoader::new(SessionStore::new(dir.path()));
        assert!(matches!(
            loader.load(&session_id),
            Err(EngineError::CorruptChunk { index: 1, .. })
        ));
    }

    #[test]
    fn test_oversized_message_count_in_metadata() {
        let dir = tempdir().unwrap();
        let (session_id, session_dir) = record_session(dir.path(), 3, 7);

        let mut metadata = SessionStore::read_metadata(&session_dir).unwrap();
        metadata.total_messages = u64::MAX;
        SessionStore::write_metadata(&session_dir, &metadata).unwrap();

        let loader = SessionLoader::new(SessionStore::new(dir.path()));
        let session = loader.load_session(&session_id).unwrap();
        assert_eq!(session.metadata.total_messages, u64::MAX);
        assert_eq!(seqs(&session.messages), (0..7).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_load_async() {
        let dir = tempdir().unwrap();
        let (session_id, _) = record_session(dir.path(), 4, 10);

        let loader = SessionLoader::new(SessionStore::new(dir.path()));
        let session = loader.load_session_async(&session_id).await.unwrap();
        assert_eq!(session.messages.len(), 10);
        assert_eq!(session.metadata.chunk_count, 3);
    }
}
