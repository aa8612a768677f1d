// packages/telemetry-replay-engine/src/recording/storage.rs
//! Session store: on-disk layout of recordings
//!
//! ```text
//! <root>/
//! └── session_20240315_142501/
//!     ├── metadata.json
//!     ├── session_20240315_142501_chunk_0000.json.zst
//!     ├── session_20240315_142501_chunk_0001.json.zst
//!     └── ...
//! ```
//!
//! Chunk index order is message order. Every write goes through a temporary
//! sibling that is fsynced and then renamed, so a chunk or metadata file is
//! either fully present under its final name or absent.

use crate::utils::errors::{EngineError, Result};
use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const SESSION_PREFIX: &str = "session_";
pub const METADATA_FILE: &str = "metadata.json";
pub const CHUNK_MARKER: &str = "_chunk_";
pub const CHUNK_EXTENSION: &str = ".json.zst";

const SESSION_ID_FORMAT: &str = "session_%Y%m%d_%H%M%S";
const TMP_SUFFIX: &str = ".tmp";

/// Metadata describing one recorded session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: String,
    pub start_time: DateTime<Local>,
    #[serde(default)]
    pub end_time: Option<DateTime<Local>>,
    #[serde(default)]
    pub total_messages: u64,
    /// Number of distinct frame values seen
    #[serde(default)]
    pub total_frames: u64,
    #[serde(default)]
    pub chunk_count: u32,
    /// Recording duration in seconds
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub chunk_rotation_size: usize,
}

impl SessionMetadata {
    /// Partial metadata written when a recording starts
    pub fn started(session_id: String, start_time: DateTime<Local>, chunk_rotation_size: usize) -> Self {
        Self {
            session_id,
            start_time,
            end_time: None,
            total_messages: 0,
            total_frames: 0,
            chunk_count: 0,
            duration: None,
            chunk_rotation_size,
        }
    }

    /// Whether the recording was stopped cleanly
    pub fn is_finalized(&self) -> bool {
        self.end_time.is_some()
    }
}

/// Session id for a recording started at `time`
pub fn session_id_for(time: DateTime<Local>) -> String {
    time.format(SESSION_ID_FORMAT).to_string()
}

/// Whether `name` follows the `session_<YYYYMMDD>_<HHMMSS>` convention
pub fn is_session_id(name: &str) -> bool {
    name.len() == SESSION_PREFIX.len() + 15
        && NaiveDateTime::parse_from_str(name, SESSION_ID_FORMAT).is_ok()
}

/// File name of chunk `index` of `session_id`
pub fn chunk_file_name(session_id: &str, index: u32) -> String {
    format!("{}{}{:04}{}", session_id, CHUNK_MARKER, index, CHUNK_EXTENSION)
}

/// Numeric chunk index encoded in a chunk file name
pub fn parse_chunk_index(file_name: &str) -> Option<u32> {
    let stem = file_name.strip_suffix(CHUNK_EXTENSION)?;
    let (_, digits) = stem.rsplit_once(CHUNK_MARKER)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Filesystem-backed session store rooted at a configurable directory
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All sessions under the root, most recent first
    ///
    /// A missing root, unreadable entries, or sessions without parseable
    /// metadata are skipped; this never fails.
    pub fn list_sessions(&self) -> Vec<SessionMetadata> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("No sessions under {:?}: {}", self.root, e);
                return Vec::new();
            }
        };

        let mut sessions: Vec<SessionMetadata> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                if !is_session_id(&name) {
                    return None;
                }
                match Self::read_metadata(&entry.path()) {
                    Ok(metadata) => Some(metadata),
                    Err(e) => {
                        warn!("Skipping session {}: {}", name, e);
                        None
                    }
                }
            })
            .collect();

        sessions.sort_by(|a, b| {
            b.start_time
                .cmp(&a.start_time)
                .then_with(|| b.session_id.cmp(&a.session_id))
        });
        sessions
    }

    /// Most recently started session, if any
    pub fn latest(&self) -> Option<SessionMetadata> {
        self.list_sessions().into_iter().next()
    }

    /// Directory of `session_id`
    pub fn resolve(&self, session_id: &str) -> Result<PathBuf> {
        if !is_session_id(session_id) {
            return Err(EngineError::NotFound(session_id.to_string()));
        }
        let dir = self.root.join(session_id);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(EngineError::NotFound(session_id.to_string()))
        }
    }

    /// Create the directory for a new session
    ///
    /// Fails with `InvalidState` if the session already exists.
    pub fn create_session_dir(&self, session_id: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.root).map_err(|e| {
            EngineError::StorageFailed(format!("Failed to create root {:?}: {}", self.root, e))
        })?;

        let dir = self.root.join(session_id);
        match fs::create_dir(&dir) {
            Ok(()) => {
                sync_dir(&self.root)?;
                Ok(dir)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(
                EngineError::InvalidState(format!("session {} already exists", session_id)),
            ),
            Err(e) => Err(EngineError::StorageFailed(format!(
                "Failed to create session directory {:?}: {}",
                dir, e
            ))),
        }
    }

    /// Read and parse the metadata file of a session directory
    pub fn read_metadata(session_dir: &Path) -> Result<SessionMetadata> {
        let path = session_dir.join(METADATA_FILE);
        let bytes = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EngineError::NotFound(session_name(session_dir))
            } else {
                EngineError::Io(e)
            }
        })?;
        serde_json::from_slice(&bytes).map_err(|e| {
            EngineError::StorageFailed(format!("Invalid metadata {:?}: {}", path, e))
        })
    }

    /// Durably (re)write the metadata file
    pub fn write_metadata(session_dir: &Path, metadata: &SessionMetadata) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(metadata)
            .map_err(|e| EngineError::StorageFailed(format!("Metadata serialization error: {}", e)))?;
        write_durable(&session_dir.join(METADATA_FILE), &bytes)
    }

    /// Durably write one compressed chunk, returning its path
    pub fn write_chunk(session_dir: &Path, session_id: &str, index: u32, data: &[u8]) -> Result<PathBuf> {
        let path = session_dir.join(chunk_file_name(session_id, index));
        write_durable(&path, data)?;
        debug!("Wrote chunk {} ({} bytes) to {:?}", index, data.len(), path);
        Ok(path)
    }

    /// Chunk files of a session, sorted by numeric index
    pub fn chunk_files(session_dir: &Path) -> Result<Vec<(u32, PathBuf)>> {
        let mut chunks: Vec<(u32, PathBuf)> = fs::read_dir(session_dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                parse_chunk_index(&name).map(|index| (index, entry.path()))
            })
            .collect();
        chunks.sort_by_key(|(index, _)| *index);
        Ok(chunks)
    }
}

fn session_name(session_dir: &Path) -> String {
    session_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| session_dir.display().to_string())
}

/// Write to a temporary sibling, fsync, rename into place, fsync the directory
fn write_durable(path: &Path, data: &[u8]) -> Result<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(TMP_SUFFIX);
    let tmp_path = PathBuf::from(tmp_name);

    let mut file = File::create(&tmp_path)
        .map_err(|e| EngineError::StorageFailed(format!("Failed to create {:?}: {}", tmp_path, e)))?;
    file.write_all(data)
        .map_err(|e| EngineError::StorageFailed(format!("Failed to write {:?}: {}", tmp_path, e)))?;
    file.sync_all()
        .map_err(|e| EngineError::StorageFailed(format!("Failed to sync {:?}: {}", tmp_path, e)))?;
    drop(file);

    fs::rename(&tmp_path, path)
        .map_err(|e| EngineError::StorageFailed(format!("Failed to rename {:?}: {}", tmp_path, e)))?;

    if let Some(parent) = path.parent() {
        sync_dir(parent)?;
    }
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|e| EngineError::StorageFailed(format!("Failed to sync directory {:?}: {}", dir, e)))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn make_session(store: &SessionStore, time: DateTime<Local>) -> SessionMetadata {
        let id = session_id_for(time);
        let dir = store.create_session_dir(&id).unwrap();
        let metadata = SessionMetadata::started(id, time, 100);
        SessionStore::write_metadata(&dir, &metadata).unwrap();
        metadata
    }

    #[test]
    fn test_session_id_format() {
        let id = session_id_for(at(2024, 3, 15, 14, 25, 1));
        assert_eq!(id, "session_20240315_142501");
        assert!(is_session_id(&id));
        assert!(!is_session_id("session_2024"));
        assert!(!is_session_id("notes"));
        assert!(!is_session_id("../session_20240315_142501"));
    }

    #[test]
    fn test_chunk_names_sort_numerically() {
        assert_eq!(chunk_file_name("session_20240315_142501", 3), "session_20240315_142501_chunk_0003.json.zst");
        assert_eq!(parse_chunk_index("s_chunk_0003.json.zst"), Some(3));
        assert_eq!(parse_chunk_index("s_chunk_12345.json.zst"), Some(12345));
        assert_eq!(parse_chunk_index("s_chunk_0003.json.zst.tmp"), None);
        assert_eq!(parse_chunk_index("metadata.json"), None);

        let dir = tempdir().unwrap();
        for index in [10_000u32, 2, 9_999] {
            SessionStore::write_chunk(dir.path(), "s", index, b"x").unwrap();
        }
        let indices: Vec<u32> = SessionStore::chunk_files(dir.path())
            .unwrap()
            .into_iter()
            .map(|(index, _)| index)
            .collect();
        assert_eq!(indices, vec![2, 9_999, 10_000]);
    }

    #[test]
    fn test_list_sessions_missing_root_is_empty() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("does-not-exist"));
        assert!(store.list_sessions().is_empty());
        assert!(store.latest().is_none());
    }

    #[test]
    fn test_list_sessions_most_recent_first() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path());

        make_session(&store, at(2024, 1, 1, 10, 0, 0));
        make_session(&store, at(2024, 6, 1, 10, 0, 0));
        make_session(&store, at(2024, 3, 1, 10, 0, 0));
        fs::create_dir(dir.path().join("scratch")).unwrap();
        fs::create_dir(dir.path().join("session_20240701_000000")).unwrap(); // no metadata

        let ids: Vec<String> = store.list_sessions().into_iter().map(|m| m.session_id).collect();
        assert_eq!(
            ids,
            vec![
                "session_20240601_100000",
                "session_20240301_100000",
                "session_20240101_100000",
            ]
        );
    }

    #[test]
    fn test_resolve() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let metadata = make_session(&store, at(2024, 2, 2, 2, 2, 2));

        assert_eq!(store.resolve(&metadata.session_id).unwrap(), dir.path().join(&metadata.session_id));
        assert!(matches!(
            store.resolve("session_19990101_000000"),
            Err(EngineError::NotFound(id)) if id == "session_19990101_000000"
        ));
    }

    #[test]
    fn test_create_existing_session_rejected() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store.create_session_dir("session_20240101_000000").unwrap();
        assert!(matches!(
            store.create_session_dir("session_20240101_000000"),
            Err(EngineError::InvalidState(_))
        ));
    }

    #[test]
    fn test_metadata_rewrite_leaves_no_tmp() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let mut metadata = make_session(&store, at(2024, 5, 5, 5, 5, 5));
        let session_dir = store.resolve(&metadata.session_id).unwrap();

        metadata.total_messages = 42;
        metadata.end_time = Some(at(2024, 5, 5, 5, 6, 5));
        SessionStore::write_metadata(&session_dir, &metadata).unwrap();

        let read = SessionStore::read_metadata(&session_dir).unwrap();
        assert_eq!(read.total_messages, 42);
        assert!(read.is_finalized());

        let leftovers = fs::read_dir(&session_dir)
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }
}
