//! Durable multi-session conversation history.
//!
//! The whole store is one JSON record rewritten on every mutation. Loading
//! and saving never fail the caller: a missing, corrupt or foreign record
//! opens as an empty store, and a failed save leaves the in-memory state
//! authoritative until the next successful write.

use std::collections::{BTreeMap, HashMap};
use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::core::config::data::path_display;
use crate::core::message::{now_millis, Message, MoodState, Session};
use crate::utils::ids;

/// Name of the persisted record.
pub const STORAGE_KEY: &str = "ai-therapy-sessions";

/// Schema version written into every record; anything else loads as empty.
pub const SCHEMA_VERSION: u32 = 1;

const TOP_TOPIC_LIMIT: usize = 5;

pub type SharedSessionStore = Arc<Mutex<SessionStore>>;

/// Lock a shared store, recovering the data if a previous holder panicked.
pub fn lock(store: &SharedSessionStore) -> MutexGuard<'_, SessionStore> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Errors raised while reading or writing the persisted record.
#[derive(Debug)]
pub enum StorageError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    UnsupportedVersion {
        path: PathBuf,
        found: Option<u32>,
    },
    Invalid {
        path: PathBuf,
        reason: String,
    },
    Write {
        path: PathBuf,
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Read { path, source } => {
                write!(f, "Failed to read sessions at {}: {}", path_display(path), source)
            }
            StorageError::Parse { path, source } => {
                write!(f, "Failed to parse sessions at {}: {}", path_display(path), source)
            }
            StorageError::UnsupportedVersion { path, found } => match found {
                Some(version) => write!(
                    f,
                    "Sessions at {} use schema version {version}, expected {SCHEMA_VERSION}",
                    path_display(path)
                ),
                None => write!(
                    f,
                    "Sessions at {} carry no schema version",
                    path_display(path)
                ),
            },
            StorageError::Invalid { path, reason } => {
                write!(f, "Invalid sessions at {}: {}", path_display(path), reason)
            }
            StorageError::Write { path, source } => {
                write!(f, "Failed to save sessions to {}: {}", path_display(path), source)
            }
        }
    }
}

impl StdError for StorageError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            StorageError::Read { source, .. } => Some(source),
            StorageError::Parse { source, .. } => Some(source),
            StorageError::Write { source, .. } => Some(source.as_ref()),
            StorageError::UnsupportedVersion { .. } | StorageError::Invalid { .. } => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct VersionHeader {
    #[serde(default)]
    version: Option<u32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedRecord {
    version: u32,
    sessions: BTreeMap<String, Session>,
    current_session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopicCount {
    pub topic: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionMetrics {
    pub total_sessions: usize,
    pub total_messages: usize,
    pub avg_messages_per_session: f64,
    pub top_topics: Vec<TopicCount>,
}

pub struct SessionStore {
    path: Option<PathBuf>,
    sessions: BTreeMap<String, Session>,
    current_session_id: Option<String>,
}

impl SessionStore {
    /// Open the store backed by `path`, falling back to an empty store when
    /// the record is absent or unusable.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let record = match Self::load(&path) {
            Ok(record) => record,
            Err(err) => {
                warn!(error = %err, "Starting with an empty session store");
                PersistedRecord::default()
            }
        };

        let mut store = Self {
            path: Some(path),
            sessions: record.sessions,
            current_session_id: record.current_session_id,
        };
        if let Some(current) = store.current_session_id.as_deref() {
            if !store.sessions.contains_key(current) {
                debug!(session_id = current, "Dropping dangling current session pointer");
                store.current_session_id = None;
            }
        }
        store
    }

    /// A store that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            sessions: BTreeMap::new(),
            current_session_id: None,
        }
    }

    /// Default record location inside the platform data directory.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "haven", "haven")
            .map(|dirs| dirs.data_dir().join(format!("{STORAGE_KEY}.json")))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn into_shared(self) -> SharedSessionStore {
        Arc::new(Mutex::new(self))
    }

    fn load(path: &Path) -> Result<PersistedRecord, StorageError> {
        if !path.exists() {
            debug!(path = %path_display(path), "No persisted sessions yet");
            return Ok(PersistedRecord::default());
        }

        let contents = fs::read(path).map_err(|source| StorageError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let header: VersionHeader =
            serde_json::from_slice(&contents).map_err(|source| StorageError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        if header.version != Some(SCHEMA_VERSION) {
            return Err(StorageError::UnsupportedVersion {
                path: path.to_path_buf(),
                found: header.version,
            });
        }

        let record: PersistedRecord =
            serde_json::from_slice(&contents).map_err(|source| StorageError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Self::validate(&record).map_err(|reason| StorageError::Invalid {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(record)
    }

    fn validate(record: &PersistedRecord) -> Result<(), String> {
        for (key, session) in &record.sessions {
            if key != &session.id {
                return Err(format!("session stored under {key:?} has id {:?}", session.id));
            }
            if session.last_active < session.created_at {
                return Err(format!("session {key:?} was last active before it was created"));
            }
        }
        Ok(())
    }

    /// Rewrite the full record atomically.
    pub fn save(&self) -> Result<(), StorageError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        let write_error = |source: Box<dyn StdError + Send + Sync>| StorageError::Write {
            path: path.to_path_buf(),
            source,
        };

        let record = PersistedRecord {
            version: SCHEMA_VERSION,
            sessions: self.sessions.clone(),
            current_session_id: self.current_session_id.clone(),
        };
        let contents = serde_json::to_vec(&record).map_err(|err| write_error(Box::new(err)))?;

        let parent = path.parent().filter(|dir| !dir.as_os_str().is_empty());
        if let Some(dir) = parent {
            fs::create_dir_all(dir).map_err(|err| write_error(Box::new(err)))?;
        }
        let mut temp_file = match parent {
            Some(dir) => NamedTempFile::new_in(dir),
            None => NamedTempFile::new(),
        }
        .map_err(|err| write_error(Box::new(err)))?;

        temp_file
            .write_all(&contents)
            .map_err(|err| write_error(Box::new(err)))?;
        temp_file
            .as_file_mut()
            .sync_all()
            .map_err(|err| write_error(Box::new(err)))?;
        temp_file
            .persist(path)
            .map_err(|err| write_error(Box::new(err)))?;
        Ok(())
    }

    fn persist(&self) {
        if let Err(err) = self.save() {
            warn!(error = %err, "Session changes kept in memory only");
        }
    }

    pub fn create_session(&mut self) -> String {
        let session_id = ids::session_id();
        self.sessions
            .insert(session_id.clone(), Session::new(session_id.clone(), now_millis()));
        self.current_session_id = Some(session_id.clone());
        self.persist();
        session_id
    }

    /// Append `message`, bump the session's activity time and absorb any
    /// topics carried in the message metadata.
    pub fn add_message(&mut self, session_id: &str, message: Message) {
        let Some(session) = self.sessions.get_mut(session_id) else {
            debug!(session_id, "Ignoring message for unknown session");
            return;
        };
        session.push_message(message, now_millis());
        self.persist();
    }

    pub fn current_session_id(&self) -> Option<&str> {
        self.current_session_id.as_deref()
    }

    pub fn current_session(&self) -> Option<&Session> {
        self.current_session_id
            .as_deref()
            .and_then(|id| self.sessions.get(id))
    }

    pub fn session(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    /// All sessions, most recently active first.
    pub fn all_sessions(&self) -> Vec<&Session> {
        let mut sessions: Vec<&Session> = self.sessions.values().collect();
        sessions.sort_by(|a, b| b.last_active.cmp(&a.last_active));
        sessions
    }

    pub fn set_current_session(&mut self, session_id: &str) -> bool {
        if !self.sessions.contains_key(session_id) {
            return false;
        }
        self.current_session_id = Some(session_id.to_string());
        self.persist();
        true
    }

    pub fn update_session_topics(&mut self, session_id: &str, topics: &[String]) {
        if let Some(session) = self.sessions.get_mut(session_id) {
            session.merge_topics(topics);
            self.persist();
        }
    }

    pub fn set_mood(&mut self, session_id: &str, mood: Option<MoodState>) {
        if let Some(session) = self.sessions.get_mut(session_id) {
            session.mood = mood;
            self.persist();
        }
    }

    pub fn delete_session(&mut self, session_id: &str) -> bool {
        let removed = self.sessions.remove(session_id).is_some();
        if self.current_session_id.as_deref() == Some(session_id) {
            self.current_session_id = None;
        }
        self.persist();
        removed
    }

    pub fn clear_all_sessions(&mut self) {
        self.sessions.clear();
        self.current_session_id = None;
        self.persist();
    }

    pub fn metrics(&self) -> SessionMetrics {
        let total_sessions = self.sessions.len();
        let total_messages: usize = self
            .sessions
            .values()
            .map(|session| session.messages.len())
            .sum();

        let mut topic_counts: HashMap<&str, usize> = HashMap::new();
        for session in self.sessions.values() {
            for topic in &session.topics {
                *topic_counts.entry(topic.as_str()).or_default() += 1;
            }
        }
        let mut top_topics: Vec<TopicCount> = topic_counts
            .into_iter()
            .map(|(topic, count)| TopicCount {
                topic: topic.to_string(),
                count,
            })
            .collect();
        top_topics.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.topic.cmp(&b.topic)));
        top_topics.truncate(TOP_TOPIC_LIMIT);

        SessionMetrics {
            total_sessions,
            total_messages,
            avg_messages_per_session: if total_sessions > 0 {
                total_messages as f64 / total_sessions as f64
            } else {
                0.0
            },
            top_topics,
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::in_memory()
    }
}
