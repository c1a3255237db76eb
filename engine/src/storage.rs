//! Session persistence layout on disk
//!
//! All durable state is keyed by session identifier under
//! `{data_dir}/sessions/{session_id}/`:
//!
//! - `history.json` — the `{ topic, messages[] }` document, overwritten on
//!   every append
//! - `turns/turn_NNN.json` — one document per completed turn
//! - `conversation.log` — the per-session leveled log
//! - `transcript.json` — the final transcript, written once on completion
//!
//! Overwrite-on-write is not crash-atomic, which is acceptable under the
//! single-writer-per-session assumption. Independent sessions never share
//! files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::conversation::{ConversationTranscript, SessionStatus, TurnRecord, TurnStore};
use crate::errors::EngineError;
use crate::history::{HistoryBackend, PersistedHistory};

/// Layout of all per-session files under one data directory
#[derive(Debug, Clone)]
pub struct SessionStorage {
    sessions_dir: PathBuf,
}

impl SessionStorage {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            sessions_dir: data_dir.join("sessions"),
        }
    }

    /// Directory holding one session's files
    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(session_id)
    }

    /// Path of a session's conversation log
    pub fn log_path(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join("conversation.log")
    }

    /// Path of a session's final transcript
    pub fn transcript_path(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join("transcript.json")
    }

    /// History backend rooted at this layout
    pub fn history_backend(&self) -> FileHistoryBackend {
        FileHistoryBackend {
            sessions_dir: self.sessions_dir.clone(),
        }
    }

    /// Turn store rooted at this layout
    pub fn turn_store(&self) -> FileTurnStore {
        FileTurnStore {
            sessions_dir: self.sessions_dir.clone(),
        }
    }

    /// Write the final transcript and return its path
    pub fn write_transcript(
        &self,
        transcript: &ConversationTranscript,
    ) -> Result<PathBuf, EngineError> {
        let path = self.transcript_path(&transcript.session_id);
        ensure_parent(&path)?;

        let json = serde_json::to_string_pretty(transcript)
            .map_err(|e| EngineError::Persistence(format!("Failed to serialize transcript: {}", e)))?;
        fs::write(&path, json).map_err(|e| {
            EngineError::Persistence(format!(
                "Failed to write transcript {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(path)
    }

    /// Load a session's transcript if one was written
    pub fn load_transcript(
        &self,
        session_id: &str,
    ) -> Result<Option<ConversationTranscript>, EngineError> {
        let path = self.transcript_path(session_id);
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&path).map_err(|e| {
            EngineError::Persistence(format!(
                "Failed to read transcript {}: {}",
                path.display(),
                e
            ))
        })?;
        let transcript = serde_json::from_str(&contents).map_err(|e| {
            EngineError::Persistence(format!(
                "Failed to parse transcript {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(Some(transcript))
    }

    /// Load all persisted turn records for a session, sorted by index
    pub fn load_turns(&self, session_id: &str) -> Result<Vec<TurnRecord>, EngineError> {
        self.turn_store().load_all(session_id)
    }

    /// List recorded sessions, newest first
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>, EngineError> {
        if !self.sessions_dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.sessions_dir).map_err(|e| {
            EngineError::Persistence(format!(
                "Failed to read sessions directory {}: {}",
                self.sessions_dir.display(),
                e
            ))
        })?;

        let mut summaries = Vec::new();
        for entry in entries.flatten() {
            if !entry.path().is_dir() {
                continue;
            }
            let session_id = entry.file_name().to_string_lossy().to_string();
            summaries.push(self.summarize(&session_id)?);
        }

        summaries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(summaries)
    }

    /// Summary for a single session directory
    fn summarize(&self, session_id: &str) -> Result<SessionSummary, EngineError> {
        if let Some(transcript) = self.load_transcript(session_id)? {
            return Ok(SessionSummary {
                session_id: session_id.to_string(),
                topic: transcript.topic,
                status: Some(transcript.status),
                started_at: Some(transcript.started_at),
                turns: transcript.actual_turns,
            });
        }

        // No transcript: the session failed or is still in progress. Take the
        // topic from the history document and count what was persisted.
        let topic = self
            .history_backend()
            .load(session_id)?
            .map(|h| h.topic)
            .unwrap_or_default();
        let turns = self.load_turns(session_id)?.len() as u32;
        let started_at = self
            .load_turns(session_id)?
            .first()
            .map(|r| r.started_at);

        Ok(SessionSummary {
            session_id: session_id.to_string(),
            topic,
            status: None,
            started_at,
            turns,
        })
    }
}

/// One row of the `history` command output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub topic: String,
    /// Terminal status when a transcript exists; `None` for an unfinished
    /// or failed session
    pub status: Option<SessionStatus>,
    pub started_at: Option<DateTime<Utc>>,
    pub turns: u32,
}

/// Filesystem history backend: full-file JSON overwrite per mutation
pub struct FileHistoryBackend {
    sessions_dir: PathBuf,
}

impl FileHistoryBackend {
    fn history_path(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(session_id).join("history.json")
    }
}

impl HistoryBackend for FileHistoryBackend {
    fn load(&self, session_id: &str) -> Result<Option<PersistedHistory>, EngineError> {
        let path = self.history_path(session_id);
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&path).map_err(|e| {
            EngineError::Persistence(format!("Failed to read history {}: {}", path.display(), e))
        })?;
        let history = serde_json::from_str(&contents).map_err(|e| {
            EngineError::Persistence(format!("Failed to parse history {}: {}", path.display(), e))
        })?;

        Ok(Some(history))
    }

    fn save(&self, session_id: &str, history: &PersistedHistory) -> Result<(), EngineError> {
        let path = self.history_path(session_id);
        ensure_parent(&path)?;

        let json = serde_json::to_string_pretty(history)
            .map_err(|e| EngineError::Persistence(format!("Failed to serialize history: {}", e)))?;
        fs::write(&path, json).map_err(|e| {
            EngineError::Persistence(format!("Failed to write history {}: {}", path.display(), e))
        })
    }
}

/// Filesystem turn store: one JSON document per turn
pub struct FileTurnStore {
    sessions_dir: PathBuf,
}

impl FileTurnStore {
    fn turns_dir(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(session_id).join("turns")
    }

    fn turn_path(&self, session_id: &str, turn: u32) -> PathBuf {
        self.turns_dir(session_id)
            .join(format!("turn_{:03}.json", turn))
    }
}

impl TurnStore for FileTurnStore {
    fn save(&self, session_id: &str, record: &TurnRecord) -> Result<(), EngineError> {
        let path = self.turn_path(session_id, record.turn);
        ensure_parent(&path)?;

        let json = serde_json::to_string_pretty(record).map_err(|e| {
            EngineError::Persistence(format!("Failed to serialize turn record: {}", e))
        })?;
        fs::write(&path, json).map_err(|e| {
            EngineError::Persistence(format!(
                "Failed to write turn record {}: {}",
                path.display(),
                e
            ))
        })
    }

    fn load_all(&self, session_id: &str) -> Result<Vec<TurnRecord>, EngineError> {
        let dir = self.turns_dir(session_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&dir).map_err(|e| {
            EngineError::Persistence(format!(
                "Failed to read turns directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        let mut records = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let contents = fs::read_to_string(&path).map_err(|e| {
                EngineError::Persistence(format!(
                    "Failed to read turn record {}: {}",
                    path.display(),
                    e
                ))
            })?;
            let record: TurnRecord = serde_json::from_str(&contents).map_err(|e| {
                EngineError::Persistence(format!(
                    "Failed to parse turn record {}: {}",
                    path.display(),
                    e
                ))
            })?;
            records.push(record);
        }

        records.sort_by_key(|r| r.turn);
        Ok(records)
    }
}

fn ensure_parent(path: &Path) -> Result<(), EngineError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            EngineError::Persistence(format!(
                "Failed to create directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::TokenUsage;
    use crate::history::Message;
    use crate::llm::{ProviderKind, SpeakerPosition};

    fn record(turn: u32) -> TurnRecord {
        TurnRecord {
            turn,
            speaker: SpeakerPosition::First,
            provider: ProviderKind::OpenAi,
            model: "gpt-4o-mini".to_string(),
            started_at: Utc::now(),
            elapsed_ms: 10,
            input: "in".to_string(),
            output: "out".to_string(),
            usage: TokenUsage::from_openai(1, 2, 3),
            raw_response: serde_json::json!({"id": "resp"}),
        }
    }

    #[test]
    fn test_history_backend_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SessionStorage::new(dir.path());
        let backend = storage.history_backend();

        assert!(backend.load("s1").unwrap().is_none());

        let history = PersistedHistory {
            topic: "Discuss renewable energy".to_string(),
            messages: vec![
                Message::prompt("Discuss renewable energy"),
                Message::reply(SpeakerPosition::First, "Solar is getting cheap."),
            ],
        };
        backend.save("s1", &history).unwrap();

        let loaded = backend.load("s1").unwrap().unwrap();
        assert_eq!(loaded, history);
    }

    #[test]
    fn test_turn_store_roundtrip_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStorage::new(dir.path()).turn_store();

        store.save("s1", &record(2)).unwrap();
        store.save("s1", &record(1)).unwrap();
        store.save("s1", &record(10)).unwrap();

        let loaded = store.load_all("s1").unwrap();
        assert_eq!(
            loaded.iter().map(|r| r.turn).collect::<Vec<_>>(),
            vec![1, 2, 10]
        );
        assert!(store.load_all("other").unwrap().is_empty());
    }

    #[test]
    fn test_sessions_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SessionStorage::new(dir.path());
        let store = storage.turn_store();

        store.save("a", &record(1)).unwrap();
        store.save("b", &record(1)).unwrap();

        assert_eq!(store.load_all("a").unwrap().len(), 1);
        assert_eq!(store.load_all("b").unwrap().len(), 1);
        assert_ne!(storage.session_dir("a"), storage.session_dir("b"));
    }

    #[test]
    fn test_list_sessions_without_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SessionStorage::new(dir.path());

        storage.turn_store().save("s1", &record(1)).unwrap();
        storage
            .history_backend()
            .save(
                "s1",
                &PersistedHistory {
                    topic: "a topic".to_string(),
                    messages: vec![],
                },
            )
            .unwrap();

        let sessions = storage.list_sessions().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].topic, "a topic");
        assert_eq!(sessions[0].turns, 1);
        assert!(sessions[0].status.is_none());
    }
}
