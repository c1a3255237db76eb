//! Conversation history store and vendor projections
//!
//! The history store is the single source of truth for a session's message
//! sequence. It owns the topic and the ordered, append-only message list,
//! persists the full list after every mutation (overwrite-on-write), and
//! projects it into each vendor's wire shape on demand.
//!
//! Rendering is deliberately not separable from mutation: every render call
//! first appends the outbound message, so the returned array always includes
//! the just-added entry.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::errors::EngineError;
use crate::llm::SpeakerPosition;

/// History length above which older messages get ephemeral cache hints
/// in the Anthropic projection
pub const CACHE_HINT_THRESHOLD: usize = 6;

/// Maximum number of messages carrying a cache hint per request
pub const CACHE_HINT_BUDGET: usize = 4;

/// The most recent messages are never cache-hinted
pub const CACHE_HINT_TAIL_EXEMPT: usize = 2;

/// Where a message came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageOrigin {
    /// Structural tag for outbound text (the opening topic and each
    /// message being sent to a provider)
    Prompt,

    /// Reply produced by the first participant
    First,

    /// Reply produced by the second participant
    Second,
}

impl MessageOrigin {
    /// The origin tag attributing a reply to the given participant
    pub fn participant(position: SpeakerPosition) -> Self {
        match position {
            SpeakerPosition::First => MessageOrigin::First,
            SpeakerPosition::Second => MessageOrigin::Second,
        }
    }

    /// True if this message is a reply from the given participant
    pub fn is_from(&self, position: SpeakerPosition) -> bool {
        *self == Self::participant(position)
    }
}

/// A single utterance, immutable once created
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Origin tag (structural prompt or participant attribution)
    pub origin: MessageOrigin,

    /// Textual content
    pub content: String,
}

impl Message {
    /// Create an outbound prompt-tagged message
    pub fn prompt(content: impl Into<String>) -> Self {
        Self {
            origin: MessageOrigin::Prompt,
            content: content.into(),
        }
    }

    /// Create a reply attributed to a participant
    pub fn reply(position: SpeakerPosition, content: impl Into<String>) -> Self {
        Self {
            origin: MessageOrigin::participant(position),
            content: content.into(),
        }
    }
}

/// The persisted shape of a session's history: `{ topic, messages[] }`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedHistory {
    /// Session topic, fixed at creation
    pub topic: String,

    /// Ordered message list
    pub messages: Vec<Message>,
}

/// Narrow persistence seam for history storage
///
/// The store depends only on this trait, not on a concrete filesystem
/// path, so tests can substitute an in-memory double.
pub trait HistoryBackend: Send + Sync {
    /// Load previously persisted history for a session, if any
    fn load(&self, session_id: &str) -> Result<Option<PersistedHistory>, EngineError>;

    /// Persist the full history for a session (overwrite, not incremental)
    fn save(&self, session_id: &str, history: &PersistedHistory) -> Result<(), EngineError>;
}

/// In-memory history backend for tests
#[derive(Default)]
pub struct MemoryHistoryBackend {
    entries: Mutex<HashMap<String, PersistedHistory>>,
}

impl MemoryHistoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions with persisted history
    pub fn session_count(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }
}

impl HistoryBackend for MemoryHistoryBackend {
    fn load(&self, session_id: &str) -> Result<Option<PersistedHistory>, EngineError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| EngineError::Persistence("History backend lock poisoned".to_string()))?;
        Ok(entries.get(session_id).cloned())
    }

    fn save(&self, session_id: &str, history: &PersistedHistory) -> Result<(), EngineError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| EngineError::Persistence("History backend lock poisoned".to_string()))?;
        entries.insert(session_id.to_string(), history.clone());
        Ok(())
    }
}

/// Owner of a session's message sequence
///
/// Single-writer by construction: only the active turn's call path touches
/// the store, so no locking discipline is needed around the message list.
pub struct HistoryStore {
    session_id: String,
    topic: String,
    messages: Vec<Message>,
    backend: Box<dyn HistoryBackend>,
}

impl HistoryStore {
    /// Open the history for a session: load what was persisted if present,
    /// otherwise start empty with the given topic. Nothing is written until
    /// the first append.
    pub fn open(
        session_id: impl Into<String>,
        topic: impl Into<String>,
        backend: Box<dyn HistoryBackend>,
    ) -> Result<Self, EngineError> {
        let session_id = session_id.into();
        let topic = topic.into();

        match backend.load(&session_id)? {
            Some(persisted) => Ok(Self {
                session_id,
                topic: persisted.topic,
                messages: persisted.messages,
                backend,
            }),
            None => Ok(Self {
                session_id,
                topic,
                messages: Vec::new(),
                backend,
            }),
        }
    }

    /// The session's topic
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The ordered message list
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Append a message and immediately persist the full list
    pub fn push(&mut self, message: Message) -> Result<(), EngineError> {
        self.messages.push(message);
        let persisted = PersistedHistory {
            topic: self.topic.clone(),
            messages: self.messages.clone(),
        };
        self.backend.save(&self.session_id, &persisted)
    }

    /// Append a reply attributed to a participant
    pub fn record_reply(
        &mut self,
        position: SpeakerPosition,
        text: impl Into<String>,
    ) -> Result<(), EngineError> {
        self.push(Message::reply(position, text))
    }

    /// The system-level framing instruction shared by both vendors
    pub fn system_prompt(&self) -> String {
        format!(
            "You are having an ongoing discussion about: {}. \
             Keep your replies concise and build on what has been said so far.",
            self.topic
        )
    }

    /// Append the outbound message, then project the full history into the
    /// OpenAI chat shape: one leading system message, then alternating
    /// user/assistant entries. The speaker's own prior replies map to
    /// "assistant", everything else maps to "user".
    pub fn render_for_openai(
        &mut self,
        new_text: &str,
        speaker: SpeakerPosition,
    ) -> Result<Vec<serde_json::Value>, EngineError> {
        self.push(Message::prompt(new_text))?;

        let mut rendered = Vec::with_capacity(self.messages.len() + 1);
        rendered.push(json!({
            "role": "system",
            "content": self.system_prompt(),
        }));

        for msg in &self.messages {
            let role = if msg.origin.is_from(speaker) {
                "assistant"
            } else {
                "user"
            };
            rendered.push(json!({
                "role": role,
                "content": msg.content,
            }));
        }

        Ok(rendered)
    }

    /// Append the outbound message, then project the full history into the
    /// Anthropic messages shape: no system entry in the array (system content
    /// travels as a separate request field). The other participant's prior
    /// replies map to "assistant", everything else maps to "user".
    ///
    /// When the history is long (more than [`CACHE_HINT_THRESHOLD`] entries
    /// after the append), up to [`CACHE_HINT_BUDGET`] of the older messages
    /// carry an ephemeral cache hint. The last [`CACHE_HINT_TAIL_EXEMPT`]
    /// messages are never hinted; among the eligible rest, hints go to the
    /// oldest first.
    pub fn render_for_anthropic(
        &mut self,
        new_text: &str,
        speaker: SpeakerPosition,
    ) -> Result<Vec<serde_json::Value>, EngineError> {
        self.push(Message::prompt(new_text))?;

        let total = self.messages.len();
        let hintable = if total > CACHE_HINT_THRESHOLD {
            CACHE_HINT_BUDGET.min(total - CACHE_HINT_TAIL_EXEMPT)
        } else {
            0
        };

        let mut rendered = Vec::with_capacity(total);
        for (index, msg) in self.messages.iter().enumerate() {
            let role = if msg.origin.is_from(speaker.other()) {
                "assistant"
            } else {
                "user"
            };

            if index < hintable {
                rendered.push(json!({
                    "role": role,
                    "content": [{
                        "type": "text",
                        "text": msg.content,
                        "cache_control": { "type": "ephemeral" },
                    }],
                }));
            } else {
                rendered.push(json!({
                    "role": role,
                    "content": msg.content,
                }));
            }
        }

        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> HistoryStore {
        HistoryStore::open(
            "session-1",
            "Discuss renewable energy",
            Box::new(MemoryHistoryBackend::new()),
        )
        .unwrap()
    }

    fn seed(store: &mut HistoryStore, replies: usize) {
        for i in 0..replies {
            let position = if i % 2 == 0 {
                SpeakerPosition::First
            } else {
                SpeakerPosition::Second
            };
            store.record_reply(position, format!("reply {}", i)).unwrap();
        }
    }

    #[test]
    fn test_open_loads_persisted_history() {
        let backend = MemoryHistoryBackend::new();
        backend
            .save(
                "s",
                &PersistedHistory {
                    topic: "old topic".to_string(),
                    messages: vec![Message::prompt("hello")],
                },
            )
            .unwrap();

        let store = HistoryStore::open("s", "new topic", Box::new(backend)).unwrap();
        // The persisted topic wins over the one passed at open time
        assert_eq!(store.topic(), "old topic");
        assert_eq!(store.messages().len(), 1);
    }

    #[test]
    fn test_push_persists_every_mutation() {
        let mut store = store();
        assert_eq!(store.messages().len(), 0);

        store.push(Message::prompt("one")).unwrap();
        store.record_reply(SpeakerPosition::First, "two").unwrap();

        let reloaded = store.backend.load("session-1").unwrap().unwrap();
        assert_eq!(reloaded.messages.len(), 2);
        assert_eq!(reloaded.messages[1].origin, MessageOrigin::First);
    }

    #[test]
    fn test_openai_render_has_single_leading_system_message() {
        let mut store = store();
        seed(&mut store, 3);

        let rendered = store
            .render_for_openai("next message", SpeakerPosition::First)
            .unwrap();

        let system_count = rendered
            .iter()
            .filter(|m| m["role"] == "system")
            .count();
        assert_eq!(system_count, 1);
        assert_eq!(rendered[0]["role"], "system");
        assert!(rendered[0]["content"]
            .as_str()
            .unwrap()
            .contains("Discuss renewable energy"));
    }

    #[test]
    fn test_openai_render_role_mapping() {
        let mut store = store();
        store.record_reply(SpeakerPosition::First, "from first").unwrap();
        store.record_reply(SpeakerPosition::Second, "from second").unwrap();

        let rendered = store
            .render_for_openai("outbound", SpeakerPosition::First)
            .unwrap();

        // system, first's reply (own -> assistant), second's reply (-> user),
        // new outbound prompt (-> user)
        assert_eq!(rendered.len(), 4);
        assert_eq!(rendered[1]["role"], "assistant");
        assert_eq!(rendered[2]["role"], "user");
        assert_eq!(rendered[3]["role"], "user");
        assert_eq!(rendered[3]["content"], "outbound");
    }

    #[test]
    fn test_render_appends_new_message_as_final_entry() {
        let mut store = store();
        seed(&mut store, 4);

        let rendered = store
            .render_for_anthropic("the newest", SpeakerPosition::Second)
            .unwrap();
        assert_eq!(rendered.last().unwrap()["content"], "the newest");

        // Prior order preserved
        for (i, msg) in store.messages().iter().take(4).enumerate() {
            assert_eq!(msg.content, format!("reply {}", i));
        }
        assert_eq!(store.messages().len(), 5);
    }

    #[test]
    fn test_anthropic_render_has_no_system_entry() {
        let mut store = store();
        seed(&mut store, 5);

        let rendered = store
            .render_for_anthropic("outbound", SpeakerPosition::Second)
            .unwrap();
        assert!(rendered.iter().all(|m| m["role"] != "system"));
    }

    #[test]
    fn test_anthropic_render_role_mapping() {
        let mut store = store();
        store.record_reply(SpeakerPosition::First, "from first").unwrap();
        store.record_reply(SpeakerPosition::Second, "from second").unwrap();

        let rendered = store
            .render_for_anthropic("outbound", SpeakerPosition::Second)
            .unwrap();

        // The other participant's replies map to assistant, everything else
        // (own replies included) maps to user.
        assert_eq!(rendered[0]["role"], "assistant");
        assert_eq!(rendered[1]["role"], "user");
        assert_eq!(rendered[2]["role"], "user");
    }

    #[test]
    fn test_no_cache_hints_at_or_below_threshold() {
        let mut store = store();
        seed(&mut store, 5);

        // 5 replies + 1 outbound = 6 total, not > 6
        let rendered = store
            .render_for_anthropic("outbound", SpeakerPosition::First)
            .unwrap();
        assert_eq!(rendered.len(), 6);
        assert!(rendered.iter().all(|m| m["content"].is_string()));
    }

    #[test]
    fn test_cache_hints_above_threshold() {
        let mut store = store();
        seed(&mut store, 8);

        // 8 replies + 1 outbound = 9 total
        let rendered = store
            .render_for_anthropic("outbound", SpeakerPosition::First)
            .unwrap();
        assert_eq!(rendered.len(), 9);

        let hinted: Vec<usize> = rendered
            .iter()
            .enumerate()
            .filter(|(_, m)| m["content"].is_array())
            .map(|(i, _)| i)
            .collect();

        // Oldest eligible messages first, capped at the slot budget
        assert_eq!(hinted, vec![0, 1, 2, 3]);
        assert_eq!(
            rendered[0]["content"][0]["cache_control"]["type"],
            "ephemeral"
        );

        // The last two are never hinted
        assert!(rendered[7]["content"].is_string());
        assert!(rendered[8]["content"].is_string());
    }

    #[test]
    fn test_cache_hints_at_boundary_length_seven() {
        let mut store = store();
        seed(&mut store, 6);

        // 6 replies + 1 outbound = 7 total: hints apply, capped by budget
        let rendered = store
            .render_for_anthropic("outbound", SpeakerPosition::First)
            .unwrap();
        assert_eq!(rendered.len(), 7);

        let hinted = rendered.iter().filter(|m| m["content"].is_array()).count();
        assert!(hinted <= CACHE_HINT_BUDGET);
        assert!(hinted >= 1);
        // Terminal messages stay plain
        assert!(rendered[5]["content"].is_string());
        assert!(rendered[6]["content"].is_string());
    }
}
