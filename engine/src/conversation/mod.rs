//! Conversation orchestration, turn records, and transcripts
//!
//! Types shared across the conversation core: session status, normalized
//! token accounting, the per-turn record written after every successful
//! exchange, and the final transcript handed to downstream serialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Mutex;

use crate::errors::EngineError;
use crate::llm::{ProviderKind, SpeakerPosition};

pub mod orchestrator;

pub use orchestrator::ConversationOrchestrator;

/// Minimum configured turn count for a session
pub const MIN_TURNS: u32 = 2;

/// Maximum configured turn count for a session
pub const MAX_TURNS: u32 = 50;

/// Reject turn budgets outside the supported range, before any side effect
pub fn validate_turn_budget(max_turns: u32) -> Result<(), EngineError> {
    if !(MIN_TURNS..=MAX_TURNS).contains(&max_turns) {
        return Err(EngineError::Config(format!(
            "max_turns must be between {} and {}, got {}",
            MIN_TURNS, MAX_TURNS, max_turns
        )));
    }
    Ok(())
}

/// Lifecycle state of a conversation session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created but not yet running
    NotStarted,

    /// Turn loop in progress
    Running,

    /// All configured turns completed, transcript produced
    Completed,

    /// Aborted by an unrecovered error, no transcript produced
    Failed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::NotStarted => write!(f, "not_started"),
            SessionStatus::Running => write!(f, "running"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Token accounting normalized across both vendors
///
/// OpenAI reports prompt/completion/total; Anthropic reports input/output
/// with the total computed as their sum. Absent subcomponents are omitted
/// from serialized records.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    /// Total tokens for the turn
    pub total: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<u64>,
}

impl TokenUsage {
    /// Normalize an OpenAI-style usage block
    pub fn from_openai(prompt: u64, completion: u64, total: u64) -> Self {
        Self {
            total,
            prompt: Some(prompt),
            completion: Some(completion),
            input: None,
            output: None,
        }
    }

    /// Normalize an Anthropic-style usage block (total = input + output)
    pub fn from_anthropic(input: u64, output: u64) -> Self {
        Self {
            total: input + output,
            prompt: None,
            completion: None,
            input: Some(input),
            output: Some(output),
        }
    }
}

/// The durable record of one completed turn
///
/// Created by a provider adapter on successful response, never mutated
/// afterwards. Turn indices are 1-based, unique, and strictly increasing
/// within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    /// 1-based turn index
    pub turn: u32,

    /// Which conversation slot spoke
    pub speaker: SpeakerPosition,

    /// Vendor backend that produced the reply
    pub provider: ProviderKind,

    /// Resolved model name for this turn
    pub model: String,

    /// When the turn started
    pub started_at: DateTime<Utc>,

    /// Wall-clock duration of the turn, covering every retry attempt
    pub elapsed_ms: u64,

    /// Text sent to the provider
    pub input: String,

    /// Text received from the provider
    pub output: String,

    /// Normalized token accounting
    pub usage: TokenUsage,

    /// Raw provider response payload, kept for audit purposes
    pub raw_response: serde_json::Value,
}

/// Narrow persistence seam for per-turn records
pub trait TurnStore: Send + Sync {
    /// Persist one turn record, keyed by session and turn index
    fn save(&self, session_id: &str, record: &TurnRecord) -> Result<(), EngineError>;

    /// Load all persisted records for a session, sorted by turn index
    fn load_all(&self, session_id: &str) -> Result<Vec<TurnRecord>, EngineError>;
}

/// In-memory turn store for tests
#[derive(Default)]
pub struct MemoryTurnStore {
    records: Mutex<HashMap<String, BTreeMap<u32, TurnRecord>>>,
}

impl MemoryTurnStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records across all sessions
    pub fn record_count(&self) -> usize {
        self.records
            .lock()
            .map(|r| r.values().map(|s| s.len()).sum())
            .unwrap_or(0)
    }
}

impl TurnStore for MemoryTurnStore {
    fn save(&self, session_id: &str, record: &TurnRecord) -> Result<(), EngineError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| EngineError::Persistence("Turn store lock poisoned".to_string()))?;
        records
            .entry(session_id.to_string())
            .or_default()
            .insert(record.turn, record.clone());
        Ok(())
    }

    fn load_all(&self, session_id: &str) -> Result<Vec<TurnRecord>, EngineError> {
        let records = self
            .records
            .lock()
            .map_err(|_| EngineError::Persistence("Turn store lock poisoned".to_string()))?;
        Ok(records
            .get(session_id)
            .map(|s| s.values().cloned().collect())
            .unwrap_or_default())
    }
}

/// Participant-to-provider/model mapping recorded in the transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub position: SpeakerPosition,
    pub provider: ProviderKind,
    pub model: String,
}

/// Aggregate statistics over a completed session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptStats {
    /// Sum of all turns' token totals
    pub total_tokens: u64,

    /// Token totals grouped by provider name
    pub tokens_by_provider: BTreeMap<String, u64>,

    /// Mean response time across all turns, in milliseconds
    pub average_response_ms: f64,
}

impl TranscriptStats {
    /// Compute aggregates over the persisted turn records
    pub fn from_records(records: &[TurnRecord]) -> Self {
        let total_tokens = records.iter().map(|r| r.usage.total).sum();

        let mut tokens_by_provider = BTreeMap::new();
        for record in records {
            *tokens_by_provider
                .entry(record.provider.to_string())
                .or_insert(0u64) += record.usage.total;
        }

        let average_response_ms = if records.is_empty() {
            0.0
        } else {
            records.iter().map(|r| r.elapsed_ms as f64).sum::<f64>() / records.len() as f64
        };

        Self {
            total_tokens,
            tokens_by_provider,
            average_response_ms,
        }
    }
}

/// The finished, immutable artifact of a completed session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTranscript {
    /// Unique session identifier
    pub session_id: String,

    /// Session topic
    pub topic: String,

    /// Terminal status (always `completed` when a transcript exists)
    pub status: SessionStatus,

    /// Session start time
    pub started_at: DateTime<Utc>,

    /// Session end time
    pub finished_at: DateTime<Utc>,

    /// Total session duration in milliseconds, delays included
    pub duration_ms: u64,

    /// Which provider and model each slot used
    pub participants: Vec<ParticipantInfo>,

    /// Number of turns actually completed
    pub actual_turns: u32,

    /// The ordered turn records
    pub turns: Vec<TurnRecord>,

    /// Aggregate statistics
    pub stats: TranscriptStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(turn: u32, provider: ProviderKind, total: u64, elapsed_ms: u64) -> TurnRecord {
        TurnRecord {
            turn,
            speaker: if turn % 2 == 1 {
                SpeakerPosition::First
            } else {
                SpeakerPosition::Second
            },
            provider,
            model: "test-model".to_string(),
            started_at: Utc::now(),
            elapsed_ms,
            input: format!("input {}", turn),
            output: format!("output {}", turn),
            usage: TokenUsage {
                total,
                ..Default::default()
            },
            raw_response: serde_json::json!({}),
        }
    }

    #[test]
    fn test_turn_budget_validation() {
        assert!(validate_turn_budget(0).is_err());
        assert!(validate_turn_budget(1).is_err());
        assert!(validate_turn_budget(2).is_ok());
        assert!(validate_turn_budget(50).is_ok());
        assert!(validate_turn_budget(51).is_err());
    }

    #[test]
    fn test_token_usage_normalization() {
        let openai = TokenUsage::from_openai(10, 5, 15);
        assert_eq!(openai.total, 15);
        assert_eq!(openai.prompt, Some(10));
        assert_eq!(openai.input, None);

        let anthropic = TokenUsage::from_anthropic(7, 3);
        assert_eq!(anthropic.total, 10);
        assert_eq!(anthropic.input, Some(7));
        assert_eq!(anthropic.prompt, None);
    }

    #[test]
    fn test_token_usage_serialization_omits_absent_fields() {
        let usage = TokenUsage::from_anthropic(7, 3);
        let json = serde_json::to_string(&usage).unwrap();
        assert!(json.contains("\"input\""));
        assert!(!json.contains("\"prompt\""));
    }

    #[test]
    fn test_stats_aggregation() {
        let records = vec![
            record(1, ProviderKind::OpenAi, 100, 200),
            record(2, ProviderKind::Anthropic, 50, 400),
            record(3, ProviderKind::OpenAi, 25, 600),
        ];

        let stats = TranscriptStats::from_records(&records);
        assert_eq!(stats.total_tokens, 175);
        assert_eq!(stats.tokens_by_provider["openai"], 125);
        assert_eq!(stats.tokens_by_provider["anthropic"], 50);
        assert!((stats.average_response_ms - 400.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_stats_on_empty_records() {
        let stats = TranscriptStats::from_records(&[]);
        assert_eq!(stats.total_tokens, 0);
        assert_eq!(stats.average_response_ms, 0.0);
    }

    #[test]
    fn test_memory_turn_store_sorts_by_turn_index() {
        let store = MemoryTurnStore::new();
        store.save("s", &record(2, ProviderKind::Anthropic, 1, 1)).unwrap();
        store.save("s", &record(1, ProviderKind::OpenAi, 1, 1)).unwrap();

        let loaded = store.load_all("s").unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].turn, 1);
        assert_eq!(loaded[1].turn, 2);
        assert!(store.load_all("other").unwrap().is_empty());
    }

    #[test]
    fn test_session_status_serialization() {
        let json = serde_json::to_string(&SessionStatus::NotStarted).unwrap();
        assert_eq!(json, "\"not_started\"");
        assert_eq!(SessionStatus::Completed.to_string(), "completed");
    }
}
