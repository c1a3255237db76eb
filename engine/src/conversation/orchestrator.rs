//! The conversation turn loop
//!
//! Drives a full two-party session from the opening topic to the final
//! transcript. One turn at a time, strictly sequential: the only suspension
//! points are the provider call inside each adapter and the fixed
//! inter-message delay between turns.

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{
    validate_turn_budget, ConversationTranscript, ParticipantInfo, SessionStatus,
    TranscriptStats, TurnStore,
};
use crate::errors::EngineError;
use crate::history::HistoryStore;
use crate::llm::{ProviderAdapter, SpeakerPosition, TurnRequest};

/// Runs the full two-party conversation state machine:
/// `NotStarted -> Running -> Completed` on success, `Running -> Failed` on
/// any unrecovered adapter error.
pub struct ConversationOrchestrator {
    session_id: String,
    first: Arc<dyn ProviderAdapter>,
    second: Arc<dyn ProviderAdapter>,
    history: HistoryStore,
    turns: Arc<dyn TurnStore>,
    max_turns: u32,
    turn_delay: Duration,
    status: SessionStatus,
}

impl std::fmt::Debug for ConversationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationOrchestrator")
            .field("session_id", &self.session_id)
            .field("max_turns", &self.max_turns)
            .field("turn_delay", &self.turn_delay)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl ConversationOrchestrator {
    /// Create an orchestrator for one session.
    ///
    /// The turn budget is validated here, before any side effect. The two
    /// adapters must occupy the `first` and `second` slots respectively.
    pub fn new(
        session_id: impl Into<String>,
        first: Arc<dyn ProviderAdapter>,
        second: Arc<dyn ProviderAdapter>,
        history: HistoryStore,
        turns: Arc<dyn TurnStore>,
        max_turns: u32,
        turn_delay: Duration,
    ) -> Result<Self, EngineError> {
        validate_turn_budget(max_turns)?;

        if first.position() != SpeakerPosition::First
            || second.position() != SpeakerPosition::Second
        {
            return Err(EngineError::Config(
                "Adapters must be constructed for the 'first' and 'second' slots".to_string(),
            ));
        }

        Ok(Self {
            session_id: session_id.into(),
            first,
            second,
            history,
            turns,
            max_turns,
            turn_delay,
            status: SessionStatus::NotStarted,
        })
    }

    /// Current lifecycle state
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Run the turn loop to completion and assemble the transcript.
    ///
    /// The seed message is the session topic. Participants alternate
    /// starting with `first`; each successful turn's output becomes the next
    /// turn's input. The inter-message delay applies between every pair of
    /// turns and is skipped only after the very last one. Any adapter error
    /// aborts the session with no partial transcript.
    pub async fn run(&mut self) -> Result<ConversationTranscript, EngineError> {
        self.status = SessionStatus::Running;

        let started_at = Utc::now();
        let started = Instant::now();
        let topic = self.history.topic().to_string();
        let mut current = topic.clone();

        tracing::info!(
            session_id = %self.session_id,
            topic = %topic,
            max_turns = self.max_turns,
            "Starting conversation"
        );

        for turn in 1..=self.max_turns {
            let adapter = if turn % 2 == 1 {
                &self.first
            } else {
                &self.second
            };

            tracing::info!(
                turn,
                speaker = %adapter.position(),
                provider = %adapter.kind(),
                model = %adapter.model(),
                "Dispatching turn"
            );

            let request = TurnRequest {
                session_id: &self.session_id,
                turn,
                message: &current,
            };

            match adapter.process(request, &mut self.history).await {
                Ok(outcome) => {
                    current = outcome.text;
                }
                Err(err) => {
                    self.status = SessionStatus::Failed;
                    tracing::error!(turn, "Conversation failed: {}", err);
                    return Err(err);
                }
            }

            if turn < self.max_turns {
                tokio::time::sleep(self.turn_delay).await;
            }
        }

        self.status = SessionStatus::Completed;

        // Transcript assembly reads the persisted records back; a mismatch
        // means a turn was lost on disk and the transcript cannot be trusted.
        let records = self.turns.load_all(&self.session_id)?;
        if records.len() as u32 != self.max_turns {
            return Err(EngineError::Persistence(format!(
                "Expected {} persisted turn records, found {}",
                self.max_turns,
                records.len()
            )));
        }

        let finished_at = Utc::now();
        let stats = TranscriptStats::from_records(&records);

        tracing::info!(
            session_id = %self.session_id,
            turns = records.len(),
            total_tokens = stats.total_tokens,
            "Conversation completed"
        );

        Ok(ConversationTranscript {
            session_id: self.session_id.clone(),
            topic,
            status: SessionStatus::Completed,
            started_at,
            finished_at,
            duration_ms: started.elapsed().as_millis() as u64,
            participants: vec![
                ParticipantInfo {
                    position: SpeakerPosition::First,
                    provider: self.first.kind(),
                    model: self.first.model().to_string(),
                },
                ParticipantInfo {
                    position: SpeakerPosition::Second,
                    provider: self.second.kind(),
                    model: self.second.model().to_string(),
                },
            ],
            actual_turns: records.len() as u32,
            turns: records,
            stats,
        })
    }
}
