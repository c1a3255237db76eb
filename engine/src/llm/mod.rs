//! LLM Provider Abstraction Layer
//!
//! This module provides a common interface for the two LLM providers that can
//! occupy a conversation slot (OpenAI-style and Anthropic-style APIs). The
//! ProviderAdapter trait defines the contract both adapters implement,
//! enabling the orchestrator to drive either vendor transparently.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::conversation::TurnRecord;
use crate::errors::EngineError;
use crate::history::HistoryStore;

pub mod anthropic;
pub mod openai;

/// The two supported provider backends
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-style chat completions API
    OpenAi,

    /// Anthropic-style messages API
    Anthropic,
}

impl ProviderKind {
    /// Stable lowercase name used in config, storage, and display
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" => Ok(ProviderKind::Anthropic),
            other => Err(EngineError::Config(format!(
                "Invalid provider '{}'. Must be one of: openai, anthropic",
                other
            ))),
        }
    }
}

/// One of the two fixed conversation slots
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SpeakerPosition {
    /// Opens the conversation and takes every odd turn
    First,

    /// Takes every even turn
    Second,
}

impl SpeakerPosition {
    /// The opposite conversation slot
    pub fn other(&self) -> Self {
        match self {
            SpeakerPosition::First => SpeakerPosition::Second,
            SpeakerPosition::Second => SpeakerPosition::First,
        }
    }
}

impl fmt::Display for SpeakerPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeakerPosition::First => write!(f, "first"),
            SpeakerPosition::Second => write!(f, "second"),
        }
    }
}

/// Errors that can occur while talking to a provider
///
/// `is_retryable` is the single source of truth for the retry loop: rate
/// limiting and server-side failures are worth retrying, everything else is
/// fatal for the turn.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Rate limit exceeded (HTTP 429)")]
    RateLimited,

    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Authentication failed (HTTP {status}): {message}")]
    AuthenticationFailed { status: u16, message: String },

    #[error("Invalid request (HTTP {status}): {message}")]
    InvalidRequest { status: u16, message: String },

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl ProviderError {
    /// Classify a non-2xx HTTP status into an error variant
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            429 => ProviderError::RateLimited,
            500 | 502 | 503 | 504 => ProviderError::ServerError { status, message },
            401 | 403 => ProviderError::AuthenticationFailed { status, message },
            _ => ProviderError::InvalidRequest { status, message },
        }
    }

    /// True exactly for the transient class (429 and 5xx server failures)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited | ProviderError::ServerError { .. }
        )
    }
}

/// One outbound turn to dispatch through an adapter
#[derive(Debug, Clone, Copy)]
pub struct TurnRequest<'a> {
    /// Session the turn belongs to
    pub session_id: &'a str,

    /// 1-based turn index within the session
    pub turn: u32,

    /// Text the adapter sends to the provider
    pub message: &'a str,
}

/// Result of one successful turn
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The provider's response text
    pub text: String,

    /// Fully populated, already-persisted record of the turn
    pub record: TurnRecord,
}

/// Provider adapter trait both vendor implementations must satisfy
///
/// A successful `process` call appends the outbound message and the received
/// reply to the history store, writes the turn record to durable storage, and
/// returns the normalized outcome. Errors are never swallowed.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Which vendor backend this adapter talks to
    fn kind(&self) -> ProviderKind;

    /// The resolved model name used for this participant
    fn model(&self) -> &str;

    /// The conversation slot this adapter occupies
    fn position(&self) -> SpeakerPosition;

    /// Execute one turn: render history, call the provider (with retry),
    /// record the reply, and persist the turn record.
    async fn process(
        &self,
        request: TurnRequest<'_>,
        history: &mut HistoryStore,
    ) -> Result<TurnOutcome, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_roundtrip() {
        assert_eq!("openai".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!(
            "anthropic".parse::<ProviderKind>().unwrap(),
            ProviderKind::Anthropic
        );
        assert!("gemini".parse::<ProviderKind>().is_err());

        let json = serde_json::to_string(&ProviderKind::OpenAi).unwrap();
        assert_eq!(json, "\"openai\"");
    }

    #[test]
    fn test_speaker_position_alternation() {
        assert_eq!(SpeakerPosition::First.other(), SpeakerPosition::Second);
        assert_eq!(SpeakerPosition::Second.other(), SpeakerPosition::First);
        assert_eq!(SpeakerPosition::First.to_string(), "first");
        assert_eq!(SpeakerPosition::Second.to_string(), "second");
    }

    #[test]
    fn test_error_classification_from_status() {
        assert!(ProviderError::from_status(429, String::new()).is_retryable());
        assert!(ProviderError::from_status(500, String::new()).is_retryable());
        assert!(ProviderError::from_status(502, String::new()).is_retryable());
        assert!(ProviderError::from_status(503, String::new()).is_retryable());
        assert!(ProviderError::from_status(504, String::new()).is_retryable());

        assert!(!ProviderError::from_status(400, String::new()).is_retryable());
        assert!(!ProviderError::from_status(401, String::new()).is_retryable());
        assert!(!ProviderError::from_status(403, String::new()).is_retryable());
        assert!(!ProviderError::from_status(404, String::new()).is_retryable());
    }

    #[test]
    fn test_payload_error_is_fatal() {
        assert!(!ProviderError::Api("model overloaded".to_string()).is_retryable());
        assert!(!ProviderError::Parse("bad json".to_string()).is_retryable());
    }
}
