//! Error types and handling
//!
//! This module provides the error types used throughout the Duolog engine.
//! Provider-level errors carry their own retryable/fatal classification (see
//! [`crate::llm::ProviderError`]); everything else is grouped by the subsystem
//! that produced it.

use thiserror::Error;

use crate::llm::ProviderError;

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration, rejected before any
///   conversation state machine starts
/// - **Provider**: Outbound LLM API failures, after retry handling
/// - **Persistence**: History, turn-record, or log writes that could not be
///   completed; fatal for the turn that triggered them
/// - **Upload**: Transcript viewer upload failures; never fatal for a session
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // LLM provider errors
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // Durable storage errors
    #[error("Persistence error: {0}")]
    Persistence(String),

    // Viewer upload errors
    #[error("Upload error: {0}")]
    Upload(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_conversion() {
        let err: EngineError = ProviderError::RateLimited.into();
        assert!(matches!(err, EngineError::Provider(_)));
        assert!(err.to_string().contains("Rate limit"));
    }

    #[test]
    fn test_config_error_display() {
        let err = EngineError::Config("max_turns out of range".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: max_turns out of range"
        );
    }
}
