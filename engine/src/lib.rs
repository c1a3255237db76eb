//! Duolog Engine Library
//!
//! This library provides the core functionality of the Duolog engine:
//! a turn-based dialogue between two LLM providers with durable per-turn
//! persistence. It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Error types shared across the engine
pub mod errors;

/// Retry with exponential backoff for outbound calls
pub mod retry;

/// LLM provider abstraction layer
pub mod llm;

/// Conversation history store and vendor projections
pub mod history;

/// Conversation orchestration, turn records, and transcripts
pub mod conversation;

/// Session persistence layout on disk
pub mod storage;

/// Per-session conversation log file
pub mod logging;

/// Static per-provider model registries
pub mod models;

/// Curated example conversation topics
pub mod topics;

/// Upload client for the remote transcript viewer
pub mod viewer;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
