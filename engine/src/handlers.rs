//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - run: Execute a full two-provider conversation
//! - topics: Print the example topic list
//! - models: Print the supported model registries
//! - history: Show recorded sessions
//! - replay: Print a stored session's turns

use anyhow::{bail, Context, Result};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::conversation::{validate_turn_budget, ConversationOrchestrator, TurnStore};
use crate::history::HistoryStore;
use crate::llm::{
    anthropic::AnthropicAdapter, openai::OpenAiAdapter, ProviderAdapter, ProviderKind,
    SpeakerPosition,
};
use crate::logging::SessionLogger;
use crate::models;
use crate::retry::RetryPolicy;
use crate::storage::SessionStorage;
use crate::topics;
use crate::viewer::ViewerClient;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// CLI overrides for the `run` command
#[derive(Debug, Default)]
pub struct RunArgs {
    pub topic: Option<String>,
    pub turns: Option<u32>,
    pub first_provider: Option<String>,
    pub second_provider: Option<String>,
    pub first_model: Option<String>,
    pub second_model: Option<String>,
    pub delay: Option<u64>,
    pub no_upload: bool,
}

/// Resolve one slot's provider and model from config plus CLI overrides
fn resolve_slot(
    config: &Config,
    position: SpeakerPosition,
    provider_override: &Option<String>,
    model_override: &Option<String>,
) -> Result<(ProviderKind, String)> {
    let participant = config.participant(position);

    let provider = match provider_override {
        Some(value) => value.parse::<ProviderKind>()?,
        None => participant.provider,
    };

    let model = if let Some(model) = model_override {
        if !models::is_supported(provider, model) {
            bail!(
                "Model '{}' is not in the supported set for provider '{}'",
                model,
                provider
            );
        }
        model.clone()
    } else if provider == participant.provider && participant.model.is_some() {
        participant.model.clone().unwrap_or_default()
    } else {
        match provider {
            ProviderKind::OpenAi => config.providers.openai.model.clone(),
            ProviderKind::Anthropic => config.providers.anthropic.model.clone(),
        }
    };

    Ok((provider, model))
}

/// Build the adapter backing one conversation slot
fn build_adapter(
    provider: ProviderKind,
    model: String,
    position: SpeakerPosition,
    config: &Config,
    turns: Arc<dyn TurnStore>,
    log: Arc<SessionLogger>,
) -> Result<Arc<dyn ProviderAdapter>> {
    let adapter: Arc<dyn ProviderAdapter> = match provider {
        ProviderKind::OpenAi => {
            let api_key = config.providers.openai.resolve_api_key()?;
            Arc::new(OpenAiAdapter::new(
                config.providers.openai.base_url.clone(),
                api_key,
                model,
                position,
                RetryPolicy::default(),
                turns,
                log,
            ))
        }
        ProviderKind::Anthropic => {
            let api_key = config.providers.anthropic.resolve_api_key()?;
            Arc::new(AnthropicAdapter::new(
                config.providers.anthropic.base_url.clone(),
                api_key,
                model,
                position,
                RetryPolicy::default(),
                turns,
                log,
            ))
        }
    };
    Ok(adapter)
}

/// Run a full conversation session
pub async fn handle_run(args: RunArgs, config: &Config, format: OutputFormat) -> Result<()> {
    // Resolve everything the session needs before touching the filesystem:
    // an invalid configuration must leave no files behind.
    let (first_provider, first_model) = resolve_slot(
        config,
        SpeakerPosition::First,
        &args.first_provider,
        &args.first_model,
    )?;
    let (second_provider, second_model) = resolve_slot(
        config,
        SpeakerPosition::Second,
        &args.second_provider,
        &args.second_model,
    )?;

    let max_turns = args.turns.unwrap_or(config.conversation.max_turns);
    validate_turn_budget(max_turns).context("Invalid turn budget")?;

    let turn_delay = Duration::from_secs(args.delay.unwrap_or(config.conversation.turn_delay_secs));

    let topic = args
        .topic
        .or_else(|| config.conversation.topic.clone())
        .unwrap_or_else(|| topics::random_topic().to_string());

    let session_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(session_id = %session_id, topic = %topic, "Preparing session");

    let storage = SessionStorage::new(&config.core.data_dir);
    let log = Arc::new(
        SessionLogger::create(storage.log_path(&session_id))
            .context("Failed to create session log")?,
    );
    log.info(&format!("session {} topic: {}", session_id, topic));

    let turns: Arc<dyn TurnStore> = Arc::new(storage.turn_store());
    let history = HistoryStore::open(
        &session_id,
        &topic,
        Box::new(storage.history_backend()),
    )
    .context("Failed to open session history")?;

    let first = build_adapter(
        first_provider,
        first_model,
        SpeakerPosition::First,
        config,
        Arc::clone(&turns),
        Arc::clone(&log),
    )?;
    let second = build_adapter(
        second_provider,
        second_model,
        SpeakerPosition::Second,
        config,
        Arc::clone(&turns),
        Arc::clone(&log),
    )?;

    let mut orchestrator = ConversationOrchestrator::new(
        session_id.clone(),
        first,
        second,
        history,
        turns,
        max_turns,
        turn_delay,
    )?;

    let transcript = match orchestrator.run().await {
        Ok(transcript) => transcript,
        Err(err) => {
            log.error(&format!("session failed: {}", err));
            return Err(err).context("Conversation failed");
        }
    };

    let transcript_path = storage
        .write_transcript(&transcript)
        .context("Failed to write transcript")?;
    log.info(&format!("transcript written to {}", transcript_path.display()));

    // Upload is best-effort: a viewer failure never fails the session
    let mut viewer_url = None;
    if config.viewer.enabled && !args.no_upload {
        let client = ViewerClient::new(
            config.viewer.base_url.clone(),
            config.viewer.api_key.clone(),
        );
        match client.upload(&transcript).await {
            Ok(receipt) => {
                if let Some(url) = &receipt.viewer_url {
                    tracing::info!(url = %url, "Transcript uploaded");
                    log.info(&format!("transcript uploaded: {}", url));
                }
                viewer_url = receipt.viewer_url;
            }
            Err(err) => {
                tracing::warn!("Transcript upload failed: {}", err);
                log.error(&format!("transcript upload failed: {}", err));
            }
        }
    }

    match format {
        OutputFormat::Text => {
            println!("Session {} completed.", transcript.session_id);
            println!("  Topic:        {}", transcript.topic);
            println!("  Turns:        {}", transcript.actual_turns);
            println!("  Total tokens: {}", transcript.stats.total_tokens);
            for (provider, tokens) in &transcript.stats.tokens_by_provider {
                println!("    {}: {}", provider, tokens);
            }
            println!(
                "  Avg response: {:.0} ms",
                transcript.stats.average_response_ms
            );
            println!("  Transcript:   {}", transcript_path.display());
            if let Some(url) = &viewer_url {
                println!("  Viewer:       {}", url);
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "session_id": transcript.session_id,
                "status": transcript.status,
                "topic": transcript.topic,
                "actual_turns": transcript.actual_turns,
                "stats": transcript.stats,
                "transcript_path": transcript_path,
                "viewer_url": viewer_url,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Print the example topic list
pub fn handle_topics(format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("Example topics:");
            for topic in topics::EXAMPLE_TOPICS {
                println!("  - {}", topic);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&topics::EXAMPLE_TOPICS)?);
        }
    }
    Ok(())
}

/// Print the supported model registries per provider
pub fn handle_models(format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for kind in [ProviderKind::OpenAi, ProviderKind::Anthropic] {
                println!("{} (default: {}):", kind, models::default_model(kind));
                for model in models::supported_models(kind) {
                    println!("  - {}", model);
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "openai": models::OPENAI_MODELS,
                "anthropic": models::ANTHROPIC_MODELS,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Show recorded sessions, newest first
pub fn handle_history(limit: usize, config: &Config, format: OutputFormat) -> Result<()> {
    let storage = SessionStorage::new(&config.core.data_dir);
    let mut sessions = storage.list_sessions().context("Failed to list sessions")?;
    sessions.truncate(limit);

    match format {
        OutputFormat::Text => {
            if sessions.is_empty() {
                println!("No recorded sessions.");
                return Ok(());
            }
            for session in &sessions {
                let status = session
                    .status
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "incomplete".to_string());
                let started = session
                    .started_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}  [{}] {} turn(s)  {}  {}",
                    session.session_id, status, session.turns, started, session.topic
                );
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&sessions)?);
        }
    }
    Ok(())
}

/// Print a stored session's turns from the per-turn records
pub fn handle_replay(session_id: String, config: &Config, format: OutputFormat) -> Result<()> {
    let storage = SessionStorage::new(&config.core.data_dir);
    let records = storage
        .load_turns(&session_id)
        .context("Failed to load turn records")?;

    if records.is_empty() {
        bail!("No turns recorded for session '{}'", session_id);
    }

    match format {
        OutputFormat::Text => {
            for record in &records {
                println!(
                    "--- turn {} [{} / {} / {}] {} ms, {} tokens ---",
                    record.turn,
                    record.speaker,
                    record.provider,
                    record.model,
                    record.elapsed_ms,
                    record.usage.total
                );
                println!("{}", record.output);
                println!();
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
    }
    Ok(())
}
