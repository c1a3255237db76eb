// Duolog Conversation Engine
// Main entry point for the duolog binary

use clap::Parser;
use duolog_engine::cli::{Cli, Command};
use duolog_engine::config::Config;
use duolog_engine::handlers::{
    handle_history, handle_models, handle_replay, handle_run, handle_topics, OutputFormat, RunArgs,
};
use duolog_engine::telemetry::{init_telemetry, init_telemetry_with_level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize basic telemetry first (before config is loaded)
    init_telemetry();

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::info!("Duolog Engine v{} ({} - {})", version, commit, timestamp);

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // Re-initialize telemetry with the CLI or config-driven log level
    // (only takes effect if RUST_LOG env var is not set)
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(log_level);

    // Handle commands
    match cli.command {
        Command::Run {
            topic,
            turns,
            first_provider,
            second_provider,
            first_model,
            second_model,
            delay,
            no_upload,
        } => {
            let args = RunArgs {
                topic,
                turns,
                first_provider,
                second_provider,
                first_model,
                second_model,
                delay,
                no_upload,
            };
            handle_run(args, &config, format).await
        }

        Command::Topics => handle_topics(format),

        Command::Models => handle_models(format),

        Command::History { limit } => {
            tracing::info!("Showing last {} sessions", limit);
            handle_history(limit, &config, format)
        }

        Command::Replay { session_id } => {
            tracing::info!("Replaying session: {}", session_id);
            handle_replay(session_id, &config, format)
        }
    }
}
