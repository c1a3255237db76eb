//! CLI interface for Duolog
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags for running and inspecting
//! two-provider conversations.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Duolog Conversation Engine
///
/// Orchestrates a turn-based dialogue between two LLM providers, persists
/// every turn, and optionally uploads the finished transcript to a viewer
/// service.
#[derive(Parser, Debug)]
#[command(name = "duolog")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a conversation between the two configured participants
    Run {
        /// Conversation topic (a random example topic when omitted)
        topic: Option<String>,

        /// Number of turns, in [2, 50]
        #[arg(short, long)]
        turns: Option<u32>,

        /// Provider for the first slot (openai, anthropic)
        #[arg(long, value_name = "PROVIDER")]
        first_provider: Option<String>,

        /// Provider for the second slot (openai, anthropic)
        #[arg(long, value_name = "PROVIDER")]
        second_provider: Option<String>,

        /// Model override for the first slot
        #[arg(long, value_name = "MODEL")]
        first_model: Option<String>,

        /// Model override for the second slot
        #[arg(long, value_name = "MODEL")]
        second_model: Option<String>,

        /// Inter-message delay in seconds
        #[arg(long, value_name = "SECONDS")]
        delay: Option<u64>,

        /// Skip the viewer upload even if enabled in config
        #[arg(long)]
        no_upload: bool,
    },

    /// Print the example topic list
    Topics,

    /// Print the supported model registries per provider
    Models,

    /// Show recorded sessions, newest first
    History {
        /// Number of sessions to show (default: 10)
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Replay a stored session's turns
    Replay {
        /// Session ID to replay
        session_id: String,
    },
}
