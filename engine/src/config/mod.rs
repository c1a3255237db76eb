//! Configuration management
//!
//! This module handles loading, validation, and management of the Duolog
//! configuration. Configuration is stored in TOML format at
//! ~/.duolog/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Data directory, log level
//! - **conversation**: Topic, turn budget, inter-message delay
//! - **participants**: Provider selection and optional model override per slot
//! - **providers**: Per-vendor credential/model/base-endpoint triples
//! - **viewer**: Optional transcript viewer upload
//!
//! # Path Expansion
//!
//! The configuration system automatically expands ~ to the user's home
//! directory and creates the data directory if it doesn't exist.
//!
//! # Examples
//!
//! ```no_run
//! use duolog_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load configuration from default location
//! let config = Config::load_or_create()?;
//!
//! println!("Data dir: {:?}", config.core.data_dir);
//! println!("Max turns: {}", config.conversation.max_turns);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::conversation::{MAX_TURNS, MIN_TURNS};
use crate::errors::EngineError;
use crate::llm::{ProviderKind, SpeakerPosition};
use crate::models;

/// Main configuration structure
///
/// This structure represents the complete Duolog configuration loaded from
/// ~/.duolog/config.toml.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Core engine settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Conversation settings
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Participant slot assignments
    #[serde(default)]
    pub participants: ParticipantsConfig,

    /// Per-vendor provider settings
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Transcript viewer upload settings
    #[serde(default)]
    pub viewer: ViewerConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

/// Conversation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Number of turns per session, in [2, 50]
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// Fixed wait between turns, in seconds
    #[serde(default = "default_turn_delay_secs")]
    pub turn_delay_secs: u64,

    /// Default topic; a random example topic is used when unset
    #[serde(default)]
    pub topic: Option<String>,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            turn_delay_secs: default_turn_delay_secs(),
            topic: None,
        }
    }
}

/// The two participant slot assignments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantsConfig {
    /// Slot that opens the conversation
    #[serde(default = "default_first_participant")]
    pub first: ParticipantConfig,

    /// Slot that replies second
    #[serde(default = "default_second_participant")]
    pub second: ParticipantConfig,
}

impl Default for ParticipantsConfig {
    fn default() -> Self {
        Self {
            first: default_first_participant(),
            second: default_second_participant(),
        }
    }
}

/// One participant slot: provider selection plus optional model override
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantConfig {
    /// Provider backing this slot (openai or anthropic)
    pub provider: ProviderKind,

    /// Model override; the provider section's model is used when unset
    #[serde(default)]
    pub model: Option<String>,
}

/// Per-vendor provider settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    /// OpenAI provider settings
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Anthropic provider settings
    #[serde(default)]
    pub anthropic: AnthropicConfig,
}

/// OpenAI provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Base URL for the OpenAI API
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_openai_model")]
    pub model: String,

    /// API key; falls back to the OPENAI_API_KEY environment variable
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            api_key: None,
        }
    }
}

impl OpenAiConfig {
    /// Resolve the API key from config or environment
    pub fn resolve_api_key(&self) -> Result<String, EngineError> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| {
                EngineError::Config(
                    "No OpenAI API key: set providers.openai.api_key or OPENAI_API_KEY".to_string(),
                )
            })
    }
}

/// Anthropic provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    /// Base URL for the Anthropic API
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_anthropic_model")]
    pub model: String,

    /// API key; falls back to the ANTHROPIC_API_KEY environment variable
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            base_url: default_anthropic_base_url(),
            model: default_anthropic_model(),
            api_key: None,
        }
    }
}

impl AnthropicConfig {
    /// Resolve the API key from config or environment
    pub fn resolve_api_key(&self) -> Result<String, EngineError> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
            .ok_or_else(|| {
                EngineError::Config(
                    "No Anthropic API key: set providers.anthropic.api_key or ANTHROPIC_API_KEY"
                        .to_string(),
                )
            })
    }
}

/// Transcript viewer upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerConfig {
    /// Enable uploading finished transcripts
    #[serde(default)]
    pub enabled: bool,

    /// Base URL of the viewer service
    #[serde(default = "default_viewer_base_url")]
    pub base_url: String,

    /// Optional bearer token for the viewer service
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_viewer_base_url(),
            api_key: None,
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.duolog")
}

fn default_max_turns() -> u32 {
    10
}

fn default_turn_delay_secs() -> u64 {
    2
}

fn default_first_participant() -> ParticipantConfig {
    ParticipantConfig {
        provider: ProviderKind::OpenAi,
        model: None,
    }
}

fn default_second_participant() -> ParticipantConfig {
    ParticipantConfig {
        provider: ProviderKind::Anthropic,
        model: None,
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com/v1".to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}

fn default_viewer_base_url() -> String {
    "https://viewer.duolog.dev/api".to_string()
}

impl Config {
    /// Load configuration from the default location (~/.duolog/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default
    /// configuration. Validates the configuration after loading and returns
    /// descriptive errors if validation fails.
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let mut config = Self::default();
        config.validate_and_process()?;

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.duolog/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".duolog").join("config.toml"))
    }

    /// The participant config for a conversation slot
    pub fn participant(&self, position: SpeakerPosition) -> &ParticipantConfig {
        match position {
            SpeakerPosition::First => &self.participants.first,
            SpeakerPosition::Second => &self.participants.second,
        }
    }

    /// The model a slot will actually use: its override if set, otherwise
    /// the provider section's model
    pub fn resolved_model(&self, position: SpeakerPosition) -> String {
        let participant = self.participant(position);
        match &participant.model {
            Some(model) => model.clone(),
            None => match participant.provider {
                ProviderKind::OpenAi => self.providers.openai.model.clone(),
                ProviderKind::Anthropic => self.providers.anthropic.model.clone(),
            },
        }
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates the log level
    /// - Validates the turn budget against [2, 50]
    /// - Checks model overrides against the provider allowlists
    /// - Expands ~ in the data directory and creates it
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        // Validate log level
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        // Validate turn budget
        if !(MIN_TURNS..=MAX_TURNS).contains(&self.conversation.max_turns) {
            return Err(EngineError::Config(format!(
                "max_turns must be between {} and {}, got {}",
                MIN_TURNS, MAX_TURNS, self.conversation.max_turns
            )));
        }

        // Check model overrides against the provider allowlists
        for position in [SpeakerPosition::First, SpeakerPosition::Second] {
            let participant = self.participant(position);
            if let Some(model) = &participant.model {
                if !models::is_supported(participant.provider, model) {
                    return Err(EngineError::Config(format!(
                        "Model '{}' is not in the supported set for provider '{}'",
                        model, participant.provider
                    )));
                }
            }
        }

        // Expand and create the data directory
        self.core.data_dir = expand_path(&self.core.data_dir)?;
        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
