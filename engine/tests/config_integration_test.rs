//! Integration tests for configuration loading and validation

use duolog_engine::config::Config;
use duolog_engine::llm::{ProviderKind, SpeakerPosition};
use std::fs;

fn write_config(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_load_minimal_config_fills_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");
    let path = write_config(
        &dir,
        &format!(
            r#"
            [core]
            data_dir = "{}"
            "#,
            data_dir.display()
        ),
    );

    let config = Config::load_from_path(&path).unwrap();

    assert_eq!(config.core.log_level, "info");
    assert_eq!(config.conversation.max_turns, 10);
    assert_eq!(config.conversation.turn_delay_secs, 2);
    assert_eq!(config.participants.first.provider, ProviderKind::OpenAi);
    assert_eq!(config.participants.second.provider, ProviderKind::Anthropic);
    assert_eq!(config.providers.openai.model, "gpt-4o-mini");
    assert_eq!(
        config.providers.anthropic.model,
        "claude-3-5-sonnet-20241022"
    );
    assert!(!config.viewer.enabled);

    // Validation creates the data directory
    assert!(data_dir.exists());
}

#[test]
fn test_load_full_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        &format!(
            r#"
            [core]
            data_dir = "{}"
            log_level = "debug"

            [conversation]
            max_turns = 6
            turn_delay_secs = 0
            topic = "Discuss renewable energy"

            [participants.first]
            provider = "anthropic"
            model = "claude-3-5-haiku-20241022"

            [participants.second]
            provider = "openai"

            [providers.openai]
            model = "gpt-4o"
            api_key = "sk-test"

            [viewer]
            enabled = true
            base_url = "https://viewer.example/api"
            "#,
            dir.path().join("data").display()
        ),
    );

    let config = Config::load_from_path(&path).unwrap();

    assert_eq!(config.conversation.max_turns, 6);
    assert_eq!(
        config.conversation.topic.as_deref(),
        Some("Discuss renewable energy")
    );
    assert_eq!(config.participants.first.provider, ProviderKind::Anthropic);
    assert_eq!(
        config.resolved_model(SpeakerPosition::First),
        "claude-3-5-haiku-20241022"
    );
    // No override on the second slot: the provider section's model applies
    assert_eq!(config.resolved_model(SpeakerPosition::Second), "gpt-4o");
    assert_eq!(config.providers.openai.resolve_api_key().unwrap(), "sk-test");
    assert!(config.viewer.enabled);
    assert_eq!(config.viewer.base_url, "https://viewer.example/api");
}

#[test]
fn test_load_rejects_out_of_range_turns() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
        [conversation]
        max_turns = 51
        "#,
    );

    let err = Config::load_from_path(&path).unwrap_err();
    assert!(err.to_string().contains("max_turns"));
}

#[test]
fn test_load_rejects_unknown_provider() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
        [participants.first]
        provider = "gemini"
        "#,
    );

    assert!(Config::load_from_path(&path).is_err());
}

#[test]
fn test_load_rejects_model_outside_allowlist() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
        [participants.first]
        provider = "openai"
        model = "gpt-2"
        "#,
    );

    let err = Config::load_from_path(&path).unwrap_err();
    assert!(err.to_string().contains("gpt-2"));
}

#[test]
fn test_load_rejects_malformed_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "core = not valid toml [");

    assert!(Config::load_from_path(&path).is_err());
}

#[test]
fn test_load_missing_file_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("does-not-exist.toml");

    assert!(Config::load_from_path(&path).is_err());
}
