//! Static per-provider model registries
//!
//! Allowlists used by configuration validation when a per-participant model
//! override is given. The core treats the resolved model name as opaque once
//! validation has passed.

use crate::llm::ProviderKind;

/// Models accepted for the OpenAI slot
pub const OPENAI_MODELS: &[&str] = &[
    "gpt-4o",
    "gpt-4o-mini",
    "gpt-4-turbo",
    "gpt-4",
    "gpt-3.5-turbo",
];

/// Models accepted for the Anthropic slot
pub const ANTHROPIC_MODELS: &[&str] = &[
    "claude-3-5-sonnet-20241022",
    "claude-3-5-haiku-20241022",
    "claude-3-opus-20240229",
    "claude-3-sonnet-20240229",
    "claude-3-haiku-20240307",
];

/// The supported model set for a provider
pub fn supported_models(kind: ProviderKind) -> &'static [&'static str] {
    match kind {
        ProviderKind::OpenAi => OPENAI_MODELS,
        ProviderKind::Anthropic => ANTHROPIC_MODELS,
    }
}

/// Default model for a provider when no override is configured
pub fn default_model(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::OpenAi => "gpt-4o-mini",
        ProviderKind::Anthropic => "claude-3-5-sonnet-20241022",
    }
}

/// Whether a model name belongs to the provider's supported set
pub fn is_supported(kind: ProviderKind, model: &str) -> bool {
    supported_models(kind).contains(&model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_in_their_allowlists() {
        assert!(is_supported(
            ProviderKind::OpenAi,
            default_model(ProviderKind::OpenAi)
        ));
        assert!(is_supported(
            ProviderKind::Anthropic,
            default_model(ProviderKind::Anthropic)
        ));
    }

    #[test]
    fn test_unknown_model_rejected() {
        assert!(!is_supported(ProviderKind::OpenAi, "gpt-99"));
        assert!(!is_supported(
            ProviderKind::Anthropic,
            "claude-imaginary"
        ));
        // Models never cross providers
        assert!(!is_supported(ProviderKind::OpenAi, "claude-3-opus-20240229"));
    }
}
