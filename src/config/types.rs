//! Struct definitions and serde defaults for configuration.

use serde::{Deserialize, Serialize};

/// Root configuration, deserialized from `config.toml`.
///
/// Fields use serde defaults so the tool runs with sensible defaults
/// when no config file exists.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Default model requested when the caller does not name one.
    #[serde(default = "default_model")]
    pub model: String,
    /// Provider moved to the front of `providers` (e.g. "openai").
    #[serde(default)]
    pub default_provider: Option<String>,
    /// Order in which configured providers are tried.
    #[serde(default = "default_provider_order")]
    pub providers: Vec<String>,
    /// Per-provider settings.
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Ranked model lists per tier and use case. Missing entries use built-in tables.
    #[serde(default)]
    pub models: ModelTables,
    /// Default sampling parameters.
    #[serde(default)]
    pub sampling: SamplingConfig,
    /// Optional system prompt prepended to every conversation.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: Option<String>,
}

pub(super) fn default_model() -> String {
    crate::constants::DEFAULT_MODEL.to_string()
}

pub(super) fn default_provider_order() -> Vec<String> {
    crate::constants::DEFAULT_PROVIDER_ORDER
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_system_prompt() -> Option<String> {
    Some(crate::constants::DEFAULT_SYSTEM_PROMPT.to_string())
}

/// Provider-specific configuration map.
///
/// Only providers the user has configured will be `Some`.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ProviderConfig {
    /// OpenAI-compatible chat completions.
    pub openai: Option<ProviderEntry>,
    /// OpenRouter aggregator.
    pub openrouter: Option<ProviderEntry>,
    /// Generic text-generation backend.
    pub textgen: Option<ProviderEntry>,
}

/// Connection details for a single provider.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ProviderEntry {
    /// API key for authentication. Can also be set via environment variables.
    pub api_key: Option<String>,
    /// Custom base URL (useful for proxies or self-hosted instances).
    pub base_url: Option<String>,
    /// Model used by this provider when none is requested.
    pub model: Option<String>,
    /// Models tried in order after the requested one fails.
    #[serde(default)]
    pub fallback_models: Vec<String>,
}

/// Ranked model lists for both tiers.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ModelTables {
    pub free: Option<UseCaseModels>,
    pub paid: Option<UseCaseModels>,
}

/// Ranked model lists per use case. `None` keeps the built-in list.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct UseCaseModels {
    pub default: Option<Vec<String>>,
    pub search: Option<Vec<String>>,
    pub analysis: Option<Vec<String>>,
}

/// Default sampling parameters applied when a request leaves them unset.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SamplingConfig {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: default_model(),
            default_provider: None,
            providers: default_provider_order(),
            provider: ProviderConfig::default(),
            models: ModelTables::default(),
            sampling: SamplingConfig::default(),
            system_prompt: default_system_prompt(),
        }
    }
}
