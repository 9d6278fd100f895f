//! Provider kind enumeration and default model mapping.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Identifies which backend a provider talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// OpenAI-compatible chat completions.
    OpenAI,
    /// OpenRouter aggregator (OpenAI wire format plus routing headers).
    OpenRouter,
    /// Generic text-generation backend with a single prompt string.
    TextGen,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [Self::OpenAI, Self::OpenRouter, Self::TextGen];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::OpenRouter => "openrouter",
            Self::TextGen => "textgen",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    /// Matching is case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "openrouter" => Ok(Self::OpenRouter),
            "textgen" => Ok(Self::TextGen),
            _ => Err(ConfigError::UnknownProvider(s.to_string())),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the default model identifier for a given provider.
pub fn default_model_for(provider: ProviderKind) -> &'static str {
    match provider {
        ProviderKind::OpenAI => crate::constants::DEFAULT_OPENAI_MODEL,
        ProviderKind::OpenRouter => crate::constants::DEFAULT_OPENROUTER_MODEL,
        ProviderKind::TextGen => crate::constants::DEFAULT_TEXTGEN_MODEL,
    }
}
