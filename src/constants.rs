//! Centralized constants for fakeverifier-ai.
//!
//! All magic numbers, default strings, and configuration constants live here
//! so they can be changed in one place.

use std::num::NonZeroU32;
use std::time::Duration;

/// Application name used in CLI output and directory paths.
pub const APP_NAME: &str = "fakeverifier";

/// Application URL sent to aggregator backends as `HTTP-Referer`.
pub const APP_URL: &str = "https://fakeverifier.app";

/// Application title sent to aggregator backends as `X-Title`.
pub const APP_TITLE: &str = "FakeVerifier";

/// Configuration filename.
pub const CONFIG_FILENAME: &str = "config.toml";

/// Per-project configuration filename.
pub const PROJECT_CONFIG_FILENAME: &str = "fakeverifier.toml";

// --- Provider defaults ---

/// Provider order when none is configured.
pub const DEFAULT_PROVIDER_ORDER: &[&str] = &["openrouter", "openai", "textgen"];

/// Default model requested when neither the caller nor config names one.
pub const DEFAULT_MODEL: &str = "deepseek/deepseek-chat-v3-0324:free";

/// Default base URL for the OpenAI chat completions API.
pub const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model for the OpenAI backend.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Default base URL for the OpenRouter aggregator.
pub const OPENROUTER_DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Default model for the OpenRouter backend.
pub const DEFAULT_OPENROUTER_MODEL: &str = "deepseek/deepseek-chat-v3-0324:free";

/// Default base URL for the text-generation backend.
pub const TEXTGEN_DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Default model for the text-generation backend.
pub const DEFAULT_TEXTGEN_MODEL: &str = "llama3";

/// Environment variable selecting the primary provider.
pub const PROVIDER_ENV: &str = "AI_PROVIDER";

/// Environment variable overriding the default model.
pub const MODEL_ENV: &str = "AI_MODEL";

// --- Sampling defaults ---

/// Default sampling temperature for credibility analysis.
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

/// Default nucleus sampling probability.
pub const DEFAULT_TOP_P: f32 = 0.9;

/// Default maximum output tokens.
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

// --- HTTP ---

/// TCP connect timeout for provider calls. Overall deadlines come from the
/// caller's cancellation token.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// User agent sent with every provider request.
pub const USER_AGENT: &str = concat!("fakeverifier-ai/", env!("CARGO_PKG_VERSION"));

// --- Usage tracking ---

/// How long a rate-limited model stays ineligible.
pub const RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// How long a recently used model stays ineligible.
pub const RECENT_USE_COOLDOWN: Duration = Duration::from_secs(60);

// --- Client rate limiting ---

/// Requests allowed per client IP per minute.
pub const CLIENT_RATE_LIMIT: NonZeroU32 = match NonZeroU32::new(10) {
    Some(limit) => limit,
    None => panic!("client rate limit must be positive"),
};

// --- Orchestrator ---

/// Capacity of the channel between the fallback task and its consumer.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Generic message shown to end users when every candidate failed.
pub const USER_FAILURE_MESSAGE: &str = "Analysis failed, please try again.";

/// Default system prompt for credibility checks.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are FakeVerifier, an assistant that evaluates the credibility of news and online content. \
Assess claims carefully, cite the reasoning behind each verdict, and say when evidence is insufficient.";
