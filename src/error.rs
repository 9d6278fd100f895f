//! Error types for provider resolution, provider calls, and fallback routing.

use std::time::Duration;

use thiserror::Error;

/// Configuration and resolution failures.
///
/// These surface at construction time, before any network call is made.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error(
        "no AI provider configured: set OPENROUTER_API_KEY, OPENAI_API_KEY, \
         TEXTGEN_API_KEY or TEXTGEN_BASE_URL"
    )]
    NoProviderConfigured,

    #[error("unknown provider: {0}. Supported: openai, openrouter, textgen")]
    UnknownProvider(String),

    #[error("unknown tier: {0}. Supported: free, paid")]
    UnknownTier(String),

    #[error("unknown use case: {0}. Supported: default, search, analysis")]
    UnknownUseCase(String),

    #[error("no models declared for {tier}/{use_case}")]
    EmptyCandidates { tier: String, use_case: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// What went wrong during a single provider call.
#[derive(Error, Debug)]
pub enum CallErrorKind {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status {
        status: u16,
        body: String,
        retry_after: Option<Duration>,
    },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("conversation is empty")]
    EmptyConversation,

    #[error("model identifier is empty")]
    EmptyModel,

    #[error("completion finished without any output")]
    EmptyResponse,

    #[error("cancelled")]
    Cancelled,
}

/// A single `(provider, model)` attempt failed.
#[derive(Error, Debug)]
#[error("{provider}/{model}: {kind}")]
pub struct ProviderCallError {
    pub provider: String,
    pub model: String,
    #[source]
    pub kind: CallErrorKind,
}

impl ProviderCallError {
    pub fn new(provider: impl Into<String>, model: impl Into<String>, kind: CallErrorKind) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            kind,
        }
    }

    /// True when the backend answered `429 Too Many Requests`.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self.kind, CallErrorKind::Status { status: 429, .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, CallErrorKind::Cancelled)
    }

    /// The server-provided `Retry-After`, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self.kind {
            CallErrorKind::Status { retry_after, .. } => retry_after,
            _ => None,
        }
    }
}

/// Terminal failures of a fallback-routed request.
#[derive(Error, Debug)]
pub enum FallbackError {
    /// Every candidate failed; wraps the last failure only.
    #[error("all {attempts} provider attempts failed, last: {last}")]
    AllProvidersFailed {
        attempts: usize,
        #[source]
        last: ProviderCallError,
    },

    /// No candidate could be attempted for this request.
    #[error("no candidate models to attempt")]
    NoCandidates,

    /// The caller cancelled the request.
    #[error("request cancelled")]
    Cancelled,
}

impl FallbackError {
    /// Message safe to show end users. Provider details stay in the logs.
    pub fn user_message(&self) -> &'static str {
        match self {
            FallbackError::Cancelled => "Request cancelled.",
            _ => crate::constants::USER_FAILURE_MESSAGE,
        }
    }

    /// The wrapped last provider failure, if any.
    pub fn last_error(&self) -> Option<&ProviderCallError> {
        match self {
            FallbackError::AllProvidersFailed { last, .. } => Some(last),
            _ => None,
        }
    }
}
