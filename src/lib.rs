//! AI completion layer for FakeVerifier.
//!
//! Resolves which providers and models may serve a request, streams the
//! completion from the first candidate that works, and falls back through
//! the rest on failure. Model usage is tracked per tier so selection can
//! steer away from recently used or rate-limited models.

pub mod config;
pub mod constants;
pub mod error;
pub mod fallback;
pub mod message;
pub mod output;
pub mod provider;
pub mod rate_limit;
pub mod selection;

pub use error::{CallErrorKind, ConfigError, FallbackError, ProviderCallError};
pub use fallback::{collect_text, EventStream, FallbackRouter, StreamEvent};
pub use provider::{ChatBackend, CompletionRequest, Provider, ProviderKind, SamplingParams};
