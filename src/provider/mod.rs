//! LLM provider abstraction.
//!
//! Every backend implements [`ChatBackend`]: stream the completion of a
//! conversation as ordered text chunks. [`Provider`] is the concrete
//! implementation, dispatching over OpenAI-compatible, OpenRouter and
//! text-generation clients via [`ProviderKind`].

mod chat;
mod client;
mod kind;
mod sse;
mod textgen;

pub use client::Provider;
pub use kind::{default_model_for, ProviderKind};

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderCallError;
use crate::message::Message;

/// Ordered, finite stream of text fragments from one provider call.
///
/// Ends after the backend signals completion or right after the first error.
pub type ChunkStream = BoxStream<'static, Result<String, ProviderCallError>>;

/// Sampling parameters forwarded to the backend. `None` leaves the backend default.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SamplingParams {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// One completion request, as handed to the fallback router.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    /// Model tried first on every provider.
    pub model: String,
    pub sampling: SamplingParams,
    /// Cancelling aborts the in-flight call and ends the request.
    pub cancel: CancellationToken,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Message>, model: impl Into<String>) -> Self {
        Self {
            messages,
            model: model.into(),
            sampling: SamplingParams::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// A backend able to stream completions.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Name used in logs and errors (e.g. "openrouter").
    fn name(&self) -> &str;

    /// Models tried, in order, after the requested model fails.
    fn fallback_models(&self) -> &[String];

    /// Starts a streaming completion of `messages` with `model`.
    ///
    /// Errors opening the call are returned directly; errors after that
    /// arrive as the stream's last item.
    async fn stream_completion(
        &self,
        messages: &[Message],
        model: &str,
        sampling: &SamplingParams,
        cancel: &CancellationToken,
    ) -> Result<ChunkStream, ProviderCallError>;
}
