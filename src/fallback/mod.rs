//! Streaming completion with ordered provider and model fallback.
//!
//! [`FallbackRouter`] walks its providers in configured order and, within
//! each, the requested model followed by that provider's fallback models.
//! Chunks from the running attempt are forwarded as they arrive; the first
//! attempt that streams to completion ends the request. A failed attempt is
//! logged and the next candidate tried; only the last failure reaches the
//! caller, wrapped in [`FallbackError::AllProvidersFailed`].

use futures::stream::{BoxStream, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::constants::EVENT_CHANNEL_CAPACITY;
use crate::error::{CallErrorKind, ConfigError, FallbackError, ProviderCallError};
use crate::provider::{ChatBackend, CompletionRequest, Provider};
use crate::selection::{Tier, UsageTracker};

/// One item of a routed completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Next text fragment of the current attempt.
    Chunk(String),
    /// The attempt that produced the chunks since the last restart failed
    /// mid-stream; discard them. Output from the next candidate follows.
    Restart { provider: String, model: String },
}

/// Events of one routed completion. Ends after success, or with one error.
pub type EventStream = BoxStream<'static, Result<StreamEvent, FallbackError>>;

type EventSender = mpsc::Sender<Result<StreamEvent, FallbackError>>;

/// Routes completions across providers, falling back on failure.
///
/// Holds only providers that had credentials at construction time.
#[derive(Clone)]
pub struct FallbackRouter {
    backends: Vec<Arc<dyn ChatBackend>>,
    usage: Option<(Arc<UsageTracker>, Tier)>,
}

impl std::fmt::Debug for FallbackRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackRouter")
            .field("backends", &self.backend_names())
            .field("usage_tier", &self.usage.as_ref().map(|(_, tier)| *tier))
            .finish()
    }
}

impl FallbackRouter {
    /// Creates a router over `backends`, tried in the given order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoProviderConfigured`] when `backends` is empty.
    pub fn new(backends: Vec<Arc<dyn ChatBackend>>) -> Result<Self, ConfigError> {
        if backends.is_empty() {
            return Err(ConfigError::NoProviderConfigured);
        }
        Ok(Self {
            backends,
            usage: None,
        })
    }

    /// Creates a router over every provider with credentials in `config`.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let backends = Provider::all_from_config(config)?
            .into_iter()
            .map(|p| Arc::new(p) as Arc<dyn ChatBackend>)
            .collect();
        Self::new(backends)
    }

    /// Records every attempt in `tracker` under `tier`.
    ///
    /// HTTP 429 marks the model rate limited; any other outcome, success or
    /// failure, marks it used. Cancelled attempts are not recorded. The
    /// router itself never skips candidates based on the tracker.
    pub fn with_usage_tracker(mut self, tracker: Arc<UsageTracker>, tier: Tier) -> Self {
        self.usage = Some((tracker, tier));
        self
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// The `(provider index, model)` pairs a request for `requested` would try, in order.
    ///
    /// Each pair appears once even when the requested model is also listed
    /// among a provider's fallbacks. Empty model names are skipped.
    pub fn plan(&self, requested: &str) -> Vec<(usize, String)> {
        let mut seen = HashSet::new();
        let mut plan = Vec::new();
        for (idx, backend) in self.backends.iter().enumerate() {
            let candidates = std::iter::once(requested)
                .chain(backend.fallback_models().iter().map(String::as_str));
            for model in candidates {
                if model.trim().is_empty() {
                    continue;
                }
                if seen.insert((idx, model.to_string())) {
                    plan.push((idx, model.to_string()));
                }
            }
        }
        plan
    }

    /// Streams a completion, falling back across candidates on failure.
    ///
    /// Returns immediately; a spawned task drives the attempts. Must be
    /// called from within a tokio runtime. Dropping the stream aborts the
    /// in-flight attempt, even one stalled on the network.
    pub fn stream_completion(&self, request: CompletionRequest) -> EventStream {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let router = self.clone();
        let span = info_span!(
            "completion",
            request_id = %Uuid::new_v4(),
            requested = %request.model,
        );
        tokio::spawn(async move { router.drive(request, tx).await }.instrument(span));
        ReceiverStream::new(rx).boxed()
    }

    /// Runs a completion to the end and returns the final text.
    pub async fn complete(&self, request: CompletionRequest) -> Result<String, FallbackError> {
        collect_text(self.stream_completion(request)).await
    }

    async fn drive(&self, request: CompletionRequest, tx: EventSender) {
        let plan = self.plan(&request.model);
        if plan.is_empty() {
            let _ = tx.send(Err(FallbackError::NoCandidates)).await;
            return;
        }

        let total = plan.len();
        let mut attempts = 0;
        let mut last_error = None;

        for (idx, model) in plan {
            if tx.is_closed() {
                debug!(attempts, "Consumer dropped the stream");
                return;
            }
            if request.cancel.is_cancelled() {
                info!(attempts, "Request cancelled");
                let _ = tx.send(Err(FallbackError::Cancelled)).await;
                return;
            }

            let backend = &self.backends[idx];
            let provider = backend.name().to_string();
            attempts += 1;
            info!(%provider, %model, attempt = attempts, of = total, "Attempting completion");

            match attempt(backend.as_ref(), &request, &model, &tx).await {
                Outcome::Completed { chunks } => {
                    info!(%provider, %model, chunks, "Completion succeeded");
                    if let Some((tracker, tier)) = &self.usage {
                        tracker.mark_used(*tier, &model);
                    }
                    return;
                }
                Outcome::ReceiverGone => {
                    debug!(%provider, %model, "Consumer dropped the stream");
                    return;
                }
                Outcome::Failed { error, forwarded } => {
                    if error.is_cancelled() || request.cancel.is_cancelled() {
                        info!(%provider, %model, "Request cancelled");
                        let _ = tx.send(Err(FallbackError::Cancelled)).await;
                        return;
                    }

                    warn!(%provider, %model, forwarded, error = %error, "Candidate failed");
                    if let Some((tracker, tier)) = &self.usage {
                        if error.is_rate_limited() {
                            tracker.mark_rate_limited(*tier, &model);
                        } else {
                            tracker.mark_used(*tier, &model);
                        }
                    }
                    if forwarded > 0 {
                        let restart = StreamEvent::Restart {
                            provider: provider.clone(),
                            model: model.clone(),
                        };
                        if tx.send(Ok(restart)).await.is_err() {
                            return;
                        }
                    }
                    last_error = Some(error);
                }
            }
        }

        if let Some(last) = last_error {
            error!(attempts, last = %last, "All provider attempts failed");
            let _ = tx
                .send(Err(FallbackError::AllProvidersFailed { attempts, last }))
                .await;
        }
    }
}

enum Outcome {
    Completed { chunks: usize },
    Failed { error: ProviderCallError, forwarded: usize },
    ReceiverGone,
}

/// Runs one `(provider, model)` attempt, forwarding its chunks.
async fn attempt(
    backend: &dyn ChatBackend,
    request: &CompletionRequest,
    model: &str,
    tx: &EventSender,
) -> Outcome {
    let cancel = &request.cancel;
    let cancelled = || ProviderCallError::new(backend.name(), model, CallErrorKind::Cancelled);

    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(cancelled()),
        _ = tx.closed() => return Outcome::ReceiverGone,
        opened = backend.stream_completion(&request.messages, model, &request.sampling, cancel) => {
            opened
        }
    };
    let mut stream = match opened {
        Ok(stream) => stream,
        Err(error) => return Outcome::Failed { error, forwarded: 0 },
    };

    let mut forwarded = 0;
    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => Some(Err(cancelled())),
            _ = tx.closed() => return Outcome::ReceiverGone,
            item = stream.next() => item,
        };
        match item {
            Some(Ok(text)) if text.is_empty() => continue,
            Some(Ok(text)) => {
                if tx.send(Ok(StreamEvent::Chunk(text))).await.is_err() {
                    return Outcome::ReceiverGone;
                }
                forwarded += 1;
            }
            Some(Err(error)) => return Outcome::Failed { error, forwarded },
            None => break,
        }
    }

    if forwarded == 0 {
        let error = ProviderCallError::new(backend.name(), model, CallErrorKind::EmptyResponse);
        return Outcome::Failed { error, forwarded };
    }
    Outcome::Completed { chunks: forwarded }
}

/// Folds an event stream into the final text.
///
/// Text before a [`StreamEvent::Restart`] is discarded.
pub async fn collect_text(mut events: EventStream) -> Result<String, FallbackError> {
    let mut text = String::new();
    while let Some(event) = events.next().await {
        match event? {
            StreamEvent::Chunk(chunk) => text.push_str(&chunk),
            StreamEvent::Restart { .. } => text.clear(),
        }
    }
    Ok(text)
}

#[cfg(test)]
mod tests;
