//! OpenAI-compatible chat completions client.
//!
//! Serves both the OpenAI backend and the OpenRouter aggregator; the latter
//! only adds routing headers identifying the calling application.

use reqwest::header::RETRY_AFTER;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::sse::chunk_stream;
use super::{ChunkStream, SamplingParams};
use crate::error::{CallErrorKind, ProviderCallError};
use crate::message::Message;

/// Longest error body kept in a [`CallErrorKind::Status`].
const MAX_ERROR_BODY: usize = 512;

/// Streaming chat completions over HTTP + SSE.
#[derive(Debug, Clone)]
pub(crate) struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    extra_headers: Vec<(&'static str, String)>,
}

impl ChatClient {
    pub(crate) fn new(http: reqwest::Client, base_url: &str, api_key: String) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            extra_headers: Vec::new(),
        }
    }

    /// Adds a header sent with every request.
    pub(crate) fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.extra_headers.push((name, value.into()));
        self
    }

    pub(crate) fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Opens a streaming completion and returns its chunks.
    pub(crate) async fn stream(
        &self,
        provider: &str,
        messages: &[Message],
        model: &str,
        sampling: &SamplingParams,
        cancel: &CancellationToken,
    ) -> Result<ChunkStream, ProviderCallError> {
        let fail = |kind| ProviderCallError::new(provider, model, kind);
        let body = build_body(messages, model, sampling);

        let mut request = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body);
        for (name, value) in &self.extra_headers {
            request = request.header(*name, value);
        }

        let started = Instant::now();
        debug!(provider, model, messages = messages.len(), "Sending chat completion request");
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(fail(CallErrorKind::Cancelled)),
            res = request.send() => res.map_err(|e| fail(CallErrorKind::Network(e)))?,
        };

        let status = response.status();
        info!(
            provider,
            model,
            status = status.as_u16(),
            elapsed = ?started.elapsed(),
            "Provider responded"
        );

        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let text = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(fail(CallErrorKind::Cancelled)),
                text = response.text() => text.unwrap_or_default(),
            };
            warn!(provider, model, status = status.as_u16(), "Provider returned error status");
            return Err(fail(CallErrorKind::Status {
                status: status.as_u16(),
                body: truncate(&text, MAX_ERROR_BODY),
                retry_after,
            }));
        }

        Ok(chunk_stream(
            response,
            cancel.clone(),
            provider.to_string(),
            model.to_string(),
        ))
    }
}

/// Builds the JSON body for a streaming chat completion.
pub(crate) fn build_body(messages: &[Message], model: &str, sampling: &SamplingParams) -> Value {
    let mut body = json!({
        "model": model,
        "messages": messages,
        "stream": true,
    });
    if let Some(temperature) = sampling.temperature {
        body["temperature"] = json!(temperature);
    }
    if let Some(top_p) = sampling.top_p {
        body["top_p"] = json!(top_p);
    }
    if let Some(max_tokens) = sampling.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    body
}

/// Parses a `Retry-After` header given in seconds.
pub(crate) fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}
