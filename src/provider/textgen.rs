//! Generic text-generation backend client.
//!
//! The backend has no chat concept: the conversation is flattened into one
//! prompt and the single text block it returns becomes a one-chunk stream.

use futures::stream::{self, StreamExt};
use reqwest::header::RETRY_AFTER;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::chat::{parse_retry_after, truncate};
use super::{ChunkStream, SamplingParams};
use crate::error::{CallErrorKind, ProviderCallError};
use crate::message::{flatten_prompt, Message};

#[derive(Debug, Clone)]
pub(crate) struct TextGenClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl TextGenClient {
    pub(crate) fn new(http: reqwest::Client, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub(crate) fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    pub(crate) async fn stream(
        &self,
        provider: &str,
        messages: &[Message],
        model: &str,
        sampling: &SamplingParams,
        cancel: &CancellationToken,
    ) -> Result<ChunkStream, ProviderCallError> {
        let fail = |kind| ProviderCallError::new(provider, model, kind);
        let prompt = flatten_prompt(messages);
        let body = build_body(&prompt, model, sampling);

        let mut request = self.http.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        debug!(provider, model, prompt_chars = prompt.len(), "Sending text generation request");
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(fail(CallErrorKind::Cancelled)),
            res = request.send() => res.map_err(|e| fail(CallErrorKind::Network(e)))?,
        };

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);

        let text = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(fail(CallErrorKind::Cancelled)),
            text = response.text() => text.map_err(|e| fail(CallErrorKind::Network(e)))?,
        };

        if !status.is_success() {
            warn!(provider, model, status = status.as_u16(), "Provider returned error status");
            return Err(fail(CallErrorKind::Status {
                status: status.as_u16(),
                body: truncate(&text, 512),
                retry_after,
            }));
        }

        let json: Value = serde_json::from_str(&text)
            .map_err(|e| fail(CallErrorKind::Malformed(format!("invalid JSON body: {e}"))))?;
        let completion = extract_text(&json).ok_or_else(|| {
            fail(CallErrorKind::Malformed(
                "no generated text in response".to_string(),
            ))
        })?;

        Ok(stream::once(async move { Ok::<_, ProviderCallError>(completion) }).boxed())
    }
}

fn build_body(prompt: &str, model: &str, sampling: &SamplingParams) -> Value {
    let mut body = json!({
        "model": model,
        "prompt": prompt,
        "stream": false,
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

/// Pulls the generated text out of the common response shapes:
/// `{"response"}`, `{"text"}`, `{"completion"}`, `{"generated_text"}`,
/// `[{"generated_text"}]` and `{"choices": [{"text"}]}`.
fn extract_text(json: &Value) -> Option<String> {
    if let Some(first) = json.as_array().and_then(|a| a.first()) {
        return extract_text(first);
    }
    for field in ["response", "text", "completion", "generated_text"] {
        if let Some(text) = json.get(field).and_then(Value::as_str) {
            return Some(text.to_string());
        }
    }
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("text"))
        .and_then(Value::as_str)
        .map(String::from)
}
