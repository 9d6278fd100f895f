//! SSE (Server-Sent Events) decoding for chat completion streams.
//!
//! Bytes are buffered until a full line is available, so multi-byte
//! characters split across network reads decode correctly.

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::ChunkStream;
use crate::error::{CallErrorKind, ProviderCallError};

/// A decoded event from a chat completion stream.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SseEvent {
    /// A non-empty text delta.
    Text(String),
    /// The `[DONE]` marker.
    Done,
}

/// Incremental line decoder for `data:` events.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    partial: Vec<u8>,
    events_seen: usize,
}

impl SseDecoder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Feeds raw bytes, returning every event completed by them.
    pub(crate) fn feed(&mut self, bytes: &[u8]) -> Result<Vec<SseEvent>, CallErrorKind> {
        self.partial.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.partial.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.partial.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.decode_line(line.trim_end_matches(['\r', '\n']))? {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Decodes whatever is left once the body ends without a trailing newline.
    pub(crate) fn finish(&mut self) -> Result<Option<SseEvent>, CallErrorKind> {
        if self.partial.is_empty() {
            return Ok(None);
        }
        let rest = std::mem::take(&mut self.partial);
        let line = String::from_utf8_lossy(&rest);
        self.decode_line(line.trim_end_matches('\r'))
    }

    fn decode_line(&mut self, line: &str) -> Result<Option<SseEvent>, CallErrorKind> {
        // Skip blank separators, comments, and non-data fields
        if line.is_empty() || line.starts_with(':') {
            return Ok(None);
        }
        let Some(data) = line.strip_prefix("data:") else {
            return Ok(None);
        };
        let data = data.strip_prefix(' ').unwrap_or(data);

        self.events_seen += 1;
        if data == "[DONE]" {
            debug!(events = self.events_seen, "SSE [DONE] marker received");
            return Ok(Some(SseEvent::Done));
        }

        let json: Value = serde_json::from_str(data)
            .map_err(|e| CallErrorKind::Malformed(format!("invalid SSE payload: {e}")))?;
        parse_chat_chunk(&json)
    }
}

/// Extracts the text delta from one chat completion chunk.
///
/// In-band `error` objects become [`CallErrorKind::Status`], using the
/// error's numeric `code` when present.
fn parse_chat_chunk(json: &Value) -> Result<Option<SseEvent>, CallErrorKind> {
    if let Some(error) = json.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown provider error")
            .to_string();
        let status = error
            .get("code")
            .and_then(Value::as_u64)
            .and_then(|c| u16::try_from(c).ok())
            .unwrap_or(502);
        return Err(CallErrorKind::Status {
            status,
            body: message,
            retry_after: None,
        });
    }

    let choices = json
        .get("choices")
        .and_then(Value::as_array)
        .ok_or_else(|| CallErrorKind::Malformed("chunk without choices".to_string()))?;

    let text = choices
        .first()
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(Value::as_str)
        .unwrap_or_default();

    if text.is_empty() {
        Ok(None)
    } else {
        Ok(Some(SseEvent::Text(text.to_string())))
    }
}

struct SseState {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    cancel: CancellationToken,
    provider: String,
    model: String,
    done: bool,
}

impl SseState {
    fn fail(&mut self, kind: CallErrorKind) -> ProviderCallError {
        self.done = true;
        self.pending.clear();
        ProviderCallError::new(self.provider.clone(), self.model.clone(), kind)
    }

    fn push(&mut self, event: SseEvent) {
        match event {
            SseEvent::Text(text) => self.pending.push_back(text),
            SseEvent::Done => self.done = true,
        }
    }
}

/// Turns a successful streaming response into a [`ChunkStream`].
///
/// Each body read races `cancel`; cancellation ends the stream with
/// [`CallErrorKind::Cancelled`] and drops the connection.
pub(crate) fn chunk_stream(
    response: reqwest::Response,
    cancel: CancellationToken,
    provider: String,
    model: String,
) -> ChunkStream {
    let state = SseState {
        body: response.bytes_stream().boxed(),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        cancel,
        provider,
        model,
        done: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(text) = st.pending.pop_front() {
                return Some((Ok(text), st));
            }
            if st.done {
                return None;
            }

            let next = tokio::select! {
                biased;
                _ = st.cancel.cancelled() => None,
                next = st.body.next() => Some(next),
            };
            let Some(next) = next else {
                let err = st.fail(CallErrorKind::Cancelled);
                return Some((Err(err), st));
            };

            match next {
                Some(Ok(bytes)) => match st.decoder.feed(&bytes) {
                    Ok(events) => {
                        for event in events {
                            if st.done {
                                break;
                            }
                            st.push(event);
                        }
                    }
                    Err(kind) => {
                        let err = st.fail(kind);
                        return Some((Err(err), st));
                    }
                },
                Some(Err(e)) => {
                    let err = st.fail(CallErrorKind::Network(e));
                    return Some((Err(err), st));
                }
                None => {
                    match st.decoder.finish() {
                        Ok(Some(event)) => st.push(event),
                        Ok(None) => {}
                        Err(kind) => {
                            let err = st.fail(kind);
                            return Some((Err(err), st));
                        }
                    }
                    st.done = true;
                }
            }
        }
    })
    .boxed()
}
