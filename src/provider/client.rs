//! Configured provider and its backend dispatch.
//!
//! Contains the [`Provider`] struct which wraps one backend client behind
//! enum dispatch, keeping wire-format details out of the routing layer.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::error;

use super::chat::ChatClient;
use super::kind::{default_model_for, ProviderKind};
use super::textgen::TextGenClient;
use super::{ChatBackend, ChunkStream, SamplingParams};
use crate::config::{Config, Credentials, ProviderEntry};
use crate::constants::{APP_TITLE, APP_URL, CONNECT_TIMEOUT, USER_AGENT};
use crate::error::{CallErrorKind, ProviderCallError};
use crate::message::Message;

/// Internal enum wrapping backend-specific clients.
#[derive(Debug, Clone)]
enum ClientKind {
    OpenAI(ChatClient),
    OpenRouter(ChatClient),
    TextGen(TextGenClient),
}

/// Dispatches an operation across backend-specific clients.
///
/// Every client exposes the same `stream` signature, so each arm runs the
/// same block with `$client` bound to the concrete client.
macro_rules! dispatch {
    ($self:expr, |$client:ident| $body:expr) => {
        match &$self.client {
            ClientKind::OpenAI($client) => $body,
            ClientKind::OpenRouter($client) => $body,
            ClientKind::TextGen($client) => $body,
        }
    };
}

/// A configured backend ready to stream completions.
///
/// Immutable once built. Cloning is cheap: the HTTP client is shared.
#[derive(Debug, Clone)]
pub struct Provider {
    kind: ProviderKind,
    client: ClientKind,
    default_model: String,
    fallback_models: Vec<String>,
}

impl Provider {
    /// Builds a provider from resolved credentials and its optional config entry.
    pub fn new(
        kind: ProviderKind,
        credentials: &Credentials,
        entry: Option<&ProviderEntry>,
        http: reqwest::Client,
    ) -> Self {
        let client = match kind {
            ProviderKind::OpenAI => ClientKind::OpenAI(ChatClient::new(
                http,
                &credentials.base_url,
                credentials.api_key.clone().unwrap_or_default(),
            )),
            ProviderKind::OpenRouter => ClientKind::OpenRouter(
                ChatClient::new(
                    http,
                    &credentials.base_url,
                    credentials.api_key.clone().unwrap_or_default(),
                )
                .with_header("HTTP-Referer", APP_URL)
                .with_header("X-Title", APP_TITLE),
            ),
            ProviderKind::TextGen => ClientKind::TextGen(TextGenClient::new(
                http,
                &credentials.base_url,
                credentials.api_key.clone(),
            )),
        };

        let default_model = entry
            .and_then(|e| e.model.clone())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| default_model_for(kind).to_string());
        let mut fallback_models = entry
            .map(|e| e.fallback_models.clone())
            .unwrap_or_default();
        if fallback_models.is_empty() {
            fallback_models.push(default_model.clone());
        }

        Self {
            kind,
            client,
            default_model,
            fallback_models,
        }
    }

    /// Builds every provider with credentials, in configured order.
    ///
    /// Providers without credentials are skipped here, once, so routing never
    /// has to check them again.
    pub fn all_from_config(config: &Config) -> Result<Vec<Provider>, crate::error::ConfigError> {
        let http = Self::create_http_client();
        Ok(config
            .configured_providers()?
            .into_iter()
            .map(|(kind, creds)| Provider::new(kind, &creds, config.entry(kind), http.clone()))
            .collect())
    }

    /// Create the HTTP client shared by all providers.
    ///
    /// Only the connect phase has a timeout; the whole-call deadline belongs
    /// to the caller's cancellation token.
    pub fn create_http_client() -> reqwest::Client {
        reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                error!("Failed to build HTTP client: {}. Using default client.", e);
                reqwest::Client::new()
            })
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }
}

#[async_trait]
impl ChatBackend for Provider {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    fn fallback_models(&self) -> &[String] {
        &self.fallback_models
    }

    async fn stream_completion(
        &self,
        messages: &[Message],
        model: &str,
        sampling: &SamplingParams,
        cancel: &CancellationToken,
    ) -> Result<ChunkStream, ProviderCallError> {
        let provider = self.name();
        if messages.is_empty() {
            return Err(ProviderCallError::new(provider, model, CallErrorKind::EmptyConversation));
        }
        if model.trim().is_empty() {
            return Err(ProviderCallError::new(provider, model, CallErrorKind::EmptyModel));
        }
        if cancel.is_cancelled() {
            return Err(ProviderCallError::new(provider, model, CallErrorKind::Cancelled));
        }

        dispatch!(self, |client| {
            client.stream(provider, messages, model, sampling, cancel).await
        })
    }
}
