// OpenAI-compatible LLM Driver
//
// One driver serves every backend that speaks the chat-completions protocol.
// Requests are non-streaming; the whole response is decoded at once.

use crate::types::{ChatRequest, OpenAiResponse};
use async_trait::async_trait;
use reqwest::Client;
use tandem_core::{AgentError, LlmCallConfig, LlmDriver, LlmMessage, LlmResponse, Result};
use thiserror::Error;
use tracing::debug;

/// Failures talking to a chat-completions endpoint
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("cannot reach {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned status {status}: {body}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("unexpected response from {url}: {message}")]
    Decode { url: String, message: String },
}

impl HttpError {
    pub(crate) fn from_send(url: &str, source: reqwest::Error) -> Self {
        if source.is_connect() || source.is_timeout() {
            HttpError::Connect {
                url: url.to_string(),
                source,
            }
        } else {
            HttpError::Transport {
                url: url.to_string(),
                source,
            }
        }
    }
}

impl From<HttpError> for AgentError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Connect { .. } => AgentError::backend_unavailable(err.to_string()),
            _ => AgentError::llm(err.to_string()),
        }
    }
}

/// Driver for any OpenAI-compatible chat-completions endpoint
///
/// # Example
///
/// ```ignore
/// use tandem_openai::OpenAiCompatibleDriver;
///
/// let driver = OpenAiCompatibleDriver::new("http://localhost:11434/v1", None);
/// // or for a hosted backend
/// let driver = OpenAiCompatibleDriver::new("https://api.groq.com/openai/v1", Some(key));
/// ```
#[derive(Clone)]
pub struct OpenAiCompatibleDriver {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiCompatibleDriver {
    /// Create a driver for `base_url` (the part before `/chat/completions`)
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self::with_client(Client::new(), base_url, api_key)
    }

    /// Create a driver sharing an existing HTTP client
    pub fn with_client(client: Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let base_url = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full chat completions URL
    pub fn api_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn send(&self, request: &ChatRequest) -> std::result::Result<LlmResponse, HttpError> {
        let url = self.api_url();

        let mut builder = self.client.post(&url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| HttpError::from_send(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HttpError::Status { url, status, body });
        }

        let body: OpenAiResponse = response.json().await.map_err(|e| HttpError::Decode {
            url: url.clone(),
            message: e.to_string(),
        })?;

        body.into_llm_response().ok_or_else(|| HttpError::Decode {
            url,
            message: "no choices in response".to_string(),
        })
    }
}

#[async_trait]
impl LlmDriver for OpenAiCompatibleDriver {
    async fn chat_completion(
        &self,
        messages: Vec<LlmMessage>,
        config: &LlmCallConfig,
    ) -> Result<LlmResponse> {
        let request = ChatRequest::new(&messages, config);
        debug!(
            url = %self.api_url(),
            model = %request.model,
            messages = request.messages.len(),
            tools = config.tools.len(),
            "Sending chat completion request"
        );

        let response = self.send(&request).await?;
        debug!(
            tool_calls = response.tool_calls.len(),
            total_tokens = ?response.metadata.total_tokens,
            finish_reason = ?response.metadata.finish_reason,
            "Chat completion received"
        );
        Ok(response)
    }
}

impl std::fmt::Debug for OpenAiCompatibleDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleDriver")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
