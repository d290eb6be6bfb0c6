use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::natter::models::Message;

/// Errors from the proxy's HTTP surface.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The streaming endpoint answered 2xx but with nothing to stream.
    #[error("response has no streamable body")]
    NoStreamBody,
}

/// Incremental text chunks of one assistant response.
pub type TextStream = BoxStream<'static, Result<String, LlmError>>;

/// Outbound payload for one turn: the full message list rebuilt from the
/// thread plus the new user message. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub options: ChatOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatOptions {
    pub temperature: f64,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    models: Vec<String>,
}

/// The chat server as seen by this client: model listing, a streaming chat
/// endpoint, and a buffered one used only as fallback.
#[async_trait]
pub trait ChatBackend: Send + Sync + 'static {
    async fn fetch_models(&self) -> Result<Vec<String>, LlmError>;

    /// Open an incremental response stream for `request`.
    async fn stream_chat(&self, request: &ChatRequest) -> Result<TextStream, LlmError>;

    /// Buffered request with the same payload; returns the full body.
    async fn chat(&self, request: &ChatRequest) -> Result<String, LlmError>;
}

/// reqwest-backed implementation speaking to the local proxy.
pub struct HttpChatBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpChatBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn fetch_models(&self) -> Result<Vec<String>, LlmError> {
        let response = self.client.get(self.url("/models")).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let parsed: ModelsResponse = response.json().await?;
        Ok(parsed.models)
    }

    async fn stream_chat(&self, request: &ChatRequest) -> Result<TextStream, LlmError> {
        let response = self
            .client
            .post(self.url("/chat_stream"))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        // A 2xx that advertises an empty body cannot stream; let the caller
        // fall back to the buffered endpoint.
        if response.content_length() == Some(0) {
            return Err(LlmError::NoStreamBody);
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| match chunk {
                Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
                Err(e) => Err(LlmError::Network(e)),
            })
            .boxed();
        Ok(stream)
    }

    async fn chat(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let response = self
            .client
            .post(self.url("/chat"))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.text().await?)
    }
}
