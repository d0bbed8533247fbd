//! Upstream text-generation transport.
//!
//! [`PromptTransport`] is the seam between a relay session and the remote
//! completion endpoint: submit a prompt, get back a status and an incremental
//! body. [`HttpTransport`] is the production implementation over reqwest;
//! tests substitute scripted transports.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use honyaku_types::PromptPayload;
use serde_json::json;

use crate::config::RelayConfig;

/// Errors from the upstream transport.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The request could not be built or sent (DNS, connect, TLS, timeout).
    #[error("request failed: {0}")]
    Request(String),

    /// The response body stream broke mid-read.
    #[error("body read failed: {0}")]
    Body(String),

    /// Transport is misconfigured (missing key, bad header).
    #[error("transport misconfigured: {0}")]
    Config(String),
}

/// Incremental response body.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Status plus body of an upstream response.
pub struct TransportResponse {
    pub status: u16,
    pub body: ByteStream,
}

impl TransportResponse {
    pub fn new(status: u16, body: ByteStream) -> Self {
        Self { status, body }
    }

    /// 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// `submitPrompt(promptText, modelId) -> {status, bodyStream}`.
#[async_trait]
pub trait PromptTransport: Send + Sync {
    /// Open one streaming completion.
    async fn submit(&self, payload: &PromptPayload, model: &str) -> Result<TransportResponse, TransportError>;
}

// ============================================================================
// HttpTransport
// ============================================================================

/// Streaming chat-completions client over reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    headers: reqwest::header::HeaderMap,
}

impl HttpTransport {
    /// Build a transport from relay configuration.
    pub fn from_config(config: &RelayConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| TransportError::Config(e.to_string()))?;

        let mut headers = reqwest::header::HeaderMap::new();
        for (name, value) in &config.extra_headers {
            let name = reqwest::header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Config(format!("header {name}: {e}")))?;
            let value = reqwest::header::HeaderValue::from_str(value)
                .map_err(|e| TransportError::Config(format!("header {name} value: {e}")))?;
            headers.insert(name, value);
        }

        let api_key = config.resolve_api_key();
        if api_key.is_none() {
            tracing::warn!(endpoint = %config.endpoint, "no API key configured, sending unauthenticated requests");
        }

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            headers,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_body(payload: &PromptPayload, model: &str) -> serde_json::Value {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &payload.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": payload.prompt }));
        json!({
            "model": model,
            "stream": true,
            "messages": messages,
        })
    }
}

#[async_trait]
impl PromptTransport for HttpTransport {
    async fn submit(&self, payload: &PromptPayload, model: &str) -> Result<TransportResponse, TransportError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&Self::request_body(payload, model));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::Body(e.to_string())))
            .boxed();
        Ok(TransportResponse::new(status, body))
    }
}
