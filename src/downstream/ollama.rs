//! Ollama `/api/generate` client

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::{GenerateError, Payload, TextGenerator};
use crate::concurrency::DeadlineGuard;

/// Request body for `/api/generate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Map<String, Value>>,
}

impl GenerateRequest {
    /// Non-streaming request for `prompt` against `model`
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            suffix: None,
            stream: false,
            format: None,
            options: None,
        }
    }
}

/// HTTP client for an Ollama server
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl OllamaClient {
    /// Create a client for the server at `base_url`
    pub fn new(base_url: &str) -> Result<Self, GenerateError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| GenerateError::Transport(e.to_string()))?;
        Self::with_http_client(base_url, http)
    }

    /// Create a client reusing an existing `reqwest::Client`
    pub fn with_http_client(base_url: &str, http: reqwest::Client) -> Result<Self, GenerateError> {
        let endpoint = format!("{}/api/generate", base_url.trim_end_matches('/'));
        let endpoint =
            Url::parse(&endpoint).map_err(|e| GenerateError::InvalidUrl(format!("{endpoint}: {e}")))?;
        Ok(Self { http, endpoint })
    }

    /// The full `/api/generate` URL
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn send(&self, request: &GenerateRequest) -> Result<Payload, GenerateError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| GenerateError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| GenerateError::Transport(format!("error reading response: {e}")))?;

        if !status.is_success() {
            return Err(GenerateError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).trim().to_string(),
            });
        }

        serde_json::from_slice(&body).map_err(|e| GenerateError::InvalidPayload(e.to_string()))
    }
}

#[async_trait]
impl TextGenerator for OllamaClient {
    #[instrument(skip(self, prompt, deadline), fields(model = %model))]
    async fn generate(
        &self,
        prompt: &str,
        model: &str,
        deadline: &DeadlineGuard,
    ) -> Result<Payload, GenerateError> {
        let request = GenerateRequest::new(model, prompt);

        // Dropping the in-flight send aborts the HTTP request
        let result = tokio::select! {
            biased;
            _ = deadline.cancelled() => Err(GenerateError::Cancelled),
            result = self.send(&request) => result,
        };

        match &result {
            Ok(_) => debug!("Generation completed"),
            Err(e) => warn!(error = %e, "Generation failed"),
        }
        result
    }
}
