//! HTTP client for the Gemini `generateContent` API.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use super::{GenerationParams, ModelClient, ModelError};

/// Base URL for the Gemini REST API.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Model used when no override is configured.
const DEFAULT_MODEL: &str = "gemini-pro";

/// Per-call deadline when no override is configured.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Client for Gemini text generation.
///
/// One call per request, bounded by a single overall deadline. The reqwest
/// client carries no timeout of its own; the deadline is applied per call
/// in [`ModelClient::generate`] so a slow call always surfaces as
/// [`ModelError::Timeout`].
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl GeminiClient {
    /// Create a client with the default endpoint, model, and deadline.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ModelError::Request {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_owned(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        })
    }

    /// Override the API base URL (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the per-call deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Model identifier this client calls.
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn call(&self, url: &str, body: &serde_json::Value) -> Result<String, ModelError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| ModelError::Request {
                message: format!("HTTP request failed: {e}"),
            })?;

        let status = response.status();
        debug!(status = %status, model = %self.model, "generation response received");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
                Ok(api_err) if api_err.error.status.is_empty() => api_err.error.message,
                Ok(api_err) => format!("{}: {}", api_err.error.status, api_err.error.message),
                Err(_) => body,
            };
            return Err(ModelError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let decoded: GenerateContentResponse =
            response.json().await.map_err(|e| ModelError::Request {
                message: format!("failed to decode response body: {e}"),
            })?;

        let text = decoded
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<String>()
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ModelError::EmptyResponse);
        }
        Ok(text)
    }
}

#[async_trait::async_trait]
impl ModelClient for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, ModelError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": params.temperature,
                "maxOutputTokens": params.max_output_tokens,
            },
        });

        let secs = self.timeout.as_secs();
        match tokio::time::timeout(self.timeout, self.call(&url, &body)).await {
            Ok(result) => result,
            Err(_) => Err(ModelError::Timeout { secs }),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
