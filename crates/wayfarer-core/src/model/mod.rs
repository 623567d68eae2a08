//! The `ModelClient` trait -- the adapter interface for generation APIs.
//!
//! Each concrete client (Gemini today) implements this trait. The trait is
//! intentionally object-safe so the plan generator can hold an
//! `Arc<dyn ModelClient>` and tests can substitute canned implementations.

pub mod gemini;

pub use gemini::GeminiClient;

use async_trait::async_trait;
use serde_json::Value;

use crate::parser::{self, ExtractError};

/// Sampling parameters for one generation call.
#[derive(Debug, Clone, Copy)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

/// Errors from talking to a generation API.
///
/// A closed set: callers branch on variants (notably
/// [`ModelError::is_rate_limited`]) instead of matching message text.
/// Every call is a single attempt; there is no retry layer.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model call timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("model request failed: {message}")]
    Request { message: String },

    #[error("model API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("model returned an empty response")]
    EmptyResponse,

    #[error(transparent)]
    Unparseable(#[from] ExtractError),
}

impl ModelError {
    /// True when the API rejected the call for rate limiting.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Api { status: 429, .. })
    }
}

/// Adapter interface for LLM text generation APIs.
///
/// # Object Safety
///
/// This trait is object-safe: it can be stored as `Arc<dyn ModelClient>`
/// and swapped for a stub in tests.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Human-readable name for this client (e.g. "gemini").
    fn name(&self) -> &str;

    /// Generate raw text for the prompt. Single attempt, no retries.
    async fn generate(&self, prompt: &str, params: &GenerationParams)
    -> Result<String, ModelError>;

    /// Generate and decode one JSON object, tolerating fenced or
    /// prose-wrapped output.
    async fn generate_json(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<Value, ModelError> {
        let text = self.generate(prompt, params).await?;
        if text.trim().is_empty() {
            return Err(ModelError::EmptyResponse);
        }
        Ok(parser::extract_json(&text)?)
    }
}

// Compile-time assertion: ModelClient must be object-safe.
// If this line compiles, the trait can be used as `dyn ModelClient`.
const _: () = {
    fn _assert_object_safe(_: &dyn ModelClient) {}
};
