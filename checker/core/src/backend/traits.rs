//! LLM Backend Traits
//!
//! Trait definitions for generative-text backends. The pipeline only ever
//! talks to a backend through [`LlmBackend`], so providers can be swapped
//! (or replaced with a scripted double in tests) without touching the
//! invoker or the normalizer.
//!
//! A backend performs exactly one generation call per [`LlmBackend::send`].
//! Retrying and falling back across models is the invoker's job, not the
//! backend's.

use async_trait::async_trait;
use thiserror::Error;

/// Configuration for a single generation request
#[derive(Clone, Debug)]
pub struct LlmRequest {
    /// The prompt to send
    pub prompt: String,
    /// Model to use (backend-specific identifier)
    pub model: String,
    /// Maximum tokens in response (0 = backend default)
    pub max_tokens: u32,
    /// Temperature (0.0-1.0, lower = more deterministic)
    pub temperature: f32,
}

impl Default for LlmRequest {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            model: String::new(),
            max_tokens: 0,
            temperature: 0.2,
        }
    }
}

impl LlmRequest {
    /// Create a new request with prompt and model
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    /// Set temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 1.0);
        self
    }

    /// Set max tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Response from a generation request
#[derive(Clone, Debug)]
pub struct LlmResponse {
    /// The response text
    pub content: String,
    /// Model that generated the response
    pub model: String,
    /// Tokens used (if reported)
    pub tokens_used: Option<u32>,
    /// Response generation time in milliseconds
    pub duration_ms: Option<u64>,
}

/// Errors a backend can report for a single call
#[derive(Clone, Debug, Error)]
pub enum BackendError {
    /// Could not reach the provider
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The call did not finish within its time bound
    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    /// Quota or rate limit hit
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// The provider does not know this model
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Credential rejected
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// Any other non-success HTTP status
    #[error("Request failed with status {status}: {body}")]
    RequestFailed {
        /// HTTP status code
        status: u16,
        /// Response body (possibly truncated)
        body: String,
    },

    /// The provider answered but the reply had no usable text
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

/// LLM Backend trait
///
/// Implement this trait to add support for a generative-text provider.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Provider family identifier (e.g. "gemini")
    fn name(&self) -> &str;

    /// Send a request and wait for the complete response
    async fn send(&self, request: &LlmRequest) -> Result<LlmResponse, BackendError>;
}
