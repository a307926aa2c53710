//! Gemini Backend Implementation
//!
//! LLM backend for Google's Generative Language API.
//!
//! # Gemini API
//!
//! - `POST /v1beta/models/{model}:generateContent` - Generate a completion
//!
//! The API key travels in the `x-goog-api-key` header. The reply text is the
//! concatenation of every text part of the first candidate.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use super::traits::{BackendError, LlmBackend, LlmRequest, LlmResponse};
use crate::config::BackendSettings;
use crate::normalizer::preview;

/// Default public endpoint
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Longest error body kept in a [`BackendError::RequestFailed`]
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Gemini backend client
#[derive(Clone)]
pub struct GeminiBackend {
    /// API credential
    api_key: String,
    /// Base URL without trailing slash
    base_url: String,
    /// HTTP client
    http_client: reqwest::Client,
}

impl std::fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl GeminiBackend {
    /// Create a new Gemini backend
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Create from backend settings
    ///
    /// Returns `None` when no API key is configured.
    #[must_use]
    pub fn from_config(settings: &BackendSettings) -> Option<Self> {
        let key = settings.api_key.as_deref()?.trim();
        if key.is_empty() {
            return None;
        }
        Some(Self::new(key, settings.base_url.clone()))
    }

    /// Get generate endpoint URL for a model
    fn generate_url(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }

    /// Build the JSON request body
    fn build_body(request: &LlmRequest) -> Value {
        let mut body = serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": request.prompt }],
            }],
            "generationConfig": {
                "temperature": request.temperature,
            },
        });

        if request.max_tokens > 0 {
            body["generationConfig"]["maxOutputTokens"] = serde_json::json!(request.max_tokens);
        }

        body
    }
}

/// Map a non-success status to a backend error
fn classify_status(status: u16, body: &str, model: &str) -> BackendError {
    match status {
        401 | 403 => BackendError::AuthenticationFailed,
        404 => BackendError::ModelNotFound(model.to_string()),
        429 => BackendError::RateLimited(preview(body, MAX_ERROR_BODY_CHARS)),
        _ => BackendError::RequestFailed {
            status,
            body: preview(body, MAX_ERROR_BODY_CHARS),
        },
    }
}

/// Pull the reply text out of a `generateContent` response
fn extract_text(data: &Value) -> Result<String, BackendError> {
    let parts = data
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .ok_or_else(|| {
            let reason = data
                .get("promptFeedback")
                .and_then(|f| f.get("blockReason"))
                .and_then(Value::as_str)
                .map_or_else(
                    || "no candidate content".to_string(),
                    |r| format!("prompt blocked: {r}"),
                );
            BackendError::MalformedResponse(reason)
        })?;

    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();

    if text.is_empty() {
        return Err(BackendError::MalformedResponse(
            "candidate has no text parts".to_string(),
        ));
    }

    Ok(text)
}

#[async_trait]
impl LlmBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn send(&self, request: &LlmRequest) -> Result<LlmResponse, BackendError> {
        let start = Instant::now();
        let url = self.generate_url(&request.model);
        let body = Self::build_body(request);

        let response = self
            .http_client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout(start.elapsed().as_millis() as u64)
                } else {
                    BackendError::ConnectionFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &body, &request.model));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| BackendError::MalformedResponse(e.to_string()))?;

        let content = extract_text(&data)?;

        let tokens_used = data
            .get("usageMetadata")
            .and_then(|u| u.get("totalTokenCount"))
            .and_then(Value::as_u64)
            .map(|c| c as u32);

        Ok(LlmResponse {
            content,
            model: request.model.clone(),
            tokens_used,
            duration_ms: Some(start.elapsed().as_millis() as u64),
        })
    }
}
