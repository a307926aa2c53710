//! Model Invoker
//!
//! Sequential fallback across an ordered list of model candidates.
//!
//! # Architecture
//!
//! ```text
//! invoke(prompt)
//!     |
//!     v
//! candidate 1 (gemini-2.0-flash-exp) --error/timeout--+
//!     |                                               |
//!   reply                                             v
//!     |                               candidate 2 (gemini-1.5-flash) --error--+
//!     v                                               |                       |
//! Invocation                                        reply                     v
//!                                                     |             candidate 3 ... --error--> ProviderExhausted
//!                                                     v
//!                                                 Invocation
//! ```
//!
//! Each candidate gets exactly one call, bounded by the per-call timeout. The
//! first success wins; nothing after it is contacted.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backend::{BackendError, GeminiBackend, LlmBackend, LlmRequest};
use crate::config::BackendSettings;

// ============================================================================
// Candidate Chain
// ============================================================================

/// Problems with a candidate list
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ChainError {
    /// No candidates at all
    #[error("candidate list is empty")]
    Empty,

    /// The same model appears twice
    #[error("duplicate candidate model `{0}`")]
    Duplicate(String),

    /// A blank model id
    #[error("candidate model id is blank")]
    BlankModel,
}

/// Ordered, non-empty, duplicate-free list of model ids
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CandidateChain {
    models: Vec<String>,
}

impl CandidateChain {
    /// Models tried when nothing else is configured
    pub const DEFAULT_MODELS: [&'static str; 3] =
        ["gemini-2.0-flash-exp", "gemini-1.5-flash", "gemini-1.5-pro"];

    /// Validate and build a chain
    ///
    /// # Errors
    ///
    /// Returns [`ChainError`] for an empty list, a blank id or a duplicate.
    pub fn new(models: Vec<String>) -> Result<Self, ChainError> {
        if models.is_empty() {
            return Err(ChainError::Empty);
        }

        let mut seen = HashSet::new();
        for model in &models {
            if model.trim().is_empty() {
                return Err(ChainError::BlankModel);
            }
            if !seen.insert(model.as_str()) {
                return Err(ChainError::Duplicate(model.clone()));
            }
        }

        Ok(Self { models })
    }

    /// Candidates in the order they are tried
    #[must_use]
    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Number of candidates
    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether there are no candidates
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl Default for CandidateChain {
    fn default() -> Self {
        Self {
            models: Self::DEFAULT_MODELS
                .iter()
                .map(|m| (*m).to_string())
                .collect(),
        }
    }
}

// ============================================================================
// Generation Parameters
// ============================================================================

/// Fixed parameters applied to every candidate call
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GenerationParams {
    /// Sampling temperature
    pub temperature: f32,
    /// Output length cap in tokens
    pub max_output_tokens: u32,
    /// Bound on a single candidate call
    pub call_timeout: Duration,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_output_tokens: 1000,
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl GenerationParams {
    /// Take parameters from backend settings
    #[must_use]
    pub fn from_settings(settings: &BackendSettings) -> Self {
        Self {
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
            call_timeout: settings.call_timeout,
        }
    }
}

// ============================================================================
// Results and Errors
// ============================================================================

/// Successful invocation
#[derive(Clone, Debug)]
pub struct Invocation {
    /// Raw reply text
    pub text: String,
    /// Model that answered
    pub model: String,
    /// `backend/model` label
    pub provider: String,
    /// Calls made, including the successful one
    pub attempts: usize,
    /// Wall time across all attempts
    pub elapsed: Duration,
}

/// One failed candidate
#[derive(Clone, Debug)]
pub struct AttemptFailure {
    /// Model that was tried
    pub model: String,
    /// What went wrong
    pub error: BackendError,
}

impl std::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.model, self.error)
    }
}

/// Invocation failures
#[derive(Clone, Debug, Error)]
pub enum InvokeError {
    /// No backend configured; nothing was attempted
    #[error("No generative backend configured. Set GOOGLE_API_KEY to enable analysis.")]
    ProviderUnavailable,

    /// Every candidate failed
    #[error("All {} candidate models failed: {}", .attempts.len(), join_failures(.attempts))]
    ProviderExhausted {
        /// Failures in the order they happened
        attempts: Vec<AttemptFailure>,
    },
}

fn join_failures(attempts: &[AttemptFailure]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ============================================================================
// Invoker
// ============================================================================

/// Tries each candidate in order until one returns text
#[derive(Clone)]
pub struct ModelInvoker {
    backend: Option<Arc<dyn LlmBackend>>,
    chain: CandidateChain,
    params: GenerationParams,
}

impl std::fmt::Debug for ModelInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelInvoker")
            .field("backend", &self.backend.as_ref().map(|b| b.name().to_string()))
            .field("chain", &self.chain)
            .field("params", &self.params)
            .finish()
    }
}

impl ModelInvoker {
    /// Create an invoker; `backend` is `None` when no provider is configured
    #[must_use]
    pub fn new(
        backend: Option<Arc<dyn LlmBackend>>,
        chain: CandidateChain,
        params: GenerationParams,
    ) -> Self {
        Self {
            backend,
            chain,
            params,
        }
    }

    /// Build the Gemini-backed invoker described by `settings`
    ///
    /// # Errors
    ///
    /// Returns [`ChainError`] if the configured model list is invalid.
    pub fn from_config(settings: &BackendSettings) -> Result<Self, ChainError> {
        let chain = CandidateChain::new(settings.models.clone())?;
        let backend = GeminiBackend::from_config(settings)
            .map(|gemini| Arc::new(gemini) as Arc<dyn LlmBackend>);

        if backend.is_none() {
            warn!("No API key configured; analysis requests will fail until one is set");
        }

        Ok(Self::new(
            backend,
            chain,
            GenerationParams::from_settings(settings),
        ))
    }

    /// Configured backend families (empty when none)
    #[must_use]
    pub fn providers(&self) -> Vec<String> {
        self.backend
            .iter()
            .map(|b| b.name().to_string())
            .collect()
    }

    /// Whether a backend is configured
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    /// Candidate chain in use
    #[must_use]
    pub fn chain(&self) -> &CandidateChain {
        &self.chain
    }

    /// Run `prompt` against the candidates in order
    ///
    /// # Errors
    ///
    /// [`InvokeError::ProviderUnavailable`] if no backend is configured,
    /// [`InvokeError::ProviderExhausted`] if every candidate failed.
    pub async fn invoke(&self, prompt: &str) -> Result<Invocation, InvokeError> {
        let backend = self
            .backend
            .as_ref()
            .ok_or(InvokeError::ProviderUnavailable)?;

        let start = Instant::now();
        let mut failures = Vec::new();

        for model in self.chain.models() {
            let request = LlmRequest::new(prompt, model.as_str())
                .with_temperature(self.params.temperature)
                .with_max_tokens(self.params.max_output_tokens);

            debug!(model = %model, "Trying candidate model");

            let outcome = tokio::time::timeout(self.params.call_timeout, backend.send(&request))
                .await
                .unwrap_or_else(|_| {
                    Err(BackendError::Timeout(
                        u64::try_from(self.params.call_timeout.as_millis()).unwrap_or(u64::MAX),
                    ))
                });

            match outcome {
                Ok(response) => {
                    let attempts = failures.len() + 1;
                    info!(
                        model = %model,
                        attempts,
                        duration_ms = response.duration_ms,
                        "Candidate model responded"
                    );
                    return Ok(Invocation {
                        text: response.content,
                        model: model.clone(),
                        provider: format!("{}/{}", backend.name(), model),
                        attempts,
                        elapsed: start.elapsed(),
                    });
                }
                Err(error) => {
                    warn!(model = %model, error = %error, "Candidate model failed, trying next");
                    failures.push(AttemptFailure {
                        model: model.clone(),
                        error,
                    });
                }
            }
        }

        Err(InvokeError::ProviderExhausted { attempts: failures })
    }
}

// ============================================================================
// Prompt
// ============================================================================

/// Render the analysis prompt for a symptom description
#[must_use]
pub fn build_prompt(symptoms: &str) -> String {
    format!(
        r#"You are a medical education assistant. Analyze these symptoms for educational purposes only.

Symptoms: {symptoms}

IMPORTANT: Respond ONLY with valid JSON in this exact format (no additional text):

{{
  "conditions": [
    "Possible condition 1 with educational context",
    "Possible condition 2 with educational context"
  ],
  "nextSteps": [
    "Recommended step 1",
    "Recommended step 2",
    "Consult with a healthcare professional"
  ],
  "urgentCare": [
    "When to seek immediate medical attention",
    "Emergency warning signs to watch for"
  ],
  "disclaimer": "This is for educational purposes only. Always consult healthcare professionals for medical advice, diagnosis, or treatment."
}}

Requirements:
- Educational purpose only
- Include safety warnings
- Recommend professional consultation
- Valid JSON format only"#
    )
}
