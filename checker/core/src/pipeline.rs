//! Query Pipeline
//!
//! Orchestrates one analysis request: validate the input, run the model
//! invoker, normalize the reply, persist the record. History reads and the
//! provider listing also go through here so the HTTP layer only talks to one
//! object.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, Instrument};
use uuid::Uuid;

use crate::config::Limits;
use crate::invoker::{build_prompt, InvokeError, ModelInvoker};
use crate::normalizer::{normalize, preview};
use crate::response::StructuredResponse;
use crate::store::{NewQuery, QueryRecord, QueryStore, StoreError};

/// Characters of user input included in log lines
const LOG_INPUT_PREVIEW_CHARS: usize = 100;

// ============================================================================
// Policy
// ============================================================================

/// What a failed write does to the request
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistencePolicy {
    /// The request fails
    #[default]
    Strict,
    /// The failure is logged and the analysis is still returned
    BestEffort,
}

/// Unrecognized persistence policy name
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("unknown persistence policy `{0}` (expected `strict` or `best_effort`)")]
pub struct UnknownPolicy(pub String);

impl FromStr for PersistencePolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "strict" => Ok(Self::Strict),
            "best_effort" => Ok(Self::BestEffort),
            _ => Err(UnknownPolicy(s.to_string())),
        }
    }
}

impl std::fmt::Display for PersistencePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::BestEffort => write!(f, "best_effort"),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Rejected user input
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Missing, empty or whitespace-only
    #[error("Symptoms are required")]
    Empty,

    /// Longer than the configured maximum
    #[error("Symptoms description too long (max {max} characters)")]
    TooLong {
        /// Submitted length in characters
        len: usize,
        /// Allowed maximum
        max: usize,
    },
}

/// Anything that stops an analysis or history read
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Bad input; the backend was not contacted
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No candidate produced a reply
    #[error(transparent)]
    Invoke(#[from] InvokeError),

    /// The store failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// Pipeline
// ============================================================================

/// Result of a successful analysis
#[derive(Clone, Debug)]
pub struct Analysis {
    /// Normalized record
    pub response: StructuredResponse,
    /// `backend/model` label of the producer
    pub provider: String,
    /// Stored id; `None` only when a best-effort write failed
    pub record_id: Option<i64>,
    /// When the analysis completed
    pub timestamp: DateTime<Utc>,
    /// Whether the fallback record was used
    pub fell_back: bool,
}

/// Validate → invoke → normalize → persist
pub struct QueryPipeline {
    invoker: ModelInvoker,
    store: Arc<dyn QueryStore>,
    limits: Limits,
    persistence: PersistencePolicy,
}

impl std::fmt::Debug for QueryPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryPipeline")
            .field("invoker", &self.invoker)
            .field("limits", &self.limits)
            .field("persistence", &self.persistence)
            .finish_non_exhaustive()
    }
}

impl QueryPipeline {
    /// Create a pipeline with default limits and strict persistence
    #[must_use]
    pub fn new(invoker: ModelInvoker, store: Arc<dyn QueryStore>) -> Self {
        Self {
            invoker,
            store,
            limits: Limits::default(),
            persistence: PersistencePolicy::default(),
        }
    }

    /// Set input and paging limits
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set persistence policy
    #[must_use]
    pub fn with_persistence(mut self, policy: PersistencePolicy) -> Self {
        self.persistence = policy;
        self
    }

    /// Limits in effect
    #[must_use]
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Check a symptom description without doing anything else
    ///
    /// # Errors
    ///
    /// [`ValidationError::Empty`] for blank input,
    /// [`ValidationError::TooLong`] past the character limit.
    pub fn validate(&self, symptoms: &str) -> Result<(), ValidationError> {
        if symptoms.trim().is_empty() {
            return Err(ValidationError::Empty);
        }

        let len = symptoms.chars().count();
        if len > self.limits.max_input_length {
            return Err(ValidationError::TooLong {
                len,
                max: self.limits.max_input_length,
            });
        }

        Ok(())
    }

    /// Analyze a symptom description and store the result
    ///
    /// The input is stored exactly as given.
    ///
    /// # Errors
    ///
    /// Validation and invocation failures always fail the call. A store
    /// failure fails it only under [`PersistencePolicy::Strict`].
    pub async fn analyze(
        &self,
        symptoms: &str,
        session_id: Option<String>,
    ) -> Result<Analysis, PipelineError> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("analyze", %request_id);
        self.analyze_inner(symptoms, session_id).instrument(span).await
    }

    async fn analyze_inner(
        &self,
        symptoms: &str,
        session_id: Option<String>,
    ) -> Result<Analysis, PipelineError> {
        self.validate(symptoms)?;

        info!(
            symptoms = %preview(symptoms, LOG_INPUT_PREVIEW_CHARS),
            "Analyzing symptoms"
        );

        let invocation = self.invoker.invoke(&build_prompt(symptoms)).await?;

        let normalized = normalize(&invocation.text);
        let fell_back = normalized.is_fallback();
        let response = normalized.into_response();

        let query = NewQuery {
            symptoms: symptoms.to_string(),
            response: response.clone(),
            provider: invocation.provider.clone(),
            session_id,
        };

        let record_id = match self.store.append(query).await {
            Ok(id) => Some(id),
            Err(e) => match self.persistence {
                PersistencePolicy::Strict => return Err(e.into()),
                PersistencePolicy::BestEffort => {
                    error!(error = %e, "Failed to store analysis, returning it anyway");
                    None
                }
            },
        };

        info!(
            provider = %invocation.provider,
            attempts = invocation.attempts,
            elapsed_ms = u64::try_from(invocation.elapsed.as_millis()).unwrap_or(u64::MAX),
            fell_back,
            record_id,
            "Analysis complete"
        );

        Ok(Analysis {
            response,
            provider: invocation.provider,
            record_id,
            timestamp: Utc::now(),
            fell_back,
        })
    }

    /// Effective page size for a requested history limit
    ///
    /// Absent, zero or negative requests get the default; anything larger
    /// than the maximum is capped.
    #[must_use]
    pub fn resolve_history_limit(&self, requested: Option<i64>) -> usize {
        match requested {
            Some(n) if n > 0 => usize::try_from(n)
                .unwrap_or(usize::MAX)
                .min(self.limits.max_history_limit),
            _ => self.limits.default_history_limit,
        }
    }

    /// Recent records, newest first
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] if the read fails.
    pub async fn history(&self, requested: Option<i64>) -> Result<Vec<QueryRecord>, PipelineError> {
        let limit = self.resolve_history_limit(requested);
        Ok(self.store.recent(limit).await?)
    }

    /// Configured backend families
    #[must_use]
    pub fn providers(&self) -> Vec<String> {
        self.invoker.providers()
    }
}

/// Parse a history `limit` parameter the lenient way
///
/// Leading whitespace, an optional sign and the leading run of digits are
/// used; anything after is ignored. Returns `None` when there are no digits.
#[must_use]
pub fn parse_limit_param(raw: &str) -> Option<i64> {
    let s = raw.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }

    let value = digits[..end].parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -value } else { value })
}
