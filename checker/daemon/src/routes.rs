//! HTTP routes for the checker daemon
//!
//! Every error body carries a safety notice. Pipeline errors are turned into
//! status codes in exactly one place, [`ApiError`]'s `IntoResponse`.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::error;

use checker_core::{parse_limit_param, Analysis, PipelineError, QueryRecord, StructuredResponse};

use crate::server::AppState;

/// Attached to every successful analysis
pub const SAFETY_NOTICE: &str =
    "⚠️ This is educational information only. Always consult healthcare professionals for medical advice.";

/// Attached to every error body
pub const ERROR_SAFETY_NOTICE: &str = "⚠️ Please consult a healthcare professional directly.";

// ============================================================================
// Routers
// ============================================================================

/// `/api/*` routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/api/symptoms", post(analyze_symptoms))
        .route("/api/history", get(history))
        .route("/api/providers", get(providers))
}

/// Liveness route
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

// ============================================================================
// Errors
// ============================================================================

/// Failures surfaced to HTTP clients
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request was rejected before any work was done
    #[error("{0}")]
    InvalidInput(String),
    /// The analysis could not be produced or stored
    #[error("Failed to analyze symptoms: {0}")]
    AnalysisFailed(#[source] PipelineError),
    /// History could not be read
    #[error("Failed to fetch history: {0}")]
    HistoryFailed(#[source] PipelineError),
}

impl ApiError {
    /// Classify a pipeline error raised while analyzing
    #[must_use]
    pub fn from_analysis(err: PipelineError) -> Self {
        match err {
            PipelineError::Validation(e) => Self::InvalidInput(e.to_string()),
            other => Self::AnalysisFailed(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::InvalidInput(message) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": message, "safetyNotice": ERROR_SAFETY_NOTICE }),
            ),
            Self::AnalysisFailed(err) => {
                error!(error = %err, "Error analyzing symptoms");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "error": "Failed to analyze symptoms",
                        "message": err.to_string(),
                        "safetyNotice": ERROR_SAFETY_NOTICE,
                    }),
                )
            }
            Self::HistoryFailed(err) => {
                error!(error = %err, "Error fetching history");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "error": "Failed to fetch history",
                        "safetyNotice": ERROR_SAFETY_NOTICE,
                    }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Body of `POST /api/symptoms`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymptomRequest {
    /// Free-text description; missing counts as empty
    #[serde(default)]
    pub symptoms: Option<String>,
    /// Opaque grouping key
    #[serde(default)]
    pub session_id: Option<String>,
}

async fn analyze_symptoms(
    State(state): State<AppState>,
    body: Result<Json<SymptomRequest>, JsonRejection>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::InvalidInput(e.body_text()))?;
    let symptoms = request.symptoms.unwrap_or_default();

    let analysis = state
        .pipeline
        .analyze(&symptoms, request.session_id)
        .await
        .map_err(ApiError::from_analysis)?;

    Ok(Json(AnalysisResponse::new(analysis)))
}

/// Body of a successful `POST /api/symptoms`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    /// The structured record, fields inlined
    #[serde(flatten)]
    pub response: StructuredResponse,
    /// Completion time, RFC 3339 with milliseconds
    pub timestamp: String,
    /// `backend/model` label of the producer
    pub provider: String,
    /// Educational-use notice
    pub safety_notice: &'static str,
}

impl AnalysisResponse {
    /// Shape an analysis for the wire
    ///
    /// Backend-emitted extras that collide with envelope keys are dropped.
    #[must_use]
    pub fn new(analysis: Analysis) -> Self {
        let mut response = analysis.response;
        for key in ["timestamp", "provider", "safetyNotice"] {
            response.extra.remove(key);
        }

        Self {
            response,
            timestamp: analysis
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            provider: analysis.provider,
            safety_notice: SAFETY_NOTICE,
        }
    }
}

/// Query string of `GET /api/history`
///
/// Decoded as raw pairs so repeated or odd keys never reject the request.
#[derive(Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct HistoryParams(pub Vec<(String, String)>);

impl HistoryParams {
    /// First `limit` value, parsed leniently
    #[must_use]
    pub fn limit(&self) -> Option<i64> {
        self.0
            .iter()
            .find(|(key, _)| key == "limit")
            .and_then(|(_, value)| parse_limit_param(value))
    }
}

/// Body of `GET /api/history`
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    /// Records, newest first
    pub history: Vec<QueryRecord>,
    /// Number of records returned
    pub count: usize,
}

async fn history(
    State(state): State<AppState>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let requested = params.ok().and_then(|Query(params)| params.limit());
    let history = state
        .pipeline
        .history(requested)
        .await
        .map_err(ApiError::HistoryFailed)?;

    Ok(Json(HistoryResponse {
        count: history.len(),
        history,
    }))
}

/// Body of `GET /api/providers`
#[derive(Debug, Serialize)]
pub struct ProvidersResponse {
    /// Configured backend families
    pub providers: Vec<String>,
}

async fn providers(State(state): State<AppState>) -> Json<ProvidersResponse> {
    Json(ProvidersResponse {
        providers: state.pipeline.providers(),
    })
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "OK",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use checker_core::{InvokeError, ValidationError};

    #[test]
    fn test_validation_errors_are_bad_requests() {
        let err = ApiError::from_analysis(PipelineError::Validation(ValidationError::Empty));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_history_params_take_first_limit() {
        let params = HistoryParams(vec![
            ("limit".into(), "7".into()),
            ("limit".into(), "2".into()),
        ]);
        assert_eq!(params.limit(), Some(7));
        assert_eq!(HistoryParams::default().limit(), None);
    }

    #[test]
    fn test_invoke_errors_are_server_errors() {
        let err = ApiError::from_analysis(PipelineError::Invoke(InvokeError::ProviderUnavailable));
        assert!(matches!(err, ApiError::AnalysisFailed(_)));
        assert!(err.to_string().starts_with("Failed to analyze symptoms: No generative backend"));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
