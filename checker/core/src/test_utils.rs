//! Test Utilities
//!
//! Scripted doubles for exercising the pipeline without network or disk.
//! Available to this crate's tests and, through the `test-utils` feature, to
//! downstream test suites.
//!
//! # Usage
//!
//! ```ignore
//! use checker_core::test_utils::ScriptedBackend;
//!
//! let backend = ScriptedBackend::new()
//!     .fail("model-a", BackendError::RateLimited("quota".into()))
//!     .reply("model-b", "{...}");
//!
//! // After the test, verify which models were asked, in order
//! assert_eq!(backend.requested_models(), vec!["model-a", "model-b"]);
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::backend::{BackendError, LlmBackend, LlmRequest, LlmResponse};
use crate::store::{NewQuery, QueryRecord, QueryStore, StoreError};

// ============================================================================
// Scripted Backend
// ============================================================================

/// What a scripted model does when called
#[derive(Clone, Debug)]
pub enum ScriptedOutcome {
    /// Return this text
    Reply(String),
    /// Fail with this error
    Fail(BackendError),
    /// Never answer (until the caller gives up)
    Hang,
}

/// Captured request for test verification
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    /// Model that received the request
    pub model: String,
    /// The prompt sent to the model
    pub prompt: String,
    /// Requested temperature
    pub temperature: f32,
    /// Requested output cap
    pub max_tokens: u32,
}

/// Backend whose per-model behavior is fixed up front
///
/// Models without a script fail with [`BackendError::ModelNotFound`].
/// Clones share the request log.
#[derive(Clone, Debug, Default)]
pub struct ScriptedBackend {
    scripts: HashMap<String, ScriptedOutcome>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl ScriptedBackend {
    /// Create a backend with no scripted models
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script `model` to reply with `text`
    #[must_use]
    pub fn reply(mut self, model: &str, text: impl Into<String>) -> Self {
        self.scripts
            .insert(model.to_string(), ScriptedOutcome::Reply(text.into()));
        self
    }

    /// Script `model` to fail with `error`
    #[must_use]
    pub fn fail(mut self, model: &str, error: BackendError) -> Self {
        self.scripts
            .insert(model.to_string(), ScriptedOutcome::Fail(error));
        self
    }

    /// Script `model` to never answer
    #[must_use]
    pub fn hang(mut self, model: &str) -> Self {
        self.scripts.insert(model.to_string(), ScriptedOutcome::Hang);
        self
    }

    /// Models asked for, in call order
    #[must_use]
    pub fn requested_models(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.model.clone()).collect()
    }

    /// Full request log
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Total number of calls
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send(&self, request: &LlmRequest) -> Result<LlmResponse, BackendError> {
        self.requests.lock().push(RecordedRequest {
            model: request.model.clone(),
            prompt: request.prompt.clone(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        });

        match self.scripts.get(&request.model).cloned() {
            Some(ScriptedOutcome::Reply(content)) => Ok(LlmResponse {
                content,
                model: request.model.clone(),
                tokens_used: None,
                duration_ms: Some(0),
            }),
            Some(ScriptedOutcome::Fail(error)) => Err(error),
            Some(ScriptedOutcome::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(BackendError::Timeout(3_600_000))
            }
            None => Err(BackendError::ModelNotFound(request.model.clone())),
        }
    }
}

// ============================================================================
// Failing Store
// ============================================================================

/// Store whose writes always fail; reads return nothing
#[derive(Clone, Debug, Default)]
pub struct FailingStore {
    attempts: Arc<Mutex<usize>>,
}

impl FailingStore {
    /// Create a failing store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of append attempts seen
    #[must_use]
    pub fn append_attempts(&self) -> usize {
        *self.attempts.lock()
    }
}

#[async_trait]
impl QueryStore for FailingStore {
    async fn append(&self, _query: NewQuery) -> Result<i64, StoreError> {
        *self.attempts.lock() += 1;
        Err(StoreError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_READONLY),
            Some("attempt to write a readonly database".to_string()),
        )))
    }

    async fn recent(&self, _limit: usize) -> Result<Vec<QueryRecord>, StoreError> {
        Err(StoreError::Decode {
            id: 0,
            reason: "store unavailable".to_string(),
        })
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(0)
    }
}
