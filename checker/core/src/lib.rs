//! Checker Core - Resilient Symptom Query Pipeline
//!
//! This crate holds everything the symptom checker does apart from speaking
//! HTTP: it takes a free-text symptom description, asks a generative model
//! for an educational analysis, coerces the reply into a fixed schema and
//! stores the exchange.
//!
//! # Architecture
//!
//! ```text
//!  symptoms ──► QueryPipeline ──validate──► ModelInvoker ──► LlmBackend (Gemini)
//!                    │                           │  candidate 1, 2, 3 ...
//!                    │                      raw reply text
//!                    │                           ▼
//!                    │                   normalize() ──► StructuredResponse
//!                    │                           │
//!                    └──────────────────► QueryStore (SQLite) ◄── history()
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: LLM backend abstraction and the Gemini client
//! - [`invoker`]: Ordered model fallback with per-call timeouts
//! - [`normalizer`]: Best-effort extraction of the structured reply
//! - [`response`]: The structured response schema
//! - [`store`]: Append-only, time-ordered persistence
//! - [`pipeline`]: Request orchestration
//! - [`config`]: Layered configuration (file, environment, CLI)
//!
//! # No HTTP Server Dependencies
//!
//! The HTTP surface lives in `checker-daemon`; this crate can be driven from
//! tests or any other front end.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod config;
pub mod invoker;
pub mod normalizer;
pub mod pipeline;
pub mod response;
pub mod store;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Backend exports
pub use backend::{BackendError, GeminiBackend, LlmBackend, LlmRequest, LlmResponse};

// Pipeline exports
pub use invoker::{
    build_prompt, AttemptFailure, CandidateChain, ChainError, GenerationParams, InvokeError,
    Invocation, ModelInvoker,
};
pub use normalizer::{normalize, FallbackReason, Normalized, FALLBACK_NOTE};
pub use pipeline::{
    parse_limit_param, Analysis, PersistencePolicy, PipelineError, QueryPipeline, ValidationError,
};
pub use response::{Guidance, StructuredResponse};
pub use store::{DatabaseLocation, NewQuery, QueryRecord, QueryStore, SqliteQueryStore, StoreError};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, CheckerConfig, CheckerToml,
    ConfigError, ConfigOverrides, ConfigSource,
};
