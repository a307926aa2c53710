//! LLM Backend Integration
//!
//! This module provides abstracted access to generative-text providers
//! through a common trait interface.
//!
//! # Available Backends
//!
//! - **Gemini**: Google Generative Language API (default)
//!
//! # Usage
//!
//! ```ignore
//! use checker_core::backend::{GeminiBackend, LlmBackend, LlmRequest};
//!
//! let backend = GeminiBackend::new(api_key, DEFAULT_GEMINI_BASE_URL);
//! let request = LlmRequest::new("Hello!", "gemini-1.5-flash");
//! let response = backend.send(&request).await?;
//! ```

mod gemini;
mod traits;

pub use gemini::{GeminiBackend, DEFAULT_GEMINI_BASE_URL};
pub use traits::{BackendError, LlmBackend, LlmRequest, LlmResponse};
