//! Checker Daemon
//!
//! HTTP surface for the symptom checker pipeline:
//!
//! - `POST /api/symptoms`: analyze a symptom description
//! - `GET /api/history?limit=N`: recent analyses, newest first
//! - `GET /api/providers`: configured backend families
//! - `GET /health`: liveness
//!
//! The binary in `main.rs` wires configuration, the Gemini backend and the
//! SQLite store together; this library exposes the router so tests can drive
//! it in-process.

#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod routes;
pub mod server;

pub use routes::{ApiError, ERROR_SAFETY_NOTICE, SAFETY_NOTICE};
pub use server::{router, serve, shutdown_signal, AppState};
