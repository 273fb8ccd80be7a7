#![deny(missing_docs)]

//! Core library for the franchise proposal evaluator.

/// Analysis pipeline service tying extraction, rubric, prompt and evaluation together.
pub mod analysis;
/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Outbound evaluation client and response adapters.
pub mod evaluation;
/// Text extraction from uploaded documents.
pub mod extraction;
/// Structured logging and tracing setup.
pub mod logging;
/// Analysis metrics helpers.
pub mod metrics;
/// Evaluation prompt assembly.
pub mod prompt;
/// Rubric loading and resolution.
pub mod rubric;
/// Per-session result storage, rendering and export.
pub mod session;
