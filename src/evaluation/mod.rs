//! Outbound evaluation call to the hosted text-generation service.
//!
//! The pipeline sends exactly one request per analysis and never retries. Two historical
//! response shapes are understood (the structured Messages API and the older single-field
//! Text Completions API); [`response`] holds one adapter per shape and both produce the same
//! [`EvaluationResult`].

mod anthropic;
pub mod response;

pub use anthropic::AnthropicClient;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Output token budget requested for every evaluation.
pub const MAX_OUTPUT_TOKENS: u32 = 4000;

/// Errors surfaced by the evaluation call.
#[derive(Debug, Error)]
pub enum EvaluationError {
    /// Service rejected the credential.
    #[error("authentication failed: {0}")]
    Authentication(String),
    /// Service is throttling requests.
    #[error("rate limited: {0}")]
    RateLimited(String),
    /// Service returned another error status.
    #[error("service returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message from the service's error envelope, or the raw body.
        message: String,
    },
    /// Request never completed.
    #[error("request failed: {0}")]
    Transport(String),
    /// Response body did not match either known shape.
    #[error("malformed response: {0}")]
    InvalidResponse(String),
}

/// Model identifiers offered to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum ClaudeModel {
    /// `claude-3-7-sonnet-20250219`
    #[default]
    #[serde(rename = "claude-3-7-sonnet-20250219")]
    Sonnet37,
    /// `claude-3-5-sonnet-20240229`
    #[serde(rename = "claude-3-5-sonnet-20240229")]
    Sonnet35,
    /// `claude-3-opus-20240229`
    #[serde(rename = "claude-3-opus-20240229")]
    Opus3,
}

impl ClaudeModel {
    /// Every selectable model, default first.
    pub const ALL: [ClaudeModel; 3] = [Self::Sonnet37, Self::Sonnet35, Self::Opus3];

    /// Wire identifier.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sonnet37 => "claude-3-7-sonnet-20250219",
            Self::Sonnet35 => "claude-3-5-sonnet-20240229",
            Self::Opus3 => "claude-3-opus-20240229",
        }
    }
}

impl fmt::Display for ClaudeModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a model identifier is outside the offered set.
#[derive(Debug, Error)]
#[error("unknown model '{0}'")]
pub struct UnknownModel(pub String);

impl FromStr for ClaudeModel {
    type Err = UnknownModel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|model| model.as_str() == trimmed)
            .ok_or_else(|| UnknownModel(trimmed.to_string()))
    }
}

/// Request/response shape spoken by the configured service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiStyle {
    /// `POST /v1/messages`, content blocks in the response.
    #[default]
    Messages,
    /// `POST /v1/complete`, single `completion` field in the response.
    Completions,
}

/// Returned when `ANTHROPIC_API_STYLE` names neither supported shape.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown API style '{0}' (expected messages or completions)")]
pub struct UnknownApiStyle(pub String);

impl FromStr for ApiStyle {
    type Err = UnknownApiStyle;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "messages" => Ok(Self::Messages),
            "completions" | "complete" | "legacy" => Ok(Self::Completions),
            _ => Err(UnknownApiStyle(s.trim().to_string())),
        }
    }
}

/// Payload for one evaluation call.
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    /// Fully assembled prompt.
    pub prompt: String,
    /// Model to run.
    pub model: ClaudeModel,
}

/// Free-text evaluation returned by the model, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct EvaluationResult(String);

impl EvaluationResult {
    /// Wrap returned text.
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Borrow the evaluation text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EvaluationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Interface implemented by text-generation backends.
#[async_trait]
pub trait EvaluationClient: Send + Sync {
    /// Run one evaluation; errors are returned, never retried.
    async fn evaluate(
        &self,
        request: EvaluationRequest,
    ) -> Result<EvaluationResult, EvaluationError>;
}
