//! Adapters from the service's two response shapes into [`EvaluationResult`].

use super::{EvaluationError, EvaluationResult};
use serde::Deserialize;

/// Structured Messages API response.
#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    /// Ordered content blocks.
    pub content: Vec<ContentBlock>,
    /// Why generation stopped (`end_turn`, `max_tokens`, ...).
    #[serde(default)]
    pub stop_reason: Option<String>,
}

/// One content block of a Messages response.
#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    /// Block kind; only `text` blocks carry evaluation text.
    #[serde(rename = "type")]
    pub kind: String,
    /// Text payload for `text` blocks.
    #[serde(default)]
    pub text: Option<String>,
}

/// Older Text Completions API response.
#[derive(Debug, Deserialize)]
pub struct CompletionResponse {
    /// Generated text.
    pub completion: String,
    /// Why generation stopped.
    #[serde(default)]
    pub stop_reason: Option<String>,
}

/// Error envelope returned with non-success statuses.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub(crate) error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorDetail {
    #[serde(rename = "type", default)]
    pub(crate) kind: Option<String>,
    pub(crate) message: String,
}

/// Concatenate the `text` blocks of a Messages response in order.
pub fn from_messages_response(
    response: MessagesResponse,
) -> Result<EvaluationResult, EvaluationError> {
    if response.stop_reason.as_deref() == Some("max_tokens") {
        tracing::warn!("Evaluation stopped at the output token limit");
    }
    let text: String = response
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text)
        .collect();
    non_empty(text)
}

/// Take the `completion` field of a Text Completions response.
pub fn from_completion_response(
    response: CompletionResponse,
) -> Result<EvaluationResult, EvaluationError> {
    if response.stop_reason.as_deref() == Some("max_tokens") {
        tracing::warn!("Evaluation stopped at the output token limit");
    }
    non_empty(response.completion)
}

fn non_empty(text: String) -> Result<EvaluationResult, EvaluationError> {
    if text.trim().is_empty() {
        return Err(EvaluationError::InvalidResponse(
            "response contained no text".into(),
        ));
    }
    Ok(EvaluationResult::new(text))
}
