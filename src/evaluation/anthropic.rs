use super::response::{
    CompletionResponse, ErrorEnvelope, MessagesResponse, from_completion_response,
    from_messages_response,
};
use super::{
    ApiStyle, EvaluationClient, EvaluationError, EvaluationRequest, EvaluationResult,
    MAX_OUTPUT_TOKENS,
};
use crate::config::{ApiKey, Config};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use std::time::Duration;

const API_VERSION: &str = "2023-06-01";

/// HTTP client for the Anthropic text-generation API.
pub struct AnthropicClient {
    http: Client,
    base_url: String,
    api_key: ApiKey,
    style: ApiStyle,
}

impl AnthropicClient {
    /// Build a client for `base_url` speaking the given API style.
    pub fn new(
        base_url: impl Into<String>,
        api_key: ApiKey,
        style: ApiStyle,
        timeout: Duration,
    ) -> Result<Self, EvaluationError> {
        let http = Client::builder()
            .user_agent(concat!("franchise-eval/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|error| {
                EvaluationError::Transport(format!("failed to build HTTP client: {error}"))
            })?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key,
            style,
        })
    }

    /// Build a client from configuration, failing when no credential is present.
    pub fn from_config(config: &Config) -> Option<Result<Self, EvaluationError>> {
        let api_key = config.api_key.clone()?;
        Some(Self::new(
            config.api_base_url.clone(),
            api_key,
            config.api_style,
            config.request_timeout,
        ))
    }

    /// Which request/response shape this client speaks.
    pub fn api_style(&self) -> ApiStyle {
        self.style
    }

    fn endpoint(&self) -> String {
        let path = match self.style {
            ApiStyle::Messages => "/v1/messages",
            ApiStyle::Completions => "/v1/complete",
        };
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }

    fn payload(&self, request: &EvaluationRequest) -> Value {
        match self.style {
            ApiStyle::Messages => json!({
                "model": request.model.as_str(),
                "max_tokens": MAX_OUTPUT_TOKENS,
                "messages": [
                    { "role": "user", "content": request.prompt }
                ]
            }),
            ApiStyle::Completions => json!({
                "model": request.model.as_str(),
                "max_tokens_to_sample": MAX_OUTPUT_TOKENS,
                "prompt": format!("\n\nHuman: {}\n\nAssistant:", request.prompt)
            }),
        }
    }

    async fn decode(
        &self,
        response: reqwest::Response,
    ) -> Result<EvaluationResult, EvaluationError> {
        match self.style {
            ApiStyle::Messages => {
                let body: MessagesResponse = response.json().await.map_err(|error| {
                    EvaluationError::InvalidResponse(format!(
                        "failed to decode messages response: {error}"
                    ))
                })?;
                from_messages_response(body)
            }
            ApiStyle::Completions => {
                let body: CompletionResponse = response.json().await.map_err(|error| {
                    EvaluationError::InvalidResponse(format!(
                        "failed to decode completion response: {error}"
                    ))
                })?;
                from_completion_response(body)
            }
        }
    }
}

#[async_trait]
impl EvaluationClient for AnthropicClient {
    async fn evaluate(
        &self,
        request: EvaluationRequest,
    ) -> Result<EvaluationResult, EvaluationError> {
        tracing::info!(
            model = %request.model,
            style = ?self.style,
            prompt_bytes = request.prompt.len(),
            "Requesting evaluation"
        );

        let response = self
            .http
            .post(self.endpoint())
            .header("x-api-key", self.api_key.expose())
            .header("anthropic-version", API_VERSION)
            .json(&self.payload(&request))
            .send()
            .await
            .map_err(|error| {
                EvaluationError::Transport(format!("failed to reach {}: {error}", self.base_url))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let result = self.decode(response).await?;
        tracing::info!(chars = result.as_str().len(), "Evaluation received");
        Ok(result)
    }
}

fn status_error(status: StatusCode, body: &str) -> EvaluationError {
    let (kind, message) = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => (envelope.error.kind, envelope.error.message),
        Err(_) => (None, body.trim().to_string()),
    };
    tracing::warn!(%status, kind = ?kind, message = %message, "Evaluation request rejected");
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        EvaluationError::Authentication(message)
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        EvaluationError::RateLimited(message)
    } else {
        EvaluationError::Api {
            status: status.as_u16(),
            message,
        }
    }
}
