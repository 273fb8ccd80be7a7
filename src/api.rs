//! HTTP surface for the evaluator.
//!
//! This module exposes a compact Axum router that stands in for the upload/analyze/results
//! views:
//!
//! - `GET /status` – Whether analysis is enabled (credential present), offered models and
//!   accepted file extensions.
//! - `GET /framework` – The evaluation framework's dimensions and criteria.
//! - `POST /analyze` – Upload base64-encoded documents (plus optional `rubric` and `model`),
//!   run one evaluation and store the result in the caller's session (`x-session-id`).
//!   Request bodies are not size-capped.
//! - `GET /result` – Render the caller's latest evaluation.
//! - `GET /result/download?format=txt|md` – Download the latest evaluation as a dated file.
//! - `GET /metrics` – Analysis counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.

use crate::analysis::{AnalysisApi, AnalysisError, AnalysisRequest};
use crate::config::ConfigError;
use crate::evaluation::ClaudeModel;
use crate::extraction::{ACCEPTED_EXTENSIONS, UploadedDocument};
use crate::metrics::MetricsSnapshot;
use crate::rubric::{Dimension, RubricSource};
use crate::session::{ExportFormat, RenderedView, SessionStore, export, render, today};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Header carrying the caller's session identifier.
pub const SESSION_HEADER: &str = "x-session-id";

struct AppState<S> {
    service: Arc<S>,
    sessions: Arc<SessionStore>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            sessions: Arc::clone(&self.sessions),
        }
    }
}

/// Build the HTTP router exposing the analysis surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: AnalysisApi + 'static,
{
    Router::new()
        .route("/status", get(get_status::<S>))
        .route("/framework", get(get_framework::<S>))
        .route("/analyze", post(analyze::<S>))
        .route("/result", get(get_result::<S>))
        .route("/result/download", get(download_result::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .layer(DefaultBodyLimit::disable())
        .with_state(AppState {
            service,
            sessions: Arc::new(SessionStore::new()),
        })
}

/// Response body for `GET /status`.
#[derive(Serialize)]
struct StatusResponse {
    analysis_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    default_model: ClaudeModel,
    models: Vec<ClaudeModel>,
    accepted_extensions: Vec<&'static str>,
}

async fn get_status<S>(State(state): State<AppState<S>>) -> Json<StatusResponse>
where
    S: AnalysisApi,
{
    let status = state.service.status();
    Json(StatusResponse {
        analysis_enabled: status.analysis_enabled,
        message: status.message,
        default_model: status.default_model,
        models: ClaudeModel::ALL.to_vec(),
        accepted_extensions: ACCEPTED_EXTENSIONS.to_vec(),
    })
}

/// Response body for `GET /framework`.
#[derive(Serialize)]
struct FrameworkResponse {
    dimensions: Vec<Dimension>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<String>,
}

async fn get_framework<S>(State(state): State<AppState<S>>) -> Json<FrameworkResponse>
where
    S: AnalysisApi,
{
    let (framework, warning) = state.service.framework();
    Json(FrameworkResponse {
        dimensions: framework.dimensions,
        warning,
    })
}

/// One uploaded file in a `POST /analyze` body.
#[derive(Deserialize)]
struct DocumentUpload {
    /// File name including extension; drives format detection.
    name: String,
    /// File contents, standard base64.
    content_base64: String,
}

/// Request body for `POST /analyze`.
#[derive(Deserialize)]
struct AnalyzeRequest {
    documents: Vec<DocumentUpload>,
    /// Optional rubric text replacing the default heuristics model.
    #[serde(default)]
    rubric: Option<String>,
    /// Optional model identifier from `GET /status`.
    #[serde(default)]
    model: Option<String>,
}

#[derive(Serialize)]
struct DocumentSummary {
    name: String,
    failed: bool,
}

/// Success response for `POST /analyze`.
#[derive(Serialize)]
struct AnalyzeResponse {
    session_id: String,
    model: ClaudeModel,
    documents: Vec<DocumentSummary>,
    rubric_source: RubricSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    rubric_warning: Option<String>,
}

/// Run one analysis and store the result in the caller's session.
///
/// A missing credential is rejected before the body is parsed.
async fn analyze<S>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError>
where
    S: AnalysisApi,
{
    if !state.service.status().analysis_enabled {
        return Err(AppError::Analysis(AnalysisError::Config(
            ConfigError::MissingCredential,
        )));
    }

    let AnalyzeRequest {
        documents,
        rubric,
        model,
    } = serde_json::from_slice(&body)
        .map_err(|error| AppError::BadRequest(format!("invalid request body: {error}")))?;
    let model = model
        .map(|value| value.parse::<ClaudeModel>())
        .transpose()
        .map_err(|error| AppError::BadRequest(error.to_string()))?;
    let documents = documents
        .into_iter()
        .map(|upload| {
            STANDARD
                .decode(upload.content_base64.trim())
                .map(|bytes| UploadedDocument::new(upload.name.clone(), bytes))
                .map_err(|error| {
                    AppError::BadRequest(format!("invalid base64 for {}: {error}", upload.name))
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let session_id = session_id(&headers).unwrap_or_else(SessionStore::new_session_id);
    let outcome = state
        .service
        .analyze(AnalysisRequest {
            documents,
            rubric_override: rubric,
            model,
        })
        .await?;
    state
        .sessions
        .store(&session_id, outcome.result.clone())
        .await;
    tracing::info!(
        session = %session_id,
        model = %outcome.model,
        documents = outcome.extracted.len(),
        "Analyze request completed"
    );

    let body = AnalyzeResponse {
        session_id: session_id.clone(),
        model: outcome.model,
        documents: outcome
            .extracted
            .iter()
            .map(|text| DocumentSummary {
                name: text.source_name.clone(),
                failed: text.is_error_marker(),
            })
            .collect(),
        rubric_source: outcome.rubric_source,
        rubric_warning: outcome.rubric_warning,
    };
    Ok(([(SESSION_HEADER, session_id)], Json(body)).into_response())
}

async fn get_result<S>(State(state): State<AppState<S>>, headers: HeaderMap) -> Json<RenderedView>
where
    S: AnalysisApi,
{
    let session = match session_id(&headers) {
        Some(id) => state.sessions.snapshot(&id).await,
        None => Default::default(),
    };
    Json(render(&session))
}

#[derive(Deserialize)]
struct DownloadQuery {
    #[serde(default)]
    format: Option<ExportFormat>,
}

/// Serve the caller's evaluation as a dated attachment.
async fn download_result<S>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, AppError>
where
    S: AnalysisApi,
{
    let session = match session_id(&headers) {
        Some(id) => state.sessions.snapshot(&id).await,
        None => Default::default(),
    };
    let format = query.format.unwrap_or_default();
    let file = export(&session, format, today())
        .ok_or_else(|| AppError::NotFound("No analysis results yet".into()))?;

    Ok((
        [
            (header::CONTENT_TYPE, file.mime_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file.file_name),
            ),
        ],
        file.body,
    )
        .into_response())
}

async fn get_metrics<S>(State(state): State<AppState<S>>) -> Json<MetricsSnapshot>
where
    S: AnalysisApi,
{
    Json(state.service.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "status",
                method: "GET",
                path: "/status",
                description: "Report whether analysis is enabled, the offered models, and accepted file extensions.",
                request_example: None,
            },
            CommandDescriptor {
                name: "framework",
                method: "GET",
                path: "/framework",
                description: "List the six evaluation dimensions and their criteria.",
                request_example: None,
            },
            CommandDescriptor {
                name: "analyze",
                method: "POST",
                path: "/analyze",
                description: "Extract uploaded documents, assemble the evaluation prompt, call the model once, and store the result in the x-session-id session.",
                request_example: Some(json!({
                    "documents": [
                        { "name": "proposal.txt", "content_base64": "SGVsbG8=" }
                    ],
                    "rubric": "optional rubric text",
                    "model": "claude-3-7-sonnet-20250219"
                })),
            },
            CommandDescriptor {
                name: "result",
                method: "GET",
                path: "/result",
                description: "Render the latest evaluation for the x-session-id session.",
                request_example: None,
            },
            CommandDescriptor {
                name: "download",
                method: "GET",
                path: "/result/download?format=txt|md",
                description: "Download the latest evaluation as franchise-evaluation-YYYY-MM-DD.txt or .md.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return analysis counters useful for observability dashboards.",
                request_example: None,
            },
        ],
    })
}

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

enum AppError {
    BadRequest(String),
    NotFound(String),
    Analysis(AnalysisError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message),
            Self::Analysis(error) => {
                let status = match &error {
                    AnalysisError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
                    AnalysisError::NoDocuments => StatusCode::BAD_REQUEST,
                    AnalysisError::Evaluation(_) => StatusCode::BAD_GATEWAY,
                    AnalysisError::Extraction(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, error.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<AnalysisError> for AppError {
    fn from(inner: AnalysisError) -> Self {
        Self::Analysis(inner)
    }
}
