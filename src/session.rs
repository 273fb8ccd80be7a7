//! Session-scoped result storage, rendering and export.
//!
//! A [`SessionContext`] is owned by the caller (the CLI run, or one HTTP session) and holds the
//! most recent evaluation. The HTTP surface keeps one context per session identifier inside a
//! [`SessionStore`]; nothing is shared across sessions.

use crate::evaluation::EvaluationResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use time::{Date, OffsetDateTime};
use tokio::sync::Mutex;

/// Message shown when a session has no evaluation yet.
pub const EMPTY_RESULT_MESSAGE: &str =
    "No analysis results yet. Please upload documents and run analysis.";

/// Per-session state holding the latest evaluation.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    result: Option<EvaluationResult>,
}

impl SessionContext {
    /// Create an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored evaluation.
    pub fn store(&mut self, result: EvaluationResult) {
        self.result = Some(result);
    }

    /// Latest evaluation, if any.
    pub fn result(&self) -> Option<&EvaluationResult> {
        self.result.as_ref()
    }

    /// Drop the stored evaluation.
    pub fn clear(&mut self) {
        self.result = None;
    }
}

/// What the results view shows for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RenderedView {
    /// Nothing to show yet.
    Empty {
        /// Guidance for the user.
        message: String,
    },
    /// Markdown evaluation, verbatim.
    Ready {
        /// Evaluation text as returned by the model.
        markdown: String,
    },
}

/// Render a session's results view.
pub fn render(session: &SessionContext) -> RenderedView {
    match session.result() {
        Some(result) => RenderedView::Ready {
            markdown: result.as_str().to_string(),
        },
        None => RenderedView::Empty {
            message: EMPTY_RESULT_MESSAGE.to_string(),
        },
    }
}

/// Download flavor for an evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum ExportFormat {
    /// Plain text, `.txt`.
    #[default]
    #[serde(rename = "txt", alias = "text")]
    Text,
    /// Markdown, `.md`.
    #[serde(rename = "md", alias = "markdown")]
    Markdown,
}

impl ExportFormat {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Markdown => "md",
        }
    }

    /// MIME type for the download.
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Text => "text/plain",
            Self::Markdown => "text/markdown",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "txt" | "text" => Ok(Self::Text),
            "md" | "markdown" => Ok(Self::Markdown),
            other => Err(format!("unknown export format '{other}' (expected txt or md)")),
        }
    }
}

/// File offered for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    /// `franchise-evaluation-YYYY-MM-DD.<ext>`
    pub file_name: String,
    /// MIME type matching the format.
    pub mime_type: &'static str,
    /// Evaluation text, unchanged.
    pub body: String,
}

/// Current UTC date used to stamp export file names.
pub fn today() -> Date {
    OffsetDateTime::now_utc().date()
}

/// Dated export file name.
pub fn export_file_name(format: ExportFormat, date: Date) -> String {
    format!(
        "franchise-evaluation-{:04}-{:02}-{:02}.{}",
        date.year(),
        u8::from(date.month()),
        date.day(),
        format.extension()
    )
}

/// Package the session's evaluation for download, or `None` when there is nothing to export.
pub fn export(session: &SessionContext, format: ExportFormat, date: Date) -> Option<ExportFile> {
    session.result().map(|result| ExportFile {
        file_name: export_file_name(format, date),
        mime_type: format.mime_type(),
        body: result.as_str().to_string(),
    })
}

/// Isolated session contexts keyed by session identifier.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, SessionContext>>,
}

impl SessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh session identifier.
    pub fn new_session_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Store a result for one session, replacing its previous result.
    pub async fn store(&self, session_id: &str, result: EvaluationResult) {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(session_id.to_string())
            .or_default()
            .store(result);
    }

    /// Snapshot of one session's context; unknown sessions are empty.
    pub async fn snapshot(&self, session_id: &str) -> SessionContext {
        let sessions = self.sessions.lock().await;
        sessions.get(session_id).cloned().unwrap_or_default()
    }
}
