//! Analysis service coordinating extraction, rubric resolution, prompt assembly and the
//! evaluation call.
//!
//! One `analyze` call walks the whole pipeline in order and issues at most one outbound
//! request. The credential is checked before anything else, so a disabled service never
//! touches the documents or the network. Extraction is CPU-bound and runs on the blocking
//! pool; progress events are forwarded back to the caller as each document finishes.

use crate::{
    config::{Config, ConfigError},
    evaluation::{
        AnthropicClient, ClaudeModel, EvaluationClient, EvaluationError, EvaluationRequest,
        EvaluationResult,
    },
    extraction::{DocumentExtractor, ExtractedText, ExtractionProgress, UploadedDocument},
    metrics::{AnalysisMetrics, MetricsSnapshot},
    prompt::{AssembledPrompt, DocumentSet, assemble_prompt},
    rubric::{EvaluationFramework, RubricSource, framework_for_display, resolve_rubric},
    session::SessionContext,
};
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors that stop an analysis. Extraction and rubric problems never appear here.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Analysis is disabled by configuration (missing credential).
    #[error("{0}")]
    Config(#[from] ConfigError),
    /// Nothing was uploaded.
    #[error("Please upload at least one franchise document")]
    NoDocuments,
    /// Outbound call failed; no result was stored.
    #[error("Error calling Claude API: {0}")]
    Evaluation(#[from] EvaluationError),
    /// The blocking extraction task panicked or was cancelled.
    #[error("Document extraction aborted: {0}")]
    Extraction(#[from] tokio::task::JoinError),
}

/// Inputs for one analysis run.
#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest {
    /// Uploaded proposal documents, in upload order.
    pub documents: Vec<UploadedDocument>,
    /// Optional rubric text replacing the default.
    pub rubric_override: Option<String>,
    /// Model override; the configured default applies when `None`.
    pub model: Option<ClaudeModel>,
}

/// Coarse pipeline stages, mirroring the progress bar of the upload view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStage {
    /// Documents are being extracted and the prompt assembled.
    Preparing,
    /// Waiting on the text-generation service.
    Evaluating,
    /// Result received.
    Complete,
}

impl AnalysisStage {
    /// Completion percentage shown for the stage.
    pub fn percent(self) -> u8 {
        match self {
            Self::Preparing => 10,
            Self::Evaluating => 30,
            Self::Complete => 100,
        }
    }

    /// Status line shown for the stage.
    pub fn message(self) -> &'static str {
        match self {
            Self::Preparing => "Preparing documents for analysis...",
            Self::Evaluating => "Analyzing with Claude API...",
            Self::Complete => "Analysis complete!",
        }
    }
}

/// Progress notification for UI feedback; not part of the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisProgress {
    /// Pipeline moved to a new stage.
    Stage(AnalysisStage),
    /// One document finished extraction.
    Document(ExtractionProgress),
}

/// Everything produced by a successful run.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    /// Evaluation text returned by the model.
    pub result: EvaluationResult,
    /// Extracted texts in upload order, markers included.
    pub extracted: Vec<ExtractedText>,
    /// Where the rubric came from.
    pub rubric_source: RubricSource,
    /// Non-blocking rubric warning, if the fallback was used.
    pub rubric_warning: Option<String>,
    /// Model that produced the result.
    pub model: ClaudeModel,
    /// Size of the prompt that was sent.
    pub prompt_bytes: usize,
}

/// Prompt assembled without calling the service.
#[derive(Debug, Clone)]
pub struct PromptPreview {
    /// Assembled prompt.
    pub prompt: AssembledPrompt,
    /// Extracted texts in upload order.
    pub extracted: Vec<ExtractedText>,
    /// Where the rubric came from.
    pub rubric_source: RubricSource,
    /// Non-blocking rubric warning.
    pub rubric_warning: Option<String>,
}

/// Whether analysis can run, for gating the analyze action.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisStatus {
    /// `false` when the credential is missing.
    pub analysis_enabled: bool,
    /// Diagnostic shown when disabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Model used when the caller does not choose one.
    pub default_model: ClaudeModel,
}

/// Owns the pipeline components; construct once and share through an `Arc`.
pub struct AnalysisService {
    extractor: Arc<DocumentExtractor>,
    client: Option<Box<dyn EvaluationClient>>,
    default_model: ClaudeModel,
    rubric_path: Option<PathBuf>,
    metrics: AnalysisMetrics,
}

/// Abstraction over the analysis pipeline used by the HTTP surface.
#[async_trait]
pub trait AnalysisApi: Send + Sync {
    /// Report whether the analyze action is enabled.
    fn status(&self) -> AnalysisStatus;

    /// Run one analysis.
    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisOutcome, AnalysisError>;

    /// Framework listing for the framework view, with a fallback warning.
    fn framework(&self) -> (EvaluationFramework, Option<String>);

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl AnalysisService {
    /// Build the service from configuration. A missing credential yields a disabled service,
    /// not an error.
    pub fn from_config(config: &Config) -> Result<Self, AnalysisError> {
        let client: Option<Box<dyn EvaluationClient>> = match AnthropicClient::from_config(config)
        {
            Some(client) => Some(Box::new(client?)),
            None => {
                tracing::warn!("{}", ConfigError::MissingCredential);
                None
            }
        };
        Ok(Self::new(
            DocumentExtractor::new(),
            client,
            config.default_model,
            config.rubric_path.clone(),
        ))
    }

    /// Build the service from explicit components.
    pub fn new(
        extractor: DocumentExtractor,
        client: Option<Box<dyn EvaluationClient>>,
        default_model: ClaudeModel,
        rubric_path: Option<PathBuf>,
    ) -> Self {
        Self {
            extractor: Arc::new(extractor),
            client,
            default_model,
            rubric_path,
            metrics: AnalysisMetrics::new(),
        }
    }

    /// Whether an evaluation client is available.
    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Diagnostic explaining why analysis is disabled.
    pub fn disabled_reason(&self) -> Option<String> {
        (!self.is_enabled()).then(|| ConfigError::MissingCredential.to_string())
    }

    /// Extract and assemble without a credential or a network call.
    pub fn preview_prompt(
        &self,
        documents: &[UploadedDocument],
        rubric_override: Option<&str>,
        progress: &mut (dyn FnMut(AnalysisProgress) + Send),
    ) -> PromptPreview {
        progress(AnalysisProgress::Stage(AnalysisStage::Preparing));
        let extracted = self
            .extractor
            .extract_all(documents, &mut |event| progress(AnalysisProgress::Document(event)));
        self.build_prompt(extracted, rubric_override)
    }

    async fn extract_off_runtime(
        &self,
        documents: Vec<UploadedDocument>,
        progress: &mut (dyn FnMut(AnalysisProgress) + Send),
    ) -> Result<Vec<ExtractedText>, AnalysisError> {
        let extractor = Arc::clone(&self.extractor);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let task = tokio::task::spawn_blocking(move || {
            extractor.extract_all(&documents, &mut |event| {
                // Only fails once the receiver is gone.
                let _ = events_tx.send(event);
            })
        });
        while let Some(event) = events_rx.recv().await {
            progress(AnalysisProgress::Document(event));
        }
        let extracted = task.await.inspect_err(|error| {
            tracing::error!(error = %error, "Extraction task failed");
        })?;
        Ok(extracted)
    }

    fn build_prompt(
        &self,
        extracted: Vec<ExtractedText>,
        rubric_override: Option<&str>,
    ) -> PromptPreview {
        let failures = extracted.iter().filter(|text| text.is_error_marker()).count();
        self.metrics
            .record_extraction(extracted.len() as u64, failures as u64);

        let rubric = resolve_rubric(rubric_override, self.rubric_path.as_deref());
        if let Some(warning) = &rubric.warning {
            tracing::warn!(warning = %warning, "Rubric fallback in use");
        }

        let document_set: DocumentSet = extracted.iter().cloned().collect();
        let prompt = assemble_prompt(&document_set, &rubric.document);

        PromptPreview {
            prompt,
            extracted,
            rubric_source: rubric.source,
            rubric_warning: rubric.warning,
        }
    }

    /// Run the full pipeline: extract, resolve rubric, assemble, evaluate.
    pub async fn analyze(
        &self,
        request: AnalysisRequest,
        progress: &mut (dyn FnMut(AnalysisProgress) + Send),
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let client = self.client.as_deref().ok_or(ConfigError::MissingCredential)?;
        let AnalysisRequest {
            documents,
            rubric_override,
            model,
        } = request;
        if documents.is_empty() {
            return Err(AnalysisError::NoDocuments);
        }
        let model = model.unwrap_or(self.default_model);
        tracing::info!(documents = documents.len(), model = %model, "Starting analysis");

        progress(AnalysisProgress::Stage(AnalysisStage::Preparing));
        let extracted = self.extract_off_runtime(documents, progress).await?;
        let PromptPreview {
            prompt,
            extracted,
            rubric_source,
            rubric_warning,
        } = self.build_prompt(extracted, rubric_override.as_deref());
        let prompt_bytes = prompt.len();

        progress(AnalysisProgress::Stage(AnalysisStage::Evaluating));
        let outcome = client
            .evaluate(EvaluationRequest {
                prompt: prompt.into_string(),
                model,
            })
            .await;
        self.metrics.record_analysis(outcome.is_ok());
        let result = outcome.inspect_err(|error| {
            tracing::warn!(error = %error, "Evaluation call failed");
        })?;

        progress(AnalysisProgress::Stage(AnalysisStage::Complete));
        tracing::info!(chars = result.as_str().len(), "Analysis complete");
        Ok(AnalysisOutcome {
            result,
            extracted,
            rubric_source,
            rubric_warning,
            model,
            prompt_bytes,
        })
    }

    /// Run an analysis and store its result in `session` on success. A failure leaves the
    /// previous result in place.
    pub async fn analyze_into(
        &self,
        session: &mut SessionContext,
        request: AnalysisRequest,
        progress: &mut (dyn FnMut(AnalysisProgress) + Send),
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let outcome = self.analyze(request, progress).await?;
        session.store(outcome.result.clone());
        Ok(outcome)
    }

    /// Return the current analysis metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[async_trait]
impl AnalysisApi for AnalysisService {
    fn status(&self) -> AnalysisStatus {
        AnalysisStatus {
            analysis_enabled: self.is_enabled(),
            message: self.disabled_reason(),
            default_model: self.default_model,
        }
    }

    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisOutcome, AnalysisError> {
        AnalysisService::analyze(self, request, &mut |event| {
            if let AnalysisProgress::Stage(stage) = event {
                tracing::debug!(percent = stage.percent(), "{}", stage.message());
            }
        })
        .await
    }

    fn framework(&self) -> (EvaluationFramework, Option<String>) {
        framework_for_display(self.rubric_path.as_deref())
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        AnalysisService::metrics_snapshot(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::{ExtractionError, FormatExtractor, WordTextExtractor};
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    #[derive(Clone, Default)]
    struct RecordingClient {
        prompts: Arc<Mutex<Vec<(String, ClaudeModel)>>>,
        fail: bool,
    }

    #[async_trait]
    impl EvaluationClient for RecordingClient {
        async fn evaluate(
            &self,
            request: EvaluationRequest,
        ) -> Result<EvaluationResult, EvaluationError> {
            self.prompts
                .lock()
                .expect("lock")
                .push((request.prompt, request.model));
            if self.fail {
                Err(EvaluationError::RateLimited("slow down".into()))
            } else {
                Ok(EvaluationResult::new("## Overall Rating: PROCEED WITH CAUTION"))
            }
        }
    }

    struct BrokenPdf;

    impl FormatExtractor for BrokenPdf {
        fn extract(&self, _bytes: &[u8]) -> Result<String, ExtractionError> {
            Err(ExtractionError::Pdf("unexpected end of file".into()))
        }
    }

    fn service(client: Option<RecordingClient>) -> AnalysisService {
        AnalysisService::new(
            DocumentExtractor::with_strategies(Box::new(BrokenPdf), Box::new(WordTextExtractor)),
            client.map(|c| Box::new(c) as Box<dyn EvaluationClient>),
            ClaudeModel::Sonnet37,
            None,
        )
    }

    fn request(documents: Vec<UploadedDocument>) -> AnalysisRequest {
        AnalysisRequest {
            documents,
            ..AnalysisRequest::default()
        }
    }

    #[tokio::test]
    async fn missing_credential_rejects_before_extraction() {
        let service = service(None);
        assert!(!service.is_enabled());
        assert!(service.disabled_reason().expect("reason").contains("ANTHROPIC_API_KEY"));

        let mut events = Vec::new();
        let error = service
            .analyze(
                request(vec![UploadedDocument::new("a.txt", "Hello")]),
                &mut |event| events.push(event),
            )
            .await
            .expect_err("disabled");
        assert!(matches!(error, AnalysisError::Config(ConfigError::MissingCredential)));
        assert!(events.is_empty());
        assert_eq!(service.metrics_snapshot().documents_extracted, 0);
    }

    #[tokio::test]
    async fn empty_upload_is_rejected() {
        let client = RecordingClient::default();
        let service = service(Some(client.clone()));
        let error = service
            .analyze(request(Vec::new()), &mut |_| {})
            .await
            .expect_err("no documents");
        assert!(matches!(error, AnalysisError::NoDocuments));
        assert!(client.prompts.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn failed_pdf_does_not_abort_the_batch() {
        let client = RecordingClient::default();
        let service = service(Some(client.clone()));
        let mut events = Vec::new();
        let outcome = service
            .analyze(
                request(vec![
                    UploadedDocument::new("deck.pdf", vec![0x25, 0x50]),
                    UploadedDocument::new("plan.txt", "Growth plan"),
                ]),
                &mut |event| events.push(event),
            )
            .await
            .expect("analysis completes");

        assert_eq!(
            outcome.extracted[0].content,
            "[Error extracting text from PDF: unexpected end of file]"
        );
        assert_eq!(outcome.extracted[1].content, "Growth plan");
        assert_eq!(outcome.result.as_str(), "## Overall Rating: PROCEED WITH CAUTION");
        assert_eq!(outcome.rubric_source, RubricSource::Default);

        let prompts = client.prompts.lock().expect("lock");
        assert_eq!(prompts.len(), 1);
        let (prompt, model) = &prompts[0];
        assert_eq!(*model, ClaudeModel::Sonnet37);
        assert!(prompt.contains("<source>deck.pdf</source>"));
        assert!(prompt.contains("<document_content>Growth plan</document_content>"));
        assert_eq!(outcome.prompt_bytes, prompt.len());

        assert_eq!(events.first(), Some(&AnalysisProgress::Stage(AnalysisStage::Preparing)));
        assert_eq!(events.last(), Some(&AnalysisProgress::Stage(AnalysisStage::Complete)));
        let documents = events
            .iter()
            .filter(|event| matches!(event, AnalysisProgress::Document(_)))
            .count();
        assert_eq!(documents, 2);

        let snapshot = service.metrics_snapshot();
        assert_eq!(snapshot.documents_extracted, 2);
        assert_eq!(snapshot.extraction_failures, 1);
        assert_eq!(snapshot.analyses_completed, 1);
    }

    #[tokio::test]
    async fn model_and_rubric_overrides_are_forwarded() {
        let client = RecordingClient::default();
        let service = service(Some(client.clone()));
        let outcome = service
            .analyze(
                AnalysisRequest {
                    documents: vec![UploadedDocument::new("a.md", "A")],
                    rubric_override: Some("Custom heuristics".into()),
                    model: Some(ClaudeModel::Opus3),
                },
                &mut |_| {},
            )
            .await
            .expect("analysis");
        assert_eq!(outcome.model, ClaudeModel::Opus3);
        assert_eq!(outcome.rubric_source, RubricSource::Override);

        let prompts = client.prompts.lock().expect("lock");
        assert!(prompts[0].0.contains("Here is a heuristics model:\nCustom heuristics\n"));
        assert_eq!(prompts[0].1, ClaudeModel::Opus3);
    }

    #[tokio::test]
    async fn failed_call_keeps_previous_session_result() {
        let service = service(Some(RecordingClient {
            fail: true,
            ..RecordingClient::default()
        }));
        let mut session = SessionContext::new();
        session.store(EvaluationResult::new("previous"));

        let error = service
            .analyze_into(
                &mut session,
                request(vec![UploadedDocument::new("a.txt", "A")]),
                &mut |_| {},
            )
            .await
            .expect_err("rate limited");
        assert_eq!(error.to_string(), "Error calling Claude API: rate limited: slow down");
        assert_eq!(session.result().map(|r| r.as_str()), Some("previous"));
        assert_eq!(service.metrics_snapshot().analyses_failed, 1);
    }

    #[tokio::test]
    async fn successful_call_overwrites_session_result() {
        let service = service(Some(RecordingClient::default()));
        let mut session = SessionContext::new();
        session.store(EvaluationResult::new("previous"));
        service
            .analyze_into(
                &mut session,
                request(vec![UploadedDocument::new("a.txt", "A")]),
                &mut |_| {},
            )
            .await
            .expect("analysis");
        assert_eq!(
            session.result().map(|r| r.as_str()),
            Some("## Overall Rating: PROCEED WITH CAUTION")
        );
    }

    #[test]
    fn preview_works_without_credential_and_reports_fallback() {
        let service = AnalysisService::new(
            DocumentExtractor::new(),
            None,
            ClaudeModel::default(),
            Some(PathBuf::from("/nonexistent/rubric.json")),
        );
        let preview = service.preview_prompt(
            &[UploadedDocument::new("a.txt", "Hello"), UploadedDocument::new("b.md", "World")],
            None,
            &mut |_| {},
        );
        assert_eq!(preview.rubric_source, RubricSource::Fallback);
        assert!(preview.rubric_warning.is_some());
        assert!(preview.prompt.as_str().contains("<source>a.txt</source>"));
        assert!(preview.prompt.as_str().contains("<source>b.md</source>"));
    }

    #[test]
    fn status_reflects_credential() {
        let disabled = service(None);
        let status = AnalysisApi::status(&disabled);
        assert!(!status.analysis_enabled);
        assert!(status.message.is_some());

        let enabled = service(Some(RecordingClient::default()));
        let status = AnalysisApi::status(&enabled);
        assert!(status.analysis_enabled);
        assert!(status.message.is_none());
    }

    struct SlowPdf;

    impl FormatExtractor for SlowPdf {
        fn extract(&self, _bytes: &[u8]) -> Result<String, ExtractionError> {
            std::thread::sleep(Duration::from_millis(300));
            Ok("Slow deck".into())
        }
    }

    #[tokio::test]
    async fn extraction_leaves_the_runtime_free() {
        let service = AnalysisService::new(
            DocumentExtractor::with_strategies(Box::new(SlowPdf), Box::new(WordTextExtractor)),
            Some(Box::new(RecordingClient::default())),
            ClaudeModel::Sonnet37,
            None,
        );
        let ticker = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Instant::now()
        };
        let analysis = async {
            let mut documents = 0;
            service
                .analyze(
                    request(vec![UploadedDocument::new("deck.pdf", vec![0x25, 0x50])]),
                    &mut |event| {
                        if matches!(event, AnalysisProgress::Document(_)) {
                            documents += 1;
                        }
                    },
                )
                .await
                .expect("analysis");
            (Instant::now(), documents)
        };

        // Single-threaded runtime: the timer can only fire first if extraction yields.
        let (ticked, (finished, documents)) = tokio::join!(ticker, analysis);
        assert!(ticked < finished);
        assert_eq!(documents, 1);
    }
}
