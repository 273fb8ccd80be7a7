use std::{io::Cursor, time::Duration};

use docx_rs::{Docx, Paragraph, Run};
use franchise_eval::{
    analysis::{AnalysisError, AnalysisProgress, AnalysisRequest, AnalysisService},
    config::{ApiKey, Config, ConfigError},
    evaluation::{ApiStyle, ClaudeModel},
    extraction::UploadedDocument,
    rubric::RubricSource,
    session::{ExportFormat, RenderedView, SessionContext, export, render},
};
use httpmock::{Method::POST, MockServer};
use serde_json::json;
use time::{Date, Month};

const EVALUATION: &str = "# Franchise Proposal Evaluation: Acme Burgers\n\n## Overall Rating: RECOMMENDED WITH CONDITIONS";

fn config(server: &MockServer, style: ApiStyle) -> Config {
    Config {
        api_key: ApiKey::new("sk-integration"),
        api_base_url: server.base_url(),
        api_style: style,
        request_timeout: Duration::from_secs(5),
        ..Config::default()
    }
}

fn docx_bytes(paragraphs: &[&str]) -> Vec<u8> {
    let mut docx = Docx::new();
    for text in paragraphs {
        docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(*text)));
    }
    let mut cursor = Cursor::new(Vec::new());
    docx.build().pack(&mut cursor).expect("pack docx");
    cursor.into_inner()
}

fn proposal() -> Vec<UploadedDocument> {
    vec![
        UploadedDocument::new("summary.txt", "Acme Burgers seeks 12 territories."),
        UploadedDocument::new("financials.pdf", b"%PDF-1.4 truncated".to_vec()),
        UploadedDocument::new(
            "operations.docx",
            docx_bytes(&["Training runs six weeks.", "Supply chain is centralized."]),
        ),
    ]
}

#[tokio::test]
async fn missing_credential_never_calls_the_service() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST);
            then.status(200);
        })
        .await;

    let config = Config {
        api_key: None,
        ..config(&server, ApiStyle::Messages)
    };
    let service = AnalysisService::from_config(&config).expect("service");
    assert!(!service.is_enabled());

    let mut session = SessionContext::new();
    let error = service
        .analyze_into(
            &mut session,
            AnalysisRequest {
                documents: proposal(),
                ..AnalysisRequest::default()
            },
            &mut |_| {},
        )
        .await
        .expect_err("disabled");

    assert!(matches!(
        error,
        AnalysisError::Config(ConfigError::MissingCredential)
    ));
    assert!(error.to_string().contains("ANTHROPIC_API_KEY"));
    assert_eq!(mock.hits_async().await, 0);
    assert!(session.result().is_none());
}

#[tokio::test]
async fn both_response_shapes_store_the_same_result() {
    let server = MockServer::start_async().await;
    let messages = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/messages")
                .header("x-api-key", "sk-integration")
                .body_contains("Acme Burgers seeks 12 territories.")
                .body_contains("Market Opportunity Assessment");
            then.status(200).json_body(json!({
                "content": [{ "type": "text", "text": EVALUATION }],
                "stop_reason": "end_turn"
            }));
        })
        .await;
    let completions = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/complete")
                .body_contains("Human:")
                .body_contains("Acme Burgers seeks 12 territories.");
            then.status(200).json_body(json!({
                "completion": EVALUATION,
                "stop_reason": "stop_sequence"
            }));
        })
        .await;

    let mut rendered = Vec::new();
    for style in [ApiStyle::Messages, ApiStyle::Completions] {
        let service = AnalysisService::from_config(&config(&server, style)).expect("service");
        let mut session = SessionContext::new();
        service
            .analyze_into(
                &mut session,
                AnalysisRequest {
                    documents: proposal(),
                    ..AnalysisRequest::default()
                },
                &mut |_| {},
            )
            .await
            .expect("analysis");
        rendered.push(render(&session));
    }

    messages.assert_async().await;
    completions.assert_async().await;
    assert_eq!(rendered[0], rendered[1]);
    assert_eq!(
        rendered[0],
        RenderedView::Ready {
            markdown: EVALUATION.into()
        }
    );
}

#[tokio::test]
async fn failed_pdf_is_reported_inline_and_analysis_completes() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/messages")
                .body_contains("<source>financials.pdf</source>")
                .body_contains("[Error extracting text from PDF:")
                .body_contains("Training runs six weeks.")
                .body_contains("claude-3-opus-20240229");
            then.status(200).json_body(json!({
                "content": [{ "type": "text", "text": EVALUATION }]
            }));
        })
        .await;

    let service =
        AnalysisService::from_config(&config(&server, ApiStyle::Messages)).expect("service");
    let mut session = SessionContext::new();
    let mut events = Vec::new();
    let outcome = service
        .analyze_into(
            &mut session,
            AnalysisRequest {
                documents: proposal(),
                rubric_override: None,
                model: Some(ClaudeModel::Opus3),
            },
            &mut |event| events.push(event),
        )
        .await
        .expect("analysis");

    mock.assert_async().await;
    assert_eq!(outcome.rubric_source, RubricSource::Default);
    let failed: Vec<_> = outcome
        .extracted
        .iter()
        .filter(|text| text.is_error_marker())
        .map(|text| text.source_name.as_str())
        .collect();
    assert_eq!(failed, vec!["financials.pdf"]);
    let document_events = events
        .iter()
        .filter(|event| matches!(event, AnalysisProgress::Document(_)))
        .count();
    assert_eq!(document_events, 3);

    let metrics = service.metrics_snapshot();
    assert_eq!(metrics.documents_extracted, 3);
    assert_eq!(metrics.extraction_failures, 1);
    assert_eq!(metrics.analyses_completed, 1);

    let date = Date::from_calendar_date(2025, Month::June, 1).expect("date");
    let file = export(&session, ExportFormat::Markdown, date).expect("export");
    assert_eq!(file.file_name, "franchise-evaluation-2025-06-01.md");
    assert_eq!(file.body, EVALUATION);
}

#[tokio::test]
async fn service_error_surfaces_and_keeps_previous_result() {
    let server = MockServer::start_async().await;
    let mut ok = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/messages");
            then.status(200).json_body(json!({
                "content": [{ "type": "text", "text": EVALUATION }]
            }));
        })
        .await;

    let service =
        AnalysisService::from_config(&config(&server, ApiStyle::Messages)).expect("service");
    let mut session = SessionContext::new();
    service
        .analyze_into(
            &mut session,
            AnalysisRequest {
                documents: proposal(),
                ..AnalysisRequest::default()
            },
            &mut |_| {},
        )
        .await
        .expect("first analysis");
    ok.delete_async().await;

    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/messages");
            then.status(401).json_body(json!({
                "type": "error",
                "error": { "type": "authentication_error", "message": "invalid x-api-key" }
            }));
        })
        .await;
    let error = service
        .analyze_into(
            &mut session,
            AnalysisRequest {
                documents: proposal(),
                rubric_override: Some("Score only on location.".into()),
                model: None,
            },
            &mut |_| {},
        )
        .await
        .expect_err("rejected");

    assert_eq!(
        error.to_string(),
        "Error calling Claude API: authentication failed: invalid x-api-key"
    );
    assert_eq!(
        session.result().map(|result| result.as_str()),
        Some(EVALUATION)
    );
    assert_eq!(service.metrics_snapshot().analyses_failed, 1);
}
