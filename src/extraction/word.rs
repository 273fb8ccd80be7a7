use super::FormatExtractor;
use super::types::ExtractionError;
use docx_rs::{DocumentChild, Paragraph, ParagraphChild, RunChild, read_docx};

/// Word extractor using the docx-rs crate.
///
/// Only top-level body paragraphs are read; tables, headers and images are skipped. Legacy
/// binary `.doc` files are not ZIP containers and surface as extraction errors.
pub struct WordTextExtractor;

impl FormatExtractor for WordTextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        let docx = read_docx(bytes).map_err(|error| ExtractionError::Word(format!("{error:?}")))?;

        let paragraphs: Vec<String> = docx
            .document
            .children
            .iter()
            .filter_map(|child| match child {
                DocumentChild::Paragraph(paragraph) => Some(paragraph_text(paragraph)),
                _ => None,
            })
            .collect();

        tracing::debug!(paragraphs = paragraphs.len(), "Extracted Word paragraphs");
        Ok(paragraphs.join("\n"))
    }
}

/// Paragraph → Run → Text; runs are concatenated with no separator.
fn paragraph_text(paragraph: &Paragraph) -> String {
    let mut text = String::new();
    for child in &paragraph.children {
        if let ParagraphChild::Run(run) = child {
            for run_child in &run.children {
                match run_child {
                    RunChild::Text(fragment) => text.push_str(&fragment.text),
                    RunChild::Tab(_) => text.push('\t'),
                    _ => {}
                }
            }
        }
    }
    text
}
