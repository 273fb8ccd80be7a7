//! Document extraction: turn each uploaded file into plain UTF-8 text.
//!
//! Dispatch is a closed table keyed on [`DocumentFormat`]. Text and Markdown are decoded in
//! place; PDF and Word go through a boxed [`FormatExtractor`] so the strategies can be swapped
//! out. Extraction never fails: library errors and unsupported extensions become inline
//! markers, and the batch always yields one [`ExtractedText`] per upload, in upload order.

mod pdf;
pub mod types;
mod word;

pub use pdf::PdfTextExtractor;
pub use types::{
    ACCEPTED_EXTENSIONS, DocumentFormat, ExtractedText, ExtractionError, ExtractionProgress,
    UploadedDocument,
};
pub use word::WordTextExtractor;

use types::{ERROR_MARKER_PREFIX, UNSUPPORTED_MARKER_PREFIX};

/// Strategy for one binary document format.
pub trait FormatExtractor: Send + Sync {
    /// Produce plain text from the raw file contents.
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractionError>;
}

/// Decode bytes as UTF-8, replacing undecodable sequences with U+FFFD.
pub fn decode_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Per-format extraction table.
pub struct DocumentExtractor {
    pdf: Box<dyn FormatExtractor>,
    word: Box<dyn FormatExtractor>,
}

impl DocumentExtractor {
    /// Build an extractor backed by the bundled PDF and Word libraries.
    pub fn new() -> Self {
        Self::with_strategies(Box::new(PdfTextExtractor), Box::new(WordTextExtractor))
    }

    /// Build an extractor with explicit PDF and Word strategies.
    pub fn with_strategies(
        pdf: Box<dyn FormatExtractor>,
        word: Box<dyn FormatExtractor>,
    ) -> Self {
        Self { pdf, word }
    }

    /// Extract one upload. Never fails; problems are reported inside `content`.
    pub fn extract(&self, document: &UploadedDocument) -> ExtractedText {
        let content = match &document.format {
            DocumentFormat::Text | DocumentFormat::Markdown => decode_text(&document.raw_bytes),
            DocumentFormat::Pdf => self.run_strategy(&*self.pdf, document),
            DocumentFormat::Word => self.run_strategy(&*self.word, document),
            DocumentFormat::Unsupported(extension) => {
                tracing::warn!(file = %document.name, extension = %extension, "Unsupported file type");
                format!("{UNSUPPORTED_MARKER_PREFIX}{extension}]")
            }
        };

        ExtractedText {
            source_name: document.name.clone(),
            content,
        }
    }

    /// Extract a batch in order, reporting progress after each file.
    pub fn extract_all(
        &self,
        documents: &[UploadedDocument],
        progress: &mut dyn FnMut(ExtractionProgress),
    ) -> Vec<ExtractedText> {
        let total = documents.len();
        documents
            .iter()
            .enumerate()
            .map(|(index, document)| {
                let extracted = self.extract(document);
                let failed = extracted.is_error_marker();
                tracing::info!(
                    file = %document.name,
                    format = %document.format,
                    index = index + 1,
                    total,
                    chars = extracted.content.chars().count(),
                    failed,
                    "Processed document"
                );
                progress(ExtractionProgress {
                    index,
                    total,
                    name: document.name.clone(),
                    failed,
                });
                extracted
            })
            .collect()
    }

    fn run_strategy(&self, strategy: &dyn FormatExtractor, document: &UploadedDocument) -> String {
        match strategy.extract(&document.raw_bytes) {
            Ok(text) => text,
            Err(error) => {
                tracing::warn!(
                    file = %document.name,
                    format = %document.format,
                    error = %error,
                    "Extraction failed; substituting marker"
                );
                format!("{ERROR_MARKER_PREFIX}{}: {error}]", document.format.label())
            }
        }
    }
}

impl Default for DocumentExtractor {
    fn default() -> Self {
        Self::new()
    }
}
