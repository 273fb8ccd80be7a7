//! Data types and error definitions for document extraction.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Marker prefix used when a binary format fails to extract.
pub(crate) const ERROR_MARKER_PREFIX: &str = "[Error extracting text from ";
/// Marker prefix used for extensions outside the accepted set.
pub(crate) const UNSUPPORTED_MARKER_PREFIX: &str = "[Unsupported file type: ";

/// Extensions accepted for proposal documents.
pub const ACCEPTED_EXTENSIONS: [&str; 5] = ["txt", "md", "pdf", "doc", "docx"];

/// Errors raised by the format-specific extraction libraries.
///
/// These never escape [`crate::extraction::DocumentExtractor::extract`]; they are rendered into
/// an inline marker in place of the document content.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// PDF library rejected the document.
    #[error("{0}")]
    Pdf(String),
    /// Word library rejected the document.
    #[error("{0}")]
    Word(String),
}

/// Closed set of formats the extractor knows how to handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    /// `.txt`
    Text,
    /// `.md`
    Markdown,
    /// `.pdf`
    Pdf,
    /// `.doc` / `.docx`
    Word,
    /// Anything else; carries the lowercased extension.
    Unsupported(String),
}

impl DocumentFormat {
    /// Detect the format from a file name's extension, case-insensitively.
    ///
    /// The extension is whatever follows the last `.`; names without one map to
    /// `Unsupported("")`.
    pub fn from_name(name: &str) -> Self {
        let extension = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "txt" => Self::Text,
            "md" => Self::Markdown,
            "pdf" => Self::Pdf,
            "doc" | "docx" => Self::Word,
            _ => Self::Unsupported(extension),
        }
    }

    /// Label used in logs and error markers.
    pub fn label(&self) -> &str {
        match self {
            Self::Text => "Text",
            Self::Markdown => "Markdown",
            Self::Pdf => "PDF",
            Self::Word => "Word",
            Self::Unsupported(_) => "Unsupported",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One uploaded file awaiting extraction.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    /// File name as supplied by the uploader.
    pub name: String,
    /// Raw file contents.
    pub raw_bytes: Vec<u8>,
    /// Format detected from the name at upload time.
    pub format: DocumentFormat,
}

impl UploadedDocument {
    /// Build an upload, detecting its format from the name.
    pub fn new(name: impl Into<String>, raw_bytes: impl Into<Vec<u8>>) -> Self {
        let name = name.into();
        let format = DocumentFormat::from_name(&name);
        Self {
            name,
            raw_bytes: raw_bytes.into(),
            format,
        }
    }
}

/// Plain text produced for one upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedText {
    /// Name of the upload the text came from.
    pub source_name: String,
    /// Extracted text, or an inline marker describing why there is none.
    pub content: String,
}

impl ExtractedText {
    /// Whether the content is an unsupported-format or extraction-failure marker.
    pub fn is_error_marker(&self) -> bool {
        let content = self.content.as_str();
        (content.starts_with(ERROR_MARKER_PREFIX) || content.starts_with(UNSUPPORTED_MARKER_PREFIX))
            && content.ends_with(']')
    }
}

/// Progress notification emitted once per processed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionProgress {
    /// Zero-based position of the file in the batch.
    pub index: usize,
    /// Number of files in the batch.
    pub total: usize,
    /// Name of the processed file.
    pub name: String,
    /// Whether the file produced a marker instead of text.
    pub failed: bool,
}
