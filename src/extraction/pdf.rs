use super::FormatExtractor;
use super::types::ExtractionError;
use std::panic::{self, AssertUnwindSafe};

/// PDF text extractor using the pdf-extract crate.
/// Handles digital PDFs with embedded text layers; scanned pages come back empty.
pub struct PdfTextExtractor;

impl FormatExtractor for PdfTextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        // pdf-extract panics on some malformed inputs instead of returning an error.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem_by_pages(bytes)
        }));

        let pages = match outcome {
            Ok(Ok(pages)) => pages,
            Ok(Err(error)) => return Err(ExtractionError::Pdf(error.to_string())),
            Err(payload) => return Err(ExtractionError::Pdf(panic_message(payload.as_ref()))),
        };

        tracing::debug!(pages = pages.len(), "Extracted PDF pages");
        Ok(join_pages(pages))
    }
}

/// Concatenate per-page text with a blank line between pages.
pub(crate) fn join_pages(pages: Vec<String>) -> String {
    pages.join("\n\n")
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "PDF parser aborted".to_string()
    }
}
