use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing analysis activity.
#[derive(Default)]
pub struct AnalysisMetrics {
    analyses_completed: AtomicU64,
    analyses_failed: AtomicU64,
    documents_extracted: AtomicU64,
    extraction_failures: AtomicU64,
}

impl AnalysisMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one extracted batch and how many of its files produced markers.
    pub fn record_extraction(&self, documents: u64, failures: u64) {
        self.documents_extracted
            .fetch_add(documents, Ordering::Relaxed);
        self.extraction_failures
            .fetch_add(failures, Ordering::Relaxed);
    }

    /// Record the outcome of one evaluation call.
    pub fn record_analysis(&self, succeeded: bool) {
        let counter = if succeeded {
            &self.analyses_completed
        } else {
            &self.analyses_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            analyses_completed: self.analyses_completed.load(Ordering::Relaxed),
            analyses_failed: self.analyses_failed.load(Ordering::Relaxed),
            documents_extracted: self.documents_extracted.load(Ordering::Relaxed),
            extraction_failures: self.extraction_failures.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of analysis counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Evaluations that returned a result.
    pub analyses_completed: u64,
    /// Evaluations whose outbound call failed.
    pub analyses_failed: u64,
    /// Files run through extraction.
    pub documents_extracted: u64,
    /// Files that produced an unsupported or error marker.
    pub extraction_failures: u64,
}
