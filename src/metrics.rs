use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and query activity.
#[derive(Default)]
pub struct RagMetrics {
    uploads_ingested: AtomicU64,
    documents_ingested: AtomicU64,
    chunks_indexed: AtomicU64,
    questions_answered: AtomicU64,
    namespaces_expired: AtomicU64,
}

impl RagMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful upload spanning `documents` files and `chunk_count` chunks.
    pub fn record_upload(&self, documents: u64, chunk_count: u64) {
        self.uploads_ingested.fetch_add(1, Ordering::Relaxed);
        self.documents_ingested
            .fetch_add(documents, Ordering::Relaxed);
        self.chunks_indexed
            .fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record an answered question.
    pub fn record_answer(&self) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record namespaces removed by the expiry sweep.
    pub fn record_expired(&self, count: u64) {
        self.namespaces_expired
            .fetch_add(count, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uploads_ingested: self.uploads_ingested.load(Ordering::Relaxed),
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
            namespaces_expired: self.namespaces_expired.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of the counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Successful upload requests since startup.
    pub uploads_ingested: u64,
    /// PDF files ingested across all uploads.
    pub documents_ingested: u64,
    /// Chunks written to the vector index.
    pub chunks_indexed: u64,
    /// Questions answered by the query pipeline.
    pub questions_answered: u64,
    /// Upload namespaces deleted by the expiry sweep.
    pub namespaces_expired: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_uploads_and_chunks() {
        let metrics = RagMetrics::new();
        metrics.record_upload(2, 10);
        metrics.record_upload(1, 3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.uploads_ingested, 2);
        assert_eq!(snapshot.documents_ingested, 3);
        assert_eq!(snapshot.chunks_indexed, 13);
    }

    #[test]
    fn answers_and_expiry_are_counted_independently() {
        let metrics = RagMetrics::new();
        metrics.record_answer();
        metrics.record_answer();
        metrics.record_expired(4);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.questions_answered, 2);
        assert_eq!(snapshot.namespaces_expired, 4);
        assert_eq!(snapshot.uploads_ingested, 0);
    }
}
