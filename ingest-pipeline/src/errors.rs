//! Unified error types for the crate.

use thiserror::Error;

use crate::job::JobStatus;
use crate::scrape::ScrapeError;
use crate::store::StoreError;
use llm_service::ProviderError;
use vector_index::IndexError;

/// Top-level error for ingestion operations.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Content fetch failed (network, malformed page, too little text).
    /// Retryable under the backoff policy.
    #[error("fetch failed: {0}")]
    Fetch(#[from] ScrapeError),

    /// Chunking/embedding/index failure after a successful fetch.
    /// Retryable under the backoff policy.
    #[error("processing failed: {0}")]
    Processing(String),

    /// Retry budget exhausted; the job is terminally failed.
    #[error("retry budget exhausted: {0}")]
    Exhausted(String),

    /// A lifecycle transition the state machine forbids.
    #[error("illegal status transition: {from:?} -> {to:?}")]
    IllegalTransition { from: JobStatus, to: JobStatus },

    /// Job store failure.
    #[error("job store error: {0}")]
    Store(#[from] StoreError),

    /// Queue failure (enqueue/re-delivery).
    #[error("queue error: {0}")]
    Queue(String),
}

impl IngestError {
    /// Whether the failure class is recovered by a scheduled retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::Fetch(_) | IngestError::Processing(_))
    }
}

impl From<ProviderError> for IngestError {
    fn from(e: ProviderError) -> Self {
        IngestError::Processing(e.to_string())
    }
}

impl From<IndexError> for IngestError {
    fn from(e: IndexError) -> Self {
        IngestError::Processing(e.to_string())
    }
}
