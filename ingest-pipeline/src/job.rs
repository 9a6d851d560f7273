//! Ingestion job model and its lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::IngestError;

/// Lifecycle status of an ingestion job.
///
/// Transitions are monotonic along Pending → Processing → {Completed,
/// Failed}; Failed may loop back to Processing only via an explicit retry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// A URL ingestion job, persisted by the [`crate::store::JobStore`].
///
/// The job store row is the system of record across worker restarts; the
/// pipeline owns the job exclusively while processing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionJob {
    /// Opaque unique identifier.
    pub job_id: String,
    /// Source URL.
    pub url: String,
    /// Lifecycle status.
    pub status: JobStatus,
    /// Document title, set on completion.
    pub title: Option<String>,
    /// SHA-256 hex of the normalized extracted text, set on completion.
    pub content_hash: Option<String>,
    /// Number of chunks stored for this document.
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set on the terminal Completed transition only.
    pub completed_at: Option<DateTime<Utc>>,
    /// Last failure, retained for diagnostics.
    pub error_message: Option<String>,
    /// Scheduled retries consumed so far.
    pub retry_count: u32,
}

impl IngestionJob {
    /// Creates a fresh Pending job for a URL.
    pub fn new(url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4().to_string(),
            url: url.into(),
            status: JobStatus::Pending,
            title: None,
            content_hash: None,
            chunk_count: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
            error_message: None,
            retry_count: 0,
        }
    }

    /// Applies a lifecycle transition, rejecting illegal moves.
    ///
    /// Legal: Pending→Processing, Processing→Completed, Processing→Failed,
    /// Failed→Processing (explicit retry). Everything else is an error,
    /// notably any move out of Completed.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), IngestError> {
        use JobStatus::*;
        let legal = matches!(
            (self.status, next),
            (Pending, Processing) | (Processing, Completed) | (Processing, Failed) | (Failed, Processing)
        );
        if !legal {
            return Err(IngestError::IllegalTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}
