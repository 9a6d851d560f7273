//! Submission front consumed by the routing layer.

use std::sync::Arc;

use tracing::info;

use crate::errors::IngestError;
use crate::job::{IngestionJob, JobStatus};
use crate::queue::IngestQueue;
use crate::store::JobStore;

/// Submits a URL for ingestion.
///
/// Re-submitting a URL that is already ingested (or still in flight)
/// returns the existing job instead of creating a duplicate; only a
/// terminally failed URL gets a fresh job.
///
/// # Errors
/// Returns store or queue failures.
pub async fn submit_url(
    store: &Arc<dyn JobStore>,
    queue: &Arc<dyn IngestQueue>,
    url: &str,
) -> Result<IngestionJob, IngestError> {
    if let Some(existing) = store.find_by_url(url).await? {
        if existing.status != JobStatus::Failed {
            info!(
                "URL already submitted: {} (job {}, {:?})",
                url, existing.job_id, existing.status
            );
            return Ok(existing);
        }
    }

    let job = IngestionJob::new(url);
    store.create(job.clone()).await?;
    queue.enqueue(&job.job_id, url).await?;
    info!("queued job {} for URL {}", job.job_id, url);
    Ok(job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryQueue;
    use crate::store::MemoryJobStore;

    #[tokio::test]
    async fn resubmission_returns_the_existing_job() {
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let (queue, mut rx) = MemoryQueue::new(8);
        let queue: Arc<dyn IngestQueue> = Arc::new(queue);

        let first = submit_url(&store, &queue, "https://example.com/doc").await.unwrap();
        let second = submit_url(&store, &queue, "https://example.com/doc").await.unwrap();

        assert_eq!(first.job_id, second.job_id);
        // Only one task was enqueued.
        assert_eq!(rx.recv().await.unwrap().job_id, first.job_id);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_url_gets_a_fresh_job() {
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let (queue, _rx) = MemoryQueue::new(8);
        let queue: Arc<dyn IngestQueue> = Arc::new(queue);

        let mut first = submit_url(&store, &queue, "https://example.com/doc").await.unwrap();
        first.transition(JobStatus::Processing).unwrap();
        first.transition(JobStatus::Failed).unwrap();
        store.update(&first).await.unwrap();

        let second = submit_url(&store, &queue, "https://example.com/doc").await.unwrap();
        assert_ne!(first.job_id, second.job_id);
        assert_eq!(second.status, JobStatus::Pending);
    }
}
