//! Ingestion task queue port with delayed re-delivery.
//!
//! A durable broker implements this in production; [`MemoryQueue`] covers
//! local runs and tests. Delayed re-delivery is the retry scheduler
//! callback: `enqueue_after(delay, ...)` decouples backoff policy from any
//! particular broker.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::IngestError;

/// One unit of ingestion work: `(job_id, url)`.
#[derive(Debug, Clone)]
pub struct IngestTask {
    pub job_id: String,
    pub url: String,
}

/// At-least-once delivery of ingestion tasks.
#[async_trait]
pub trait IngestQueue: Send + Sync {
    /// Enqueues a task for immediate delivery.
    async fn enqueue(&self, job_id: &str, url: &str) -> Result<(), IngestError>;

    /// Enqueues a task delivered no earlier than `delay` from now.
    async fn enqueue_after(
        &self,
        delay: Duration,
        job_id: &str,
        url: &str,
    ) -> Result<(), IngestError>;
}

/// Channel-backed [`IngestQueue`] for local runs and tests.
pub struct MemoryQueue {
    sender: mpsc::Sender<IngestTask>,
}

impl MemoryQueue {
    /// Creates the queue; the receiver half feeds the worker pool.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<IngestTask>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl IngestQueue for MemoryQueue {
    async fn enqueue(&self, job_id: &str, url: &str) -> Result<(), IngestError> {
        debug!("enqueue job {job_id}");
        self.sender
            .send(IngestTask {
                job_id: job_id.to_string(),
                url: url.to_string(),
            })
            .await
            .map_err(|e| IngestError::Queue(e.to_string()))
    }

    async fn enqueue_after(
        &self,
        delay: Duration,
        job_id: &str,
        url: &str,
    ) -> Result<(), IngestError> {
        debug!("enqueue job {job_id} after {delay:?}");
        let sender = self.sender.clone();
        let task = IngestTask {
            job_id: job_id.to_string(),
            url: url.to_string(),
        };
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Receiver gone means the pool is shutting down; drop the task.
            let _ = sender.send(task).await;
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_in_order() {
        let (queue, mut rx) = MemoryQueue::new(8);
        queue.enqueue("a", "https://example.com/a").await.unwrap();
        queue.enqueue("b", "https://example.com/b").await.unwrap();

        assert_eq!(rx.recv().await.unwrap().job_id, "a");
        assert_eq!(rx.recv().await.unwrap().job_id, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_delivery_waits() {
        let (queue, mut rx) = MemoryQueue::new(8);
        queue
            .enqueue_after(Duration::from_secs(60), "late", "https://example.com")
            .await
            .unwrap();

        // Nothing before the delay elapses.
        assert!(
            tokio::time::timeout(Duration::from_secs(30), rx.recv())
                .await
                .is_err()
        );
        let task = tokio::time::timeout(Duration::from_secs(60), rx.recv())
            .await
            .expect("delivered after delay")
            .unwrap();
        assert_eq!(task.job_id, "late");
    }
}
