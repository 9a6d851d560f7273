//! Job persistence port and the in-memory reference implementation.
//!
//! Relational storage lives outside this crate; the pipeline only sees the
//! [`JobStore`] trait. [`MemoryJobStore`] backs the binary in local setups
//! and the test suites.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::job::IngestionJob;

/// Persistence failure raised by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend-specific failure (connection, constraint, serialization).
    #[error("store backend error: {0}")]
    Backend(String),
}

/// System of record for ingestion jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: IngestionJob) -> Result<(), StoreError>;

    /// `None` when the job does not exist (deleted externally).
    async fn get(&self, job_id: &str) -> Result<Option<IngestionJob>, StoreError>;

    async fn update(&self, job: &IngestionJob) -> Result<(), StoreError>;

    async fn delete(&self, job_id: &str) -> Result<bool, StoreError>;

    /// Most recent job for a URL, if any.
    async fn find_by_url(&self, url: &str) -> Result<Option<IngestionJob>, StoreError>;

    /// Jobs ordered newest-first, with offset/limit pagination.
    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<IngestionJob>, StoreError>;
}

/// In-memory [`JobStore`] for local runs and tests.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<String, IngestionJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: IngestionJob) -> Result<(), StoreError> {
        self.jobs.write().await.insert(job.job_id.clone(), job);
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<IngestionJob>, StoreError> {
        Ok(self.jobs.read().await.get(job_id).cloned())
    }

    async fn update(&self, job: &IngestionJob) -> Result<(), StoreError> {
        self.jobs
            .write()
            .await
            .insert(job.job_id.clone(), job.clone());
        Ok(())
    }

    async fn delete(&self, job_id: &str) -> Result<bool, StoreError> {
        Ok(self.jobs.write().await.remove(job_id).is_some())
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<IngestionJob>, StoreError> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| j.url == url)
            .max_by_key(|j| j.created_at)
            .cloned())
    }

    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<IngestionJob>, StoreError> {
        let guard = self.jobs.read().await;
        let mut jobs: Vec<IngestionJob> = guard.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs.into_iter().skip(offset).take(limit).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobStatus;

    #[tokio::test]
    async fn crud_roundtrip() {
        let store = MemoryJobStore::new();
        let job = IngestionJob::new("https://example.com/a");
        let id = job.job_id.clone();

        store.create(job).await.unwrap();
        let mut loaded = store.get(&id).await.unwrap().unwrap();
        assert_eq!(loaded.url, "https://example.com/a");

        loaded.transition(JobStatus::Processing).unwrap();
        store.update(&loaded).await.unwrap();
        assert_eq!(
            store.get(&id).await.unwrap().unwrap().status,
            JobStatus::Processing
        );

        assert!(store.delete(&id).await.unwrap());
        assert!(store.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let store = MemoryJobStore::new();
        for i in 0..5i64 {
            let mut job = IngestionJob::new(format!("https://example.com/{i}"));
            job.created_at = chrono::Utc::now() + chrono::Duration::seconds(i);
            store.create(job).await.unwrap();
        }
        let page = store.list(0, 3).await.unwrap();
        assert_eq!(page.len(), 3);
        assert!(page[0].created_at >= page[1].created_at);
        assert!(page[1].created_at >= page[2].created_at);
    }
}
