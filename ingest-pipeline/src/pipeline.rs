//! End-to-end ingestion pipeline: scrape → hash → dedup → chunk → embed →
//! upsert, with retry/backoff bookkeeping against the job store.
//!
//! The pipeline is constructed once with its collaborators and driven by the
//! worker pool. Every status transition is persisted before the next
//! external call, so a crash is observable as a stuck `Processing` row that
//! the external cleanup sweep can reap.

use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use crate::chunker;
use crate::config::IngestConfig;
use crate::errors::IngestError;
use crate::job::{IngestionJob, JobStatus};
use crate::queue::IngestQueue;
use crate::scrape::Scraper;
use crate::store::JobStore;
use llm_service::EmbeddingPort;
use services::uuid::stable_uuid;
use vector_index::{ChunkPayload, ChunkRecord, VectorIndex};

/// Orchestrates the lifecycle of one ingestion job at a time.
///
/// Safe to share across workers: all state lives in the collaborators.
pub struct IngestionPipeline {
    cfg: IngestConfig,
    scraper: Arc<dyn Scraper>,
    embedder: Arc<dyn EmbeddingPort>,
    index: Arc<dyn VectorIndex>,
    store: Arc<dyn JobStore>,
    queue: Arc<dyn IngestQueue>,
}

/// What the processing stages produced for a job.
struct StageOutcome {
    title: String,
    content_hash: String,
    chunk_count: usize,
}

impl IngestionPipeline {
    pub fn new(
        cfg: IngestConfig,
        scraper: Arc<dyn Scraper>,
        embedder: Arc<dyn EmbeddingPort>,
        index: Arc<dyn VectorIndex>,
        store: Arc<dyn JobStore>,
        queue: Arc<dyn IngestQueue>,
    ) -> Self {
        Self {
            cfg,
            scraper,
            embedder,
            index,
            store,
            queue,
        }
    }

    /// Drives one delivered task to completion, a scheduled retry, or a
    /// terminal failure.
    ///
    /// Tolerates double delivery: a missing job aborts silently, a job
    /// already `Completed` is a no-op, and re-processing identical content
    /// takes the dedup fast path with idempotent point ids.
    ///
    /// # Errors
    /// Only store/queue failures escape; fetch and processing failures are
    /// recorded on the job and consumed here.
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub async fn process(&self, job_id: &str, url: &str) -> Result<(), IngestError> {
        let Some(mut job) = self.store.get(job_id).await? else {
            // Job deleted externally; nothing to do and nothing to record.
            debug!("job {job_id} not found, dropping task");
            return Ok(());
        };

        match job.status {
            JobStatus::Completed => {
                debug!("job {job_id} already completed, dropping duplicate delivery");
                return Ok(());
            }
            JobStatus::Processing => {
                // Re-delivery after a crash or a concurrent worker; continue
                // processing, idempotency covers the overlap.
                warn!("job {job_id} re-delivered while Processing");
            }
            JobStatus::Pending | JobStatus::Failed => {
                job.transition(JobStatus::Processing)?;
            }
        }
        // Persisted before any external call begins.
        self.store.update(&job).await?;

        match self.run_stages(&job).await {
            Ok(outcome) => self.complete(job, outcome).await,
            Err(err) => self.fail(job, err).await,
        }
    }

    /// Soft-deadline path: converts an elapsed timeout into the same
    /// retryable failure as a fetch/embed exception, so a cancelled job
    /// never stays `Processing` forever.
    pub async fn handle_timeout(&self, job_id: &str) -> Result<(), IngestError> {
        let Some(job) = self.store.get(job_id).await? else {
            return Ok(());
        };
        if job.status != JobStatus::Processing {
            return Ok(());
        }
        self.fail(
            job,
            IngestError::Processing("processing deadline exceeded".into()),
        )
        .await
    }

    /* --------------------- Stages --------------------- */

    async fn run_stages(&self, job: &IngestionJob) -> Result<StageOutcome, IngestError> {
        let page = self.scraper.fetch(&job.url).await?;

        let content_hash = sha256_hex(&page.text);

        // Dedup fast path: identical content is never re-embedded, even when
        // submitted under a different URL or job.
        if let Some(existing) = self.index.exists_by_hash(&content_hash).await? {
            info!(
                "content {} already indexed ({} chunks), skipping embedding",
                content_hash, existing
            );
            return Ok(StageOutcome {
                title: page.title,
                content_hash,
                chunk_count: existing,
            });
        }

        let chunks = chunker::split(&page.text, self.cfg.chunk_size, self.cfg.chunk_overlap);
        if chunks.is_empty() {
            return Err(IngestError::Processing("no chunks created from content".into()));
        }

        debug!("embedding {} chunks for job {}", chunks.len(), job.job_id);
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.cfg.embed_batch.max(1)) {
            let embedded = self.embedder.embed_batch(batch).await?;
            if embedded.len() != batch.len() {
                return Err(IngestError::Processing(format!(
                    "embedding batch size mismatch: got {}, want {}",
                    embedded.len(),
                    batch.len()
                )));
            }
            vectors.extend(embedded);
        }

        let dimension = vectors
            .first()
            .map(Vec::len)
            .ok_or_else(|| IngestError::Processing("embedding produced no vectors".into()))?;
        self.index.ensure_schema(dimension).await?;

        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(chunk_index, (content, vector))| ChunkRecord {
                // Deterministic id: re-submitting identical content upserts
                // the same points instead of duplicating them.
                id: stable_uuid(&format!("{content_hash}:{chunk_index}")).to_string(),
                vector,
                payload: ChunkPayload {
                    content,
                    source: job.url.clone(),
                    title: page.title.clone(),
                    chunk_index,
                    content_hash: content_hash.clone(),
                    job_id: job.job_id.clone(),
                },
            })
            .collect();

        let chunk_count = self.index.upsert(records).await?;
        Ok(StageOutcome {
            title: page.title,
            content_hash,
            chunk_count,
        })
    }

    /* --------------------- Terminal transitions --------------------- */

    async fn complete(
        &self,
        mut job: IngestionJob,
        outcome: StageOutcome,
    ) -> Result<(), IngestError> {
        job.transition(JobStatus::Completed)?;
        job.title = Some(outcome.title);
        job.content_hash = Some(outcome.content_hash);
        job.chunk_count = outcome.chunk_count;
        job.completed_at = Some(Utc::now());
        job.error_message = None;
        self.store.update(&job).await?;

        info!(
            "job {} completed with {} chunks",
            job.job_id, job.chunk_count
        );
        Ok(())
    }

    async fn fail(&self, mut job: IngestionJob, err: IngestError) -> Result<(), IngestError> {
        job.transition(JobStatus::Failed)?;

        if err.is_retryable() && job.retry_count < self.cfg.max_retries {
            // Backoff grows with the attempt number: base × (n + 1).
            let delay = self.cfg.retry_base * (job.retry_count + 1);
            job.retry_count += 1;
            job.error_message = Some(err.to_string());
            self.store.update(&job).await?;
            warn!(
                "job {} failed ({}), retry {}/{} in {:?}",
                job.job_id, err, job.retry_count, self.cfg.max_retries, delay
            );
            self.queue.enqueue_after(delay, &job.job_id, &job.url).await?;
        } else {
            let terminal = IngestError::Exhausted(err.to_string());
            job.error_message = Some(terminal.to_string());
            self.store.update(&job).await?;
            warn!(
                "job {} terminally failed after {} retries: {}",
                job.job_id, job.retry_count, terminal
            );
        }
        Ok(())
    }
}

/// Lowercase hex SHA-256 of the normalized document text.
fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrape::{ScrapeError, ScrapedPage};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use vector_index::{IndexError, IndexStats, SearchHit};

    /// Scraper double: either a fixed page or a permanent failure.
    struct FakeScraper {
        page: Option<ScrapedPage>,
        calls: AtomicUsize,
    }

    impl FakeScraper {
        fn ok(text: &str, title: &str) -> Self {
            Self {
                page: Some(ScrapedPage {
                    text: text.to_string(),
                    title: title.to_string(),
                }),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                page: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Scraper for FakeScraper {
        async fn fetch(&self, _url: &str) -> Result<ScrapedPage, ScrapeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.page {
                Some(page) => Ok(page.clone()),
                None => Err(ScrapeError::Request("connection refused".into())),
            }
        }
    }

    /// Embedder double counting batch calls.
    struct FakeEmbedder {
        dim: usize,
        batch_calls: AtomicUsize,
    }

    impl FakeEmbedder {
        fn new(dim: usize) -> Self {
            Self {
                dim,
                batch_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingPort for FakeEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, llm_service::ProviderError> {
            Ok(vec![0.1; self.dim])
        }

        async fn embed_batch(
            &self,
            texts: &[String],
        ) -> Result<Vec<Vec<f32>>, llm_service::ProviderError> {
            self.batch_calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|_| vec![0.1; self.dim]).collect())
        }
    }

    /// In-memory index double mirroring the Qdrant facade contract.
    #[derive(Default)]
    struct FakeIndex {
        records: Mutex<Vec<ChunkRecord>>,
        dimension: Mutex<Option<usize>>,
    }

    impl FakeIndex {
        fn stored(&self) -> Vec<ChunkRecord> {
            self.records.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl VectorIndex for FakeIndex {
        async fn ensure_schema(&self, dimension: usize) -> Result<(), IndexError> {
            let mut current = self.dimension.lock().unwrap();
            if *current != Some(dimension) {
                // Destructive recreation on mismatch.
                self.records.lock().unwrap().clear();
                *current = Some(dimension);
            }
            Ok(())
        }

        async fn exists_by_hash(&self, hash: &str) -> Result<Option<usize>, IndexError> {
            let count = self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.payload.content_hash == hash)
                .count();
            Ok((count > 0).then_some(count))
        }

        async fn upsert(&self, new: Vec<ChunkRecord>) -> Result<usize, IndexError> {
            let written = new.len();
            let mut records = self.records.lock().unwrap();
            for record in new {
                records.retain(|r| r.id != record.id);
                records.push(record);
            }
            Ok(written)
        }

        async fn search(&self, _v: Vec<f32>, _k: usize) -> Result<Vec<SearchHit>, IndexError> {
            Ok(Vec::new())
        }

        async fn stats(&self) -> Result<IndexStats, IndexError> {
            Ok(IndexStats {
                total_vectors: self.records.lock().unwrap().len() as u64,
                collection: "test".into(),
            })
        }
    }

    /// Queue double recording scheduled retries instead of sleeping.
    #[derive(Default)]
    struct RecordingQueue {
        delayed: Mutex<Vec<(Duration, String)>>,
    }

    #[async_trait]
    impl IngestQueue for RecordingQueue {
        async fn enqueue(&self, _job_id: &str, _url: &str) -> Result<(), IngestError> {
            Ok(())
        }

        async fn enqueue_after(
            &self,
            delay: Duration,
            job_id: &str,
            _url: &str,
        ) -> Result<(), IngestError> {
            self.delayed
                .lock()
                .unwrap()
                .push((delay, job_id.to_string()));
            Ok(())
        }
    }

    struct Fixture {
        pipeline: IngestionPipeline,
        scraper: Arc<FakeScraper>,
        embedder: Arc<FakeEmbedder>,
        index: Arc<FakeIndex>,
        store: Arc<crate::store::MemoryJobStore>,
        queue: Arc<RecordingQueue>,
    }

    fn fixture(scraper: FakeScraper) -> Fixture {
        let scraper = Arc::new(scraper);
        let embedder = Arc::new(FakeEmbedder::new(8));
        let index = Arc::new(FakeIndex::default());
        let store = Arc::new(crate::store::MemoryJobStore::new());
        let queue = Arc::new(RecordingQueue::default());
        let pipeline = IngestionPipeline::new(
            IngestConfig::default(),
            scraper.clone(),
            embedder.clone(),
            index.clone(),
            store.clone(),
            queue.clone(),
        );
        Fixture {
            pipeline,
            scraper,
            embedder,
            index,
            store,
            queue,
        }
    }

    async fn seeded_job(store: &crate::store::MemoryJobStore, url: &str) -> IngestionJob {
        let job = IngestionJob::new(url);
        store.create(job.clone()).await.unwrap();
        job
    }

    fn article(chars: usize) -> String {
        "lorem ipsum dolor sit amet consectetur adipiscing elit sed do eiusmod tempor "
            .chars()
            .cycle()
            .take(chars)
            .collect()
    }

    #[tokio::test]
    async fn successful_ingestion_completes_the_job() {
        let f = fixture(FakeScraper::ok(&article(2500), "The Article"));
        let job = seeded_job(&f.store, "https://example.com/article").await;

        f.pipeline.process(&job.job_id, &job.url).await.unwrap();

        let done = f.store.get(&job.job_id).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.title.as_deref(), Some("The Article"));
        assert!(done.content_hash.is_some());
        assert!(done.chunk_count > 0);
        assert!(done.completed_at.is_some());
        assert!(done.error_message.is_none());
    }

    #[tokio::test]
    async fn example_article_yields_three_chunks_in_order() {
        // 2500 separator-free characters with chunk 1000 / overlap 200.
        let text: String = ('a'..='z').cycle().take(2500).collect();
        let f = fixture(FakeScraper::ok(&text, "t"));
        let job = seeded_job(&f.store, "https://example.com/t").await;

        f.pipeline.process(&job.job_id, &job.url).await.unwrap();

        let records = f.index.stored();
        assert_eq!(records.len(), 3);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.payload.chunk_index, i);
            assert_eq!(record.payload.source, "https://example.com/t");
        }
        assert_eq!(
            f.store.get(&job.job_id).await.unwrap().unwrap().chunk_count,
            3
        );
    }

    #[tokio::test]
    async fn reingesting_identical_content_skips_embedding() {
        let text = article(2500);
        let f = fixture(FakeScraper::ok(&text, "t"));

        let first = seeded_job(&f.store, "https://example.com/a").await;
        f.pipeline.process(&first.job_id, &first.url).await.unwrap();
        let calls_after_first = f.embedder.batch_calls.load(Ordering::SeqCst);
        let stored_after_first = f.index.stored().len();

        // Same content under a different URL and job.
        let second = seeded_job(&f.store, "https://mirror.example.com/a").await;
        f.pipeline
            .process(&second.job_id, &second.url)
            .await
            .unwrap();

        let done = f.store.get(&second.job_id).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.chunk_count, stored_after_first);
        // Zero additional embedding calls and exactly one set of vectors.
        assert_eq!(
            f.embedder.batch_calls.load(Ordering::SeqCst),
            calls_after_first
        );
        assert_eq!(f.index.stored().len(), stored_after_first);
    }

    #[tokio::test]
    async fn always_failing_fetch_exhausts_the_retry_budget() {
        let f = fixture(FakeScraper::failing());
        let job = seeded_job(&f.store, "https://example.com/down").await;

        // Initial attempt plus the scheduled retries.
        for _ in 0..4 {
            f.pipeline.process(&job.job_id, &job.url).await.unwrap();
        }

        let failed = f.store.get(&job.job_id).await.unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.retry_count, 3);
        assert!(failed.error_message.unwrap().contains("fetch failed"));

        // Exactly max_retries scheduled retries, with growing backoff.
        let delayed = f.queue.delayed.lock().unwrap();
        assert_eq!(delayed.len(), 3);
        assert_eq!(delayed[0].0, Duration::from_secs(60));
        assert_eq!(delayed[1].0, Duration::from_secs(120));
        assert_eq!(delayed[2].0, Duration::from_secs(180));
    }

    #[tokio::test]
    async fn missing_job_aborts_silently() {
        let f = fixture(FakeScraper::ok(&article(500), "t"));
        f.pipeline
            .process("no-such-job", "https://example.com")
            .await
            .unwrap();
        assert_eq!(f.scraper.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn completed_job_ignores_duplicate_delivery() {
        let f = fixture(FakeScraper::ok(&article(2500), "t"));
        let job = seeded_job(&f.store, "https://example.com/x").await;

        f.pipeline.process(&job.job_id, &job.url).await.unwrap();
        let calls = f.scraper.calls.load(Ordering::SeqCst);

        f.pipeline.process(&job.job_id, &job.url).await.unwrap();
        assert_eq!(f.scraper.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn timeout_takes_the_retry_path() {
        let f = fixture(FakeScraper::ok(&article(2500), "t"));
        let mut job = seeded_job(&f.store, "https://example.com/slow").await;
        job.transition(JobStatus::Processing).unwrap();
        f.store.update(&job).await.unwrap();

        f.pipeline.handle_timeout(&job.job_id).await.unwrap();

        let failed = f.store.get(&job.job_id).await.unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.retry_count, 1);
        assert!(
            failed
                .error_message
                .unwrap()
                .contains("deadline exceeded")
        );
        assert_eq!(f.queue.delayed.lock().unwrap().len(), 1);
    }
}
