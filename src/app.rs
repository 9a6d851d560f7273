//! Process wiring: configuration, collaborators, and the worker pool.
//!
//! The HTTP routing layer and relational stores are external; this module
//! assembles the pipelines with the bundled in-memory implementations so
//! the backend runs standalone. Swap the stores and the queue for durable
//! ones at the integration seam.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};

use ingest_pipeline::{
    HttpScraper, IngestConfig, IngestQueue, IngestTask, IngestionPipeline, JobStore, MemoryJobStore,
    MemoryQueue, WorkerPool,
};
use llm_service::config::default_config;
use llm_service::{LlmProvider, LlmServiceProfiles};
use query_engine::{MemoryQueryLogStore, QueryConfig, QueryPipeline, QueryLogStore};
use vector_index::{IndexConfig, QdrantIndex, VectorIndex};

/// Everything the routing layer needs to serve requests.
pub struct AppContext {
    pub job_store: Arc<dyn JobStore>,
    pub queue: Arc<dyn IngestQueue>,
    pub ingestion: Arc<IngestionPipeline>,
    pub query: Arc<QueryPipeline>,
}

impl AppContext {
    /// Submits a URL for ingestion, reusing the existing job when the URL
    /// is already known.
    pub async fn submit(
        &self,
        url: &str,
    ) -> Result<ingest_pipeline::IngestionJob, ingest_pipeline::IngestError> {
        ingest_pipeline::submit_url(&self.job_store, &self.queue, url).await
    }
}

/// Builds the full context from the environment.
pub async fn build() -> anyhow::Result<(AppContext, mpsc::Receiver<IngestTask>)> {
    let generation = default_config::generation_from_env().context("generation profile")?;
    let embedding = default_config::embedding_from_env().context("embedding profile")?;

    let alternates = [LlmProvider::Ollama, LlmProvider::OpenAi]
        .into_iter()
        .filter(|p| *p != generation.provider)
        .filter_map(default_config::alternate_generation_from_env)
        .collect();

    let profiles = Arc::new(LlmServiceProfiles::new(generation, embedding, alternates)?);
    for status in profiles.health_all().await {
        if status.healthy {
            info!("provider {} ({}) is healthy", status.provider, status.model);
        } else {
            warn!(
                "provider {} ({}) is unreachable: {}",
                status.provider,
                status.model,
                status.detail.as_deref().unwrap_or("unknown")
            );
        }
    }

    let qdrant_url =
        std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://localhost:6334".to_string());
    let collection =
        std::env::var("QDRANT_COLLECTION").unwrap_or_else(|_| "web_documents".to_string());
    let mut index_cfg = IndexConfig::new_default(qdrant_url, collection);
    index_cfg.qdrant_api_key = std::env::var("QDRANT_API_KEY").ok();
    let index: Arc<dyn VectorIndex> = Arc::new(QdrantIndex::connect(&index_cfg)?);

    let job_store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let query_logs: Arc<dyn QueryLogStore> = Arc::new(MemoryQueryLogStore::new());

    let (queue, receiver) = MemoryQueue::new(1024);
    let queue: Arc<dyn IngestQueue> = Arc::new(queue);

    let embedder = profiles.embedder().await?;
    let generator = profiles.generator(None).await?;

    let ingestion = Arc::new(IngestionPipeline::new(
        IngestConfig::default(),
        Arc::new(HttpScraper::new()?),
        embedder.clone(),
        index.clone(),
        job_store.clone(),
        queue.clone(),
    ));

    let mut query = QueryPipeline::new(
        QueryConfig::default(),
        embedder,
        index,
        query_logs,
        generator,
    );
    for provider in [LlmProvider::Ollama, LlmProvider::OpenAi] {
        if let Ok(alternate) = profiles.generator(Some(provider.as_str())).await {
            query = query.with_alternate(alternate);
        }
    }

    Ok((
        AppContext {
            job_store,
            queue,
            ingestion: ingestion.clone(),
            query: Arc::new(query),
        },
        receiver,
    ))
}

/// Runs the ingestion workers until Ctrl+C.
pub async fn run() -> anyhow::Result<()> {
    let (ctx, receiver) = build().await?;

    let workers = std::env::var("WORKER_CONCURRENCY")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(4);

    let pool = WorkerPool::new(ctx.ingestion.clone(), IngestConfig::default());
    let pool_handle = tokio::spawn(pool.run(receiver, workers));

    info!("backend ready; press Ctrl+C to stop");
    shutdown_signal().await;

    // Workers are cancelled mid-flight; jobs left Processing are picked up
    // by the external cleanup sweep.
    pool_handle.abort();
    drop(ctx);
    info!("shutdown complete");
    Ok(())
}

/// Returns a future that resolves when Ctrl+C is pressed.
async fn shutdown_signal() {
    signal::ctrl_c()
        .await
        .expect("Failed to listen for shutdown signal");
}
