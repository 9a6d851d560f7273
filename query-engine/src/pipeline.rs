//! Query orchestration: fail-fast checks, retrieval, prompt assembly, and
//! the streaming generation handoff.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::config::QueryConfig;
use crate::errors::QueryError;
use crate::log::{QueryLog, QueryLogStore};
use crate::prompt::build_prompt;
use crate::stream::{AnswerStream, spawn_fanout};
use llm_service::{EmbeddingPort, GenerationPort};
use vector_index::VectorIndex;

/// Answers natural-language questions over the ingested corpus.
///
/// Fully concurrent: no state is shared between in-flight queries beyond
/// the injected collaborators.
pub struct QueryPipeline {
    cfg: QueryConfig,
    embedder: Arc<dyn EmbeddingPort>,
    index: Arc<dyn VectorIndex>,
    log_store: Arc<dyn QueryLogStore>,
    generators: HashMap<String, Arc<dyn GenerationPort>>,
    default_provider: String,
}

impl QueryPipeline {
    /// Creates a pipeline with its default generation provider.
    pub fn new(
        cfg: QueryConfig,
        embedder: Arc<dyn EmbeddingPort>,
        index: Arc<dyn VectorIndex>,
        log_store: Arc<dyn QueryLogStore>,
        generator: Arc<dyn GenerationPort>,
    ) -> Self {
        let default_provider = generator.provider_id().to_string();
        let mut generators = HashMap::new();
        generators.insert(default_provider.clone(), generator);
        Self {
            cfg,
            embedder,
            index,
            log_store,
            generators,
            default_provider,
        }
    }

    /// Registers an alternate generation provider selectable by name.
    pub fn with_alternate(mut self, generator: Arc<dyn GenerationPort>) -> Self {
        self.generators
            .insert(generator.provider_id().to_string(), generator);
        self
    }

    /// Runs a query and returns the live answer stream.
    ///
    /// Failures before streaming starts surface as a structured
    /// [`QueryError`]; once the stream is open, failures arrive in-band.
    ///
    /// # Errors
    /// - [`QueryError::EmptyCorpus`] when the index holds no vectors (checked
    ///   before any provider call).
    /// - [`QueryError::NoRelevantContent`] when the search matches nothing.
    /// - [`QueryError::UnknownProvider`] for an unconfigured override.
    #[instrument(skip(self), fields(top_k = self.cfg.top_k))]
    pub async fn query(
        &self,
        text: &str,
        provider_override: Option<&str>,
    ) -> Result<AnswerStream, QueryError> {
        let total_start = Instant::now();

        // Fail fast on an empty corpus, before touching any provider.
        let stats = self.index.stats().await?;
        if stats.total_vectors == 0 {
            return Err(QueryError::EmptyCorpus);
        }

        let generator = self.generator(provider_override)?;

        let retrieval_start = Instant::now();
        let query_vector = self
            .embedder
            .embed(text)
            .await
            .map_err(QueryError::Embedding)?;
        let hits = self.index.search(query_vector, self.cfg.top_k).await?;
        let retrieval_ms = retrieval_start.elapsed().as_millis() as u64;

        if hits.is_empty() {
            return Err(QueryError::NoRelevantContent);
        }
        debug!("retrieved {} chunks in {}ms", hits.len(), retrieval_ms);

        let query_id = Uuid::new_v4().to_string();
        let mut log = QueryLog::new(
            &query_id,
            text,
            generator.provider_id(),
            generator.model_id(),
        );
        log.num_results = hits.len();
        log.retrieval_ms = Some(retrieval_ms);
        self.log_store.create(log.clone()).await?;

        let prompt = build_prompt(text, &hits);
        let generation_start = Instant::now();
        let tokens = match generator.generate_stream(&prompt).await {
            Ok(tokens) => tokens,
            Err(e) => {
                // The stream never opened: record what we have and surface a
                // structured error.
                log.generation_ms = Some(generation_start.elapsed().as_millis() as u64);
                log.total_ms = Some(total_start.elapsed().as_millis() as u64);
                let _ = self.log_store.update(&log).await;
                return Err(QueryError::Generation(e));
            }
        };

        info!(
            "query {} streaming with {} context chunks via {}",
            query_id,
            hits.len(),
            log.provider
        );

        let num_results = hits.len();
        let receiver = spawn_fanout(
            tokens,
            log,
            self.log_store.clone(),
            generation_start,
            total_start,
        );
        Ok(AnswerStream::new(query_id, num_results, receiver))
    }

    fn generator(
        &self,
        provider_override: Option<&str>,
    ) -> Result<Arc<dyn GenerationPort>, QueryError> {
        let name = provider_override.unwrap_or(&self.default_provider);
        self.generators
            .get(name)
            .cloned()
            .ok_or_else(|| QueryError::UnknownProvider(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::MemoryQueryLogStore;
    use crate::stream::AnswerEvent;
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use llm_service::{ProviderError, TokenStream};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use vector_index::{ChunkRecord, IndexError, IndexStats, SearchHit, VectorIndex};

    struct FakeEmbedder;

    #[async_trait]
    impl EmbeddingPort for FakeEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
            Ok(vec![0.3; 4])
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            Ok(texts.iter().map(|_| vec![0.3; 4]).collect())
        }
    }

    /// Index double with canned hits.
    struct FakeIndex {
        total: u64,
        hits: Vec<SearchHit>,
    }

    impl FakeIndex {
        fn with_hits(hits: Vec<SearchHit>) -> Self {
            Self { total: 42, hits }
        }

        fn empty_corpus() -> Self {
            Self {
                total: 0,
                hits: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl VectorIndex for FakeIndex {
        async fn ensure_schema(&self, _dimension: usize) -> Result<(), IndexError> {
            Ok(())
        }
        async fn exists_by_hash(&self, _hash: &str) -> Result<Option<usize>, IndexError> {
            Ok(None)
        }
        async fn upsert(&self, _records: Vec<ChunkRecord>) -> Result<usize, IndexError> {
            Ok(0)
        }
        async fn search(&self, _v: Vec<f32>, _k: usize) -> Result<Vec<SearchHit>, IndexError> {
            Ok(self.hits.clone())
        }
        async fn stats(&self) -> Result<IndexStats, IndexError> {
            Ok(IndexStats {
                total_vectors: self.total,
                collection: "test".into(),
            })
        }
    }

    /// Generator double emitting a canned fragment sequence.
    struct FakeGenerator {
        fragments: Vec<Result<String, ProviderError>>,
        calls: AtomicUsize,
    }

    impl FakeGenerator {
        fn ok(fragments: &[&str]) -> Self {
            Self {
                fragments: fragments.iter().map(|f| Ok(f.to_string())).collect(),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing_after(fragments: &[&str]) -> Self {
            let mut items: Vec<Result<String, ProviderError>> =
                fragments.iter().map(|f| Ok(f.to_string())).collect();
            items.push(Err(ProviderError::Unavailable("upstream reset".into())));
            Self {
                fragments: items,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl GenerationPort for FakeGenerator {
        async fn generate_stream(&self, _prompt: &str) -> Result<TokenStream, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let items = self.fragments.clone_shallow();
            Ok(Box::pin(futures_util::stream::iter(items)))
        }
        fn provider_id(&self) -> &str {
            "ollama"
        }
        fn model_id(&self) -> &str {
            "test-model"
        }
    }

    /// `ProviderError` is not `Clone`; rebuild the canned sequence instead.
    trait CloneShallow {
        fn clone_shallow(&self) -> Vec<Result<String, ProviderError>>;
    }

    impl CloneShallow for Vec<Result<String, ProviderError>> {
        fn clone_shallow(&self) -> Vec<Result<String, ProviderError>> {
            self.iter()
                .map(|item| match item {
                    Ok(s) => Ok(s.clone()),
                    Err(e) => Err(ProviderError::Unavailable(e.to_string())),
                })
                .collect()
        }
    }

    fn hit(content: &str, chunk_index: usize) -> SearchHit {
        SearchHit {
            score: 0.9,
            content: content.to_string(),
            source: "https://example.com/doc".into(),
            title: "Doc".into(),
            chunk_index,
            payload: serde_json::Value::Null,
        }
    }

    struct Fixture {
        pipeline: QueryPipeline,
        log_store: Arc<MemoryQueryLogStore>,
        generator: Arc<FakeGenerator>,
    }

    fn fixture(index: FakeIndex, generator: FakeGenerator) -> Fixture {
        let log_store = Arc::new(MemoryQueryLogStore::new());
        let generator = Arc::new(generator);
        let pipeline = QueryPipeline::new(
            QueryConfig::default(),
            Arc::new(FakeEmbedder),
            Arc::new(index),
            log_store.clone(),
            generator.clone(),
        );
        Fixture {
            pipeline,
            log_store,
            generator,
        }
    }

    async fn finalized_log(store: &MemoryQueryLogStore, query_id: &str) -> QueryLog {
        for _ in 0..50 {
            if let Some(log) = store.get(query_id).await {
                if log.response.is_some() {
                    return log;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("log was never finalized");
    }

    #[tokio::test]
    async fn empty_corpus_fails_fast_without_generation() {
        let f = fixture(FakeIndex::empty_corpus(), FakeGenerator::ok(&["unused"]));

        match f.pipeline.query("anything", None).await {
            Err(QueryError::EmptyCorpus) => {}
            other => panic!("expected EmptyCorpus, got {:?}", other.map(|_| ())),
        }
        assert_eq!(f.generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_matches_is_distinct_from_empty_corpus() {
        let f = fixture(FakeIndex::with_hits(Vec::new()), FakeGenerator::ok(&["x"]));

        match f.pipeline.query("unrelated", None).await {
            Err(QueryError::NoRelevantContent) => {}
            other => panic!("expected NoRelevantContent, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn streams_answer_and_finalizes_log() {
        let f = fixture(
            FakeIndex::with_hits(vec![hit("rust is fast", 1), hit("rust is safe", 0)]),
            FakeGenerator::ok(&["Rust ", "is ", "fast and safe."]),
        );

        let answer = f.pipeline.query("what is rust?", None).await.unwrap();
        assert_eq!(answer.num_results, 2);
        let query_id = answer.query_id.clone();

        let events: Vec<AnswerEvent> = answer.collect().await;
        assert_eq!(events.last(), Some(&AnswerEvent::Done));
        let text: String = events
            .iter()
            .filter_map(|e| match e {
                AnswerEvent::Token(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "Rust is fast and safe.");

        let log = finalized_log(&f.log_store, &query_id).await;
        assert_eq!(log.response.as_deref(), Some("Rust is fast and safe."));
        assert_eq!(log.num_results, 2);
        assert_eq!(log.provider, "ollama");
        assert_eq!(log.model, "test-model");
        assert!(log.retrieval_ms.is_some());
        assert!(log.generation_ms.is_some());
        assert!(log.total_ms.is_some());
    }

    #[tokio::test]
    async fn mid_stream_failure_is_in_band_and_logged() {
        let f = fixture(
            FakeIndex::with_hits(vec![hit("context", 0)]),
            FakeGenerator::failing_after(&["partial "]),
        );

        let answer = f.pipeline.query("q", None).await.unwrap();
        let query_id = answer.query_id.clone();
        let events: Vec<AnswerEvent> = answer.collect().await;

        assert!(matches!(events.last(), Some(AnswerEvent::Error(_))));

        let log = finalized_log(&f.log_store, &query_id).await;
        assert_eq!(log.response.as_deref(), Some("partial "));
        assert!(log.generation_ms.is_some());
    }

    #[tokio::test]
    async fn unknown_provider_override_is_rejected() {
        let f = fixture(
            FakeIndex::with_hits(vec![hit("context", 0)]),
            FakeGenerator::ok(&["x"]),
        );

        match f.pipeline.query("q", Some("gemini")).await {
            Err(QueryError::UnknownProvider(name)) => assert_eq!(name, "gemini"),
            other => panic!("expected UnknownProvider, got {:?}", other.map(|_| ())),
        }
    }
}
