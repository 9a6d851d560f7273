//! Thin adapter around `qdrant-client` to isolate API usage.
//!
//! This facade concentrates all Qdrant interactions behind a minimal API,
//! hiding away the verbose builder pattern and keeping the rest of the
//! application decoupled from `qdrant-client`. The [`VectorIndex`] trait is
//! what the pipelines consume, so tests can substitute an in-memory double.

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::Payload;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, Distance, Filter, PointStruct,
    ScrollPointsBuilder, SearchPointsBuilder, Value as QValue, VectorParamsBuilder,
    vectors_config,
};
use tracing::{debug, info, warn};

use crate::config::IndexConfig;
use crate::errors::IndexError;
use crate::record::{ChunkRecord, IndexStats, SearchHit};

/// Capability contract of the vector index, as consumed by the pipelines.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Idempotently ensures a collection with the given dimension exists.
    ///
    /// If a collection exists with a **different** dimension, it is
    /// destructively recreated: all stored vectors are dropped. This is
    /// documented data loss; content can be re-ingested, while silently
    /// mixed dimensions cannot be repaired.
    async fn ensure_schema(&self, dimension: usize) -> Result<(), IndexError>;

    /// Dedup check: number of chunks already stored for a content hash.
    async fn exists_by_hash(&self, hash: &str) -> Result<Option<usize>, IndexError>;

    /// Upserts records in bounded batches; returns the number written.
    ///
    /// Idempotent by record id. A partial-batch failure leaves earlier
    /// batches committed; callers re-submit the full set on retry.
    async fn upsert(&self, records: Vec<ChunkRecord>) -> Result<usize, IndexError>;

    /// Top-K similarity search, sorted by descending score.
    ///
    /// An empty or missing collection yields an empty list, never an error.
    async fn search(&self, vector: Vec<f32>, k: usize) -> Result<Vec<SearchHit>, IndexError>;

    /// Collection statistics; a missing collection counts as zero vectors.
    async fn stats(&self) -> Result<IndexStats, IndexError>;
}

/// A facade over the Qdrant client implementing [`VectorIndex`].
pub struct QdrantIndex {
    client: Qdrant,
    collection: String,
    upsert_batch: usize,
}

impl QdrantIndex {
    /// Creates a new facade from the given configuration.
    ///
    /// Uses the builder-based API of `qdrant-client` and supports optional
    /// API key authentication.
    pub fn connect(cfg: &IndexConfig) -> Result<Self, IndexError> {
        cfg.validate()?; // Early validation of config.

        let mut builder = Qdrant::from_url(&cfg.qdrant_url);
        if let Some(key) = &cfg.qdrant_api_key {
            builder = builder.api_key(key.clone());
        }
        let client = builder
            .build()
            .map_err(|e| IndexError::Qdrant(e.to_string()))?;

        Ok(Self {
            client,
            collection: cfg.collection.clone(),
            upsert_batch: cfg.upsert_batch,
        })
    }

    async fn collection_exists(&self) -> Result<bool, IndexError> {
        self.client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| IndexError::Qdrant(e.to_string()))
    }

    /// Reads the dimension of the existing collection, if determinable.
    async fn current_dimension(&self) -> Result<Option<usize>, IndexError> {
        let info = self
            .client
            .collection_info(&self.collection)
            .await
            .map_err(|e| IndexError::Qdrant(e.to_string()))?;

        Ok(info
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config)
            .and_then(|c| match c {
                vectors_config::Config::Params(p) => Some(p.size as usize),
                _ => None,
            }))
    }

    async fn create_collection(&self, dimension: usize) -> Result<(), IndexError> {
        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(dimension as u64, Distance::Cosine)),
            )
            .await
            .map_err(|e| IndexError::Qdrant(e.to_string()))?;
        info!(
            "Collection '{}' created with dimension {}",
            self.collection, dimension
        );
        Ok(())
    }

    fn hash_filter(hash: &str) -> Filter {
        Filter::must([Condition::matches("content_hash", hash.to_string())])
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn ensure_schema(&self, dimension: usize) -> Result<(), IndexError> {
        if !self.collection_exists().await? {
            return self.create_collection(dimension).await;
        }

        match self.current_dimension().await? {
            Some(current) if current == dimension => {
                debug!(
                    "Collection '{}' already has dimension {}",
                    self.collection, dimension
                );
                Ok(())
            }
            current => {
                // Dimension changed (or is unreadable): recreate. All stored
                // vectors are lost; content can be re-ingested.
                warn!(
                    "Collection '{}' has dimension {:?}, expected {}. Recreating...",
                    self.collection, current, dimension
                );
                self.client
                    .delete_collection(&self.collection)
                    .await
                    .map_err(|e| IndexError::Qdrant(e.to_string()))?;
                self.create_collection(dimension).await
            }
        }
    }

    async fn exists_by_hash(&self, hash: &str) -> Result<Option<usize>, IndexError> {
        if !self.collection_exists().await? {
            return Ok(None);
        }

        let scrolled = self
            .client
            .scroll(
                ScrollPointsBuilder::new(&self.collection)
                    .filter(Self::hash_filter(hash))
                    .limit(1),
            )
            .await
            .map_err(|e| IndexError::Qdrant(e.to_string()))?;

        if scrolled.result.is_empty() {
            return Ok(None);
        }

        let counted = self
            .client
            .count(
                CountPointsBuilder::new(&self.collection)
                    .filter(Self::hash_filter(hash))
                    .exact(true),
            )
            .await
            .map_err(|e| IndexError::Qdrant(e.to_string()))?;

        let count = counted.result.map(|r| r.count as usize).unwrap_or(0);
        debug!("Hash {} already indexed with {} chunks", hash, count);
        Ok(Some(count))
    }

    async fn upsert(&self, records: Vec<ChunkRecord>) -> Result<usize, IndexError> {
        if records.is_empty() {
            debug!("No records provided for upsert");
            return Ok(0);
        }

        // All vectors in one submission must share a single dimension.
        let want = records[0].vector.len();
        if let Some(bad) = records.iter().find(|r| r.vector.len() != want) {
            return Err(IndexError::DimensionMismatch {
                got: bad.vector.len(),
                want,
            });
        }

        info!(
            "Upserting {} records into collection '{}'",
            records.len(),
            self.collection
        );

        let mut total = 0usize;
        for batch in records.chunks(self.upsert_batch) {
            let mut points = Vec::with_capacity(batch.len());
            for record in batch {
                let as_json = serde_json::to_value(&record.payload)
                    .map_err(|e| IndexError::Qdrant(format!("payload encode: {e}")))?;
                let payload: Payload = as_json
                    .try_into()
                    .map_err(|e| IndexError::Qdrant(format!("payload convert: {e}")))?;

                points.push(PointStruct::new(
                    record.id.clone(),
                    record.vector.clone(),
                    payload,
                ));
            }

            self.client
                .upsert_points(qdrant_client::qdrant::UpsertPointsBuilder::new(
                    &self.collection,
                    points,
                ))
                .await
                .map_err(|e| IndexError::Qdrant(e.to_string()))?;

            total += batch.len();
        }

        debug!("Upsert completed: {} points written", total);
        Ok(total)
    }

    async fn search(&self, vector: Vec<f32>, k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if !self.collection_exists().await? {
            debug!("Collection '{}' missing; empty search result", self.collection);
            return Ok(Vec::new());
        }

        let res = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, vector, k as u64).with_payload(true),
            )
            .await
            .map_err(|e| IndexError::Qdrant(e.to_string()))?;

        let mut out = Vec::with_capacity(res.result.len());
        for point in res.result {
            let payload = qpayload_to_json(point.payload);
            out.push(SearchHit {
                score: point.score,
                content: payload
                    .get("content")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                source: payload
                    .get("source")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                title: payload
                    .get("title")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                chunk_index: payload
                    .get("chunk_index")
                    .and_then(|v| v.as_u64())
                    .unwrap_or_default() as usize,
                payload,
            });
        }

        debug!("Search completed: {} hits returned", out.len());
        Ok(out)
    }

    async fn stats(&self) -> Result<IndexStats, IndexError> {
        if !self.collection_exists().await? {
            return Ok(IndexStats {
                total_vectors: 0,
                collection: self.collection.clone(),
            });
        }

        let info = self
            .client
            .collection_info(&self.collection)
            .await
            .map_err(|e| IndexError::Qdrant(e.to_string()))?;

        Ok(IndexStats {
            total_vectors: info.result.and_then(|r| r.points_count).unwrap_or(0),
            collection: self.collection.clone(),
        })
    }
}

/// Converts a Qdrant payload (`HashMap<String, qdrant::Value>`) into JSON.
///
/// Unsupported nested objects/arrays are mapped to `Null`.
fn qpayload_to_json(mut p: HashMap<String, QValue>) -> serde_json::Value {
    use qdrant_client::qdrant::value::Kind as K;
    let mut m = serde_json::Map::new();
    for (k, v) in p.drain() {
        let j = match v.kind {
            Some(K::StringValue(s)) => serde_json::Value::String(s),
            Some(K::IntegerValue(i)) => serde_json::Value::Number(i.into()),
            Some(K::DoubleValue(f)) => serde_json::json!(f),
            Some(K::BoolValue(b)) => serde_json::Value::Bool(b),
            None => serde_json::Value::Null,
            // For unsupported nested types, fallback to Null for safety.
            _ => serde_json::Value::Null,
        };
        m.insert(k, j);
    }
    serde_json::Value::Object(m)
}
