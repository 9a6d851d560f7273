//! Core data models stored in and returned from the index.

use serde::{Deserialize, Serialize};

/// Payload persisted alongside every chunk vector.
///
/// Keys are stable: `content`, `source`, `title`, `chunk_index`,
/// `content_hash`, `job_id`. Chunk order within a document is carried by
/// `chunk_index`, never derived from insertion order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkPayload {
    /// Chunk text used for retrieval context.
    pub content: String,
    /// Source URL of the owning document.
    pub source: String,
    /// Document title.
    pub title: String,
    /// Zero-based position of the chunk within its document.
    pub chunk_index: usize,
    /// SHA-256 hex of the full normalized document text.
    pub content_hash: String,
    /// Ingestion job that produced this chunk.
    pub job_id: String,
}

/// A vector plus payload, ready for upsert.
///
/// `id` must be deterministic for idempotent re-submission (the pipelines
/// derive it from `content_hash` and `chunk_index`).
#[derive(Clone, Debug)]
pub struct ChunkRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

/// A single retrieval hit, sorted by descending similarity.
#[derive(Clone, Debug)]
pub struct SearchHit {
    pub score: f32,
    pub content: String,
    pub source: String,
    pub title: String,
    pub chunk_index: usize,
    /// Full payload for callers that need more than the canon fields.
    pub payload: serde_json::Value,
}

/// Collection-level statistics.
#[derive(Clone, Debug)]
pub struct IndexStats {
    /// Number of vectors currently stored.
    pub total_vectors: u64,
    /// Collection identity.
    pub collection: String,
}
