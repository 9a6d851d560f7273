//! Content-addressed vector index over Qdrant.
//!
//! This crate provides a clean API to:
//! - Ensure a collection with a consistent vector dimension (recreating it
//!   destructively when the dimension changes)
//! - Check whether a document hash is already indexed (dedup fast path)
//! - Upsert chunk vectors in bounded batches
//! - Retrieve top-K hits for a query vector
//!
//! The design is flat (no deep nesting) and splits responsibilities into
//! focused modules.

mod config;
mod errors;
mod index;
mod record;

pub use config::IndexConfig;
pub use errors::IndexError;
pub use index::{QdrantIndex, VectorIndex};
pub use record::{ChunkPayload, ChunkRecord, IndexStats, SearchHit};
