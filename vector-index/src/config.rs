//! Runtime and collection configuration.

use crate::errors::IndexError;

/// Configuration for the Qdrant-backed vector index.
#[derive(Clone, Debug)]
pub struct IndexConfig {
    /// Qdrant gRPC endpoint, e.g. `http://localhost:6334`.
    pub qdrant_url: String,
    /// Optional API key for Qdrant Cloud.
    pub qdrant_api_key: Option<String>,
    /// Target collection name.
    pub collection: String,
    /// Upsert batch size per round-trip (provider payload limit).
    pub upsert_batch: usize,
}

impl IndexConfig {
    /// Creates a sane default config for a given collection name and
    /// Qdrant endpoint.
    pub fn new_default(url: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            qdrant_url: url.into(),
            qdrant_api_key: None,
            collection: collection.into(),
            upsert_batch: 100,
        }
    }

    /// Validates config values.
    pub fn validate(&self) -> Result<(), IndexError> {
        if self.qdrant_url.trim().is_empty() {
            return Err(IndexError::Config("qdrant_url is empty".into()));
        }
        if self.collection.trim().is_empty() {
            return Err(IndexError::Config("collection is empty".into()));
        }
        if self.upsert_batch == 0 || self.upsert_batch > 100 {
            return Err(IndexError::Config(
                "upsert_batch must be in 1..=100".into(),
            ));
        }
        Ok(())
    }
}
