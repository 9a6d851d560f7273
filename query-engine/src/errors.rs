//! Unified error types for the crate.
//!
//! Only failures **before** streaming starts surface here; once fragments
//! flow, errors travel in-band as [`crate::stream::AnswerEvent::Error`]
//! because the transport has already committed to success.

use thiserror::Error;

use llm_service::ProviderError;
use vector_index::IndexError;

/// Top-level error for query operations.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The vector index holds no vectors at all; nothing to retrieve from.
    #[error("knowledge base is empty, ingest documents first")]
    EmptyCorpus,

    /// The index has content, but nothing relevant matched the query.
    #[error("no relevant content found for the query")]
    NoRelevantContent,

    /// The requested generation provider is not configured.
    #[error("unknown generation provider: {0}")]
    UnknownProvider(String),

    /// Query embedding failed.
    #[error("query embedding failed: {0}")]
    Embedding(ProviderError),

    /// Vector search failed.
    #[error("vector search failed: {0}")]
    Index(#[from] IndexError),

    /// The streaming generation call failed before producing anything.
    #[error("generation failed to start: {0}")]
    Generation(ProviderError),

    /// Query log persistence failed.
    #[error("query log store error: {0}")]
    Log(String),
}
