//! Query telemetry model and its persistence port.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::QueryError;

/// One query's telemetry row.
///
/// Created at query start, updated as the stream progresses, finalized when
/// the stream ends or errors. Never deleted by this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryLog {
    /// Opaque unique identifier.
    pub query_id: String,
    /// The natural-language query text.
    pub query_text: String,
    /// Number of chunks retrieved.
    pub num_results: usize,
    /// Accumulated response text; `None` until fragments arrive.
    pub response: Option<String>,
    /// Vector search latency.
    pub retrieval_ms: Option<u64>,
    /// Streaming generation latency, recorded even on mid-stream failure.
    pub generation_ms: Option<u64>,
    /// Total wall-clock latency.
    pub total_ms: Option<u64>,
    /// Generation provider identifier.
    pub provider: String,
    /// Generation model identifier.
    pub model: String,
    pub created_at: DateTime<Utc>,
}

impl QueryLog {
    pub fn new(
        query_id: impl Into<String>,
        query_text: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            query_id: query_id.into(),
            query_text: query_text.into(),
            num_results: 0,
            response: None,
            retrieval_ms: None,
            generation_ms: None,
            total_ms: None,
            provider: provider.into(),
            model: model.into(),
            created_at: Utc::now(),
        }
    }
}

/// Persistence port for query telemetry.
#[async_trait]
pub trait QueryLogStore: Send + Sync {
    async fn create(&self, log: QueryLog) -> Result<(), QueryError>;
    async fn update(&self, log: &QueryLog) -> Result<(), QueryError>;
}

/// In-memory [`QueryLogStore`] for local runs and tests.
#[derive(Default)]
pub struct MemoryQueryLogStore {
    logs: RwLock<HashMap<String, QueryLog>>,
}

impl MemoryQueryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches a log row (test helper).
    pub async fn get(&self, query_id: &str) -> Option<QueryLog> {
        self.logs.read().await.get(query_id).cloned()
    }
}

#[async_trait]
impl QueryLogStore for MemoryQueryLogStore {
    async fn create(&self, log: QueryLog) -> Result<(), QueryError> {
        self.logs.write().await.insert(log.query_id.clone(), log);
        Ok(())
    }

    async fn update(&self, log: &QueryLog) -> Result<(), QueryError> {
        self.logs
            .write()
            .await
            .insert(log.query_id.clone(), log.clone());
        Ok(())
    }
}
