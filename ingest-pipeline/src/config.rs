//! Pipeline configuration.

use std::time::Duration;

/// Knobs for chunking, retries, and processing deadlines.
#[derive(Clone, Debug)]
pub struct IngestConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters.
    pub chunk_overlap: usize,
    /// Number of texts per embedding batch call.
    pub embed_batch: usize,
    /// Maximum scheduled retries before a job fails terminally.
    pub max_retries: u32,
    /// Base retry delay; attempt `n` waits `retry_base × (n + 1)`.
    pub retry_base: Duration,
    /// Soft processing ceiling: elapsed jobs take the retry path.
    pub soft_timeout: Duration,
    /// Hard processing ceiling: elapsed jobs are abandoned to the
    /// external cleanup sweep.
    pub hard_timeout: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            embed_batch: 32,
            max_retries: 3,
            retry_base: Duration::from_secs(60),
            soft_timeout: Duration::from_secs(9 * 60),
            hard_timeout: Duration::from_secs(10 * 60),
        }
    }
}
