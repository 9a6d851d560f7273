//! Retrieval-augmented query engine.
//!
//! A query is embedded, matched against the vector index, and answered by a
//! streaming generation call whose fragments feed two sinks at once: the
//! caller's live stream and the accumulator that finalizes the
//! [`log::QueryLog`] entry, including after mid-stream failures.

pub mod config;
pub mod errors;
pub mod log;
pub mod pipeline;
pub mod prompt;
pub mod stream;

pub use config::QueryConfig;
pub use errors::QueryError;
pub use log::{MemoryQueryLogStore, QueryLog, QueryLogStore};
pub use pipeline::QueryPipeline;
pub use stream::{AnswerEvent, AnswerStream};
