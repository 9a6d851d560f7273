//! Capability ports implemented by the provider clients.
//!
//! The pipelines depend on these traits only; which concrete backend serves
//! them is decided by configuration in [`crate::service_profiles`].

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use thiserror::Error;

/// Lazy, finite sequence of generated text fragments.
///
/// Single-consumer and not restartable. Dropping the stream cancels the
/// upstream request, so no tokens are produced for an abandoned caller.
pub type TokenStream = Pin<Box<dyn Stream<Item = std::result::Result<String, ProviderError>> + Send>>;

/// Typed provider failure surfaced to callers instead of raw transport errors.
///
/// Callers decide retry policy; this crate only classifies.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Provider could not be reached or answered with a server-side failure.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// Provider rejected the call due to rate limiting (HTTP 429).
    #[error("provider rate limited: {0}")]
    RateLimited(String),

    /// Provider answered, but the payload could not be interpreted.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

/// Text → fixed-length float vector.
#[async_trait]
pub trait EmbeddingPort: Send + Sync {
    /// Embeds a single text.
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError>;

    /// Embeds a batch, order-preserving, same length as the input.
    ///
    /// Fails atomically: if any item fails, no partial batch is returned.
    async fn embed_batch(
        &self,
        texts: &[String],
    ) -> std::result::Result<Vec<Vec<f32>>, ProviderError>;
}

/// Prompt → streaming text fragments.
#[async_trait]
pub trait GenerationPort: Send + Sync {
    /// Opens a streaming generation call for the given prompt.
    ///
    /// Fragments arrive strictly in production order.
    async fn generate_stream(&self, prompt: &str) -> std::result::Result<TokenStream, ProviderError>;

    /// Provider identifier for telemetry (e.g. `"ollama"`).
    fn provider_id(&self) -> &str;

    /// Model identifier for telemetry (e.g. `"qwen3:14b"`).
    fn model_id(&self) -> &str;
}
