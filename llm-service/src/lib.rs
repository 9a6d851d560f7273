//! Shared LLM service crate.
//!
//! Provides:
//! - Capability ports for embedding and streaming generation ([`ports`]).
//! - Thin provider clients for Ollama and OpenAI ([`services`]).
//! - Profile management that selects and caches clients per configuration
//!   ([`service_profiles`]).
//! - Health checks, a library-scoped tracing layer, and unified errors.

pub mod config;
pub mod error_handler;
pub mod health_service;
pub mod ports;
pub mod service_profiles;
pub mod services;
pub mod telemetry;

pub use config::llm_model_config::LlmModelConfig;
pub use config::llm_provider::LlmProvider;
pub use error_handler::{ConfigError, LlmServiceError, Result};
pub use ports::{EmbeddingPort, GenerationPort, ProviderError, TokenStream};
pub use service_profiles::LlmServiceProfiles;
