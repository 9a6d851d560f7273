//! Environment-driven construction of the default profiles.
//!
//! Variables:
//! - `GENERATION_PROVIDER` / `EMBEDDING_PROVIDER`: `ollama` or `openai`.
//! - `GENERATION_MODEL` / `EMBEDDING_MODEL`: model identifiers.
//! - `OLLAMA_URL`: Ollama endpoint (required when a profile uses Ollama).
//! - `OPENAI_API_KEY`: key for OpenAI-backed profiles.
//! - `LLM_MAX_TOKENS`, `LLM_TEMPERATURE`, `LLM_TIMEOUT_SECS`: optional knobs.

use crate::config::llm_model_config::LlmModelConfig;
use crate::config::llm_provider::LlmProvider;
use crate::error_handler::{
    ConfigError, Result, env_opt, env_opt_f32, env_opt_u32, must_env, validate_http_endpoint,
};

const OPENAI_ENDPOINT: &str = "https://api.openai.com";

/// Builds the generation profile from the environment.
///
/// # Errors
/// Returns [`ConfigError`] variants for missing/invalid variables.
pub fn generation_from_env() -> Result<LlmModelConfig> {
    profile_from_env("GENERATION_PROVIDER", "GENERATION_MODEL")
}

/// Builds the embedding profile from the environment.
///
/// # Errors
/// Returns [`ConfigError`] variants for missing/invalid variables.
pub fn embedding_from_env() -> Result<LlmModelConfig> {
    profile_from_env("EMBEDDING_PROVIDER", "EMBEDDING_MODEL")
}

fn profile_from_env(provider_var: &'static str, model_var: &'static str) -> Result<LlmModelConfig> {
    let provider_name = must_env(provider_var)?;
    let provider = LlmProvider::parse(&provider_name)
        .ok_or(ConfigError::UnsupportedProvider(provider_name))?;

    let model = must_env(model_var)?;
    if model.trim().is_empty() {
        return Err(ConfigError::EmptyModel.into());
    }

    let (endpoint, api_key) = match provider {
        LlmProvider::Ollama => {
            let url = must_env("OLLAMA_URL")?;
            validate_http_endpoint("OLLAMA_URL", &url)?;
            (url, None)
        }
        LlmProvider::OpenAi => (OPENAI_ENDPOINT.to_string(), Some(must_env("OPENAI_API_KEY")?)),
    };

    Ok(LlmModelConfig {
        provider,
        model,
        endpoint,
        api_key,
        max_tokens: env_opt_u32("LLM_MAX_TOKENS")?,
        temperature: env_opt_f32("LLM_TEMPERATURE")?,
        top_p: None,
        timeout_secs: env_opt_u32("LLM_TIMEOUT_SECS")?.map(u64::from),
    })
}

/// Optional alternate generation profile for a named provider.
///
/// Used for per-query provider overrides: the alternate reuses the default
/// generation model variables of that provider, returning `None` when the
/// environment carries no configuration for it.
pub fn alternate_generation_from_env(provider: LlmProvider) -> Option<LlmModelConfig> {
    let model = match provider {
        LlmProvider::Ollama => env_opt("OLLAMA_GENERATION_MODEL")?,
        LlmProvider::OpenAi => env_opt("OPENAI_GENERATION_MODEL")?,
    };
    let (endpoint, api_key) = match provider {
        LlmProvider::Ollama => (env_opt("OLLAMA_URL")?, None),
        LlmProvider::OpenAi => (OPENAI_ENDPOINT.to_string(), Some(env_opt("OPENAI_API_KEY")?)),
    };
    Some(LlmModelConfig {
        provider,
        model,
        endpoint,
        api_key,
        max_tokens: None,
        temperature: None,
        top_p: None,
        timeout_secs: None,
    })
}
