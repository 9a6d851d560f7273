//! Shared LLM service with two active profiles: `generation` and `embedding`.
//!
//! - Lives in the same Tokio runtime as the application.
//! - Construct once, wrap in `Arc`, and pass clones to dependents.
//! - Caches underlying HTTP clients per config (endpoint+model+key+timeout).
//! - Optional alternate generation profiles allow a per-query provider
//!   override without rebuilding the service.

use std::{
    collections::HashMap,
    hash::{Hash, Hasher},
    sync::Arc,
};

use tokio::sync::RwLock;

use crate::config::llm_model_config::LlmModelConfig;
use crate::config::llm_provider::LlmProvider;
use crate::error_handler::{ConfigError, LlmServiceError};
use crate::health_service::{HealthService, HealthStatus};
use crate::ports::{EmbeddingPort, GenerationPort};
use crate::services::ollama_service::OllamaService;
use crate::services::open_ai_service::OpenAiService;

/// Shared service that manages the **generation** and **embedding** profiles.
///
/// Internally, it caches Ollama/OpenAI clients keyed by their configuration
/// to avoid recreating HTTP clients on each call.
pub struct LlmServiceProfiles {
    generation: LlmModelConfig,
    embedding: LlmModelConfig,
    alternates: HashMap<LlmProvider, LlmModelConfig>,

    ollama: RwLock<HashMap<ClientKey, Arc<OllamaService>>>,
    openai: RwLock<HashMap<ClientKey, Arc<OpenAiService>>>,

    health: HealthService,
}

impl LlmServiceProfiles {
    /// Creates a new service with the two required profiles.
    ///
    /// - `generation`: profile used for answer generation.
    /// - `embedding`: profile used for vector embeddings.
    /// - `alternates`: optional per-provider generation profiles selectable
    ///   by name at query time.
    pub fn new(
        generation: LlmModelConfig,
        embedding: LlmModelConfig,
        alternates: Vec<LlmModelConfig>,
    ) -> Result<Self, LlmServiceError> {
        let alternates = alternates
            .into_iter()
            .map(|cfg| (cfg.provider, cfg))
            .collect();

        Ok(Self {
            generation,
            embedding,
            alternates,
            ollama: RwLock::new(HashMap::new()),
            openai: RwLock::new(HashMap::new()),
            health: HealthService::new(None)?,
        })
    }

    /// Returns the embedding capability for the **embedding** profile.
    ///
    /// # Errors
    /// Returns [`LlmServiceError`] if the underlying client cannot be built.
    pub async fn embedder(&self) -> Result<Arc<dyn EmbeddingPort>, LlmServiceError> {
        let cfg = self.embedding.clone();
        match cfg.provider {
            LlmProvider::Ollama => Ok(self.get_or_init_ollama(&cfg).await?),
            LlmProvider::OpenAi => Ok(self.get_or_init_openai(&cfg).await?),
        }
    }

    /// Returns the generation capability for the default profile, or for the
    /// named provider when `provider_override` is set.
    ///
    /// # Errors
    /// Returns [`ConfigError::UnsupportedProvider`] when the override names
    /// a provider with no configured profile.
    pub async fn generator(
        &self,
        provider_override: Option<&str>,
    ) -> Result<Arc<dyn GenerationPort>, LlmServiceError> {
        let cfg = match provider_override {
            None => self.generation.clone(),
            Some(name) => {
                let provider = LlmProvider::parse(name)
                    .ok_or_else(|| ConfigError::UnsupportedProvider(name.to_string()))?;
                if provider == self.generation.provider {
                    self.generation.clone()
                } else {
                    self.alternates
                        .get(&provider)
                        .cloned()
                        .ok_or_else(|| ConfigError::UnsupportedProvider(name.to_string()))?
                }
            }
        };

        match cfg.provider {
            LlmProvider::Ollama => Ok(self.get_or_init_ollama(&cfg).await?),
            LlmProvider::OpenAi => Ok(self.get_or_init_openai(&cfg).await?),
        }
    }

    /// Returns a health snapshot for all distinct profiles.
    ///
    /// If the embedding profile equals the generation profile, it is checked
    /// only once.
    pub async fn health_all(&self) -> Vec<HealthStatus> {
        let mut list = Vec::<LlmModelConfig>::with_capacity(2);
        list.push(self.generation.clone());
        if self.embedding != self.generation {
            list.push(self.embedding.clone());
        }
        self.health.check_many(&list).await
    }

    /// Returns references to the current profiles `(generation, embedding)`.
    pub fn profiles(&self) -> (&LlmModelConfig, &LlmModelConfig) {
        (&self.generation, &self.embedding)
    }

    /* --------------------- Internals --------------------- */

    async fn get_or_init_ollama(
        &self,
        cfg: &LlmModelConfig,
    ) -> Result<Arc<OllamaService>, LlmServiceError> {
        let key = ClientKey::from(cfg);
        if let Some(cli) = self.ollama.read().await.get(&key).cloned() {
            return Ok(cli);
        }
        let mut w = self.ollama.write().await;
        if let Some(cli) = w.get(&key).cloned() {
            return Ok(cli);
        }
        let cli = Arc::new(OllamaService::new(cfg.clone())?);
        w.insert(key, cli.clone());
        Ok(cli)
    }

    async fn get_or_init_openai(
        &self,
        cfg: &LlmModelConfig,
    ) -> Result<Arc<OpenAiService>, LlmServiceError> {
        let key = ClientKey::from(cfg);
        if let Some(cli) = self.openai.read().await.get(&key).cloned() {
            return Ok(cli);
        }
        let mut w = self.openai.write().await;
        if let Some(cli) = w.get(&key).cloned() {
            return Ok(cli);
        }
        let cli = Arc::new(OpenAiService::new(cfg.clone())?);
        w.insert(key, cli.clone());
        Ok(cli)
    }
}

/// Internal cache key to identify unique client configs.
#[derive(Clone, Eq)]
struct ClientKey {
    provider: LlmProvider,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout: Option<u64>,
}

impl From<&LlmModelConfig> for ClientKey {
    fn from(cfg: &LlmModelConfig) -> Self {
        Self {
            provider: cfg.provider,
            endpoint: cfg.endpoint.clone(),
            model: cfg.model.clone(),
            api_key: cfg.api_key.clone(),
            timeout: cfg.timeout_secs,
        }
    }
}

impl PartialEq for ClientKey {
    fn eq(&self, other: &Self) -> bool {
        self.provider == other.provider
            && self.endpoint == other.endpoint
            && self.model == other.model
            && self.api_key == other.api_key
            && self.timeout == other.timeout
    }
}

impl Hash for ClientKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.provider.hash(state);
        self.endpoint.hash(state);
        self.model.hash(state);
        if let Some(ref k) = self.api_key {
            k.hash(state);
        } else {
            0usize.hash(state);
        }
        self.timeout.hash(state);
    }
}
