//! Provider health checks.
//!
//! Pings each configured profile endpoint with a cheap request and reports a
//! provider-agnostic [`HealthStatus`]. A failing check never errors the
//! caller; it is reported as `healthy: false` with a detail string.

use std::time::Duration;

use tracing::debug;

use crate::config::llm_model_config::LlmModelConfig;
use crate::config::llm_provider::LlmProvider;
use crate::error_handler::LlmServiceError;
use crate::ports::ProviderError;

/// Result of one profile health probe.
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Provider name (`"ollama"`, `"openai"`).
    pub provider: String,
    /// Model identifier of the probed profile.
    pub model: String,
    /// Probed endpoint.
    pub endpoint: String,
    /// Whether the endpoint answered successfully.
    pub healthy: bool,
    /// Short failure detail when unhealthy.
    pub detail: Option<String>,
}

/// Health checker with its own short-timeout HTTP client.
pub struct HealthService {
    client: reqwest::Client,
}

impl HealthService {
    /// Creates a checker; `timeout_secs` defaults to 5.
    pub fn new(timeout_secs: Option<u64>) -> Result<Self, LlmServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.unwrap_or(5)))
            .build()
            .map_err(|e| {
                LlmServiceError::from(ProviderError::Unavailable(format!(
                    "http client build: {e}"
                )))
            })?;
        Ok(Self { client })
    }

    /// Probes every config in the list.
    pub async fn check_many(&self, configs: &[LlmModelConfig]) -> Vec<HealthStatus> {
        let mut out = Vec::with_capacity(configs.len());
        for cfg in configs {
            out.push(self.check_one(cfg).await);
        }
        out
    }

    async fn check_one(&self, cfg: &LlmModelConfig) -> HealthStatus {
        let base = cfg.endpoint.trim_end_matches('/');
        let url = match cfg.provider {
            LlmProvider::Ollama => format!("{base}/api/tags"),
            LlmProvider::OpenAi => format!("{base}/v1/models"),
        };

        debug!("health probe {url}");
        let mut req = self.client.get(&url);
        if let Some(key) = &cfg.api_key {
            req = req.bearer_auth(key);
        }

        let (healthy, detail) = match req.send().await {
            Ok(resp) if resp.status().is_success() => (true, None),
            Ok(resp) => (false, Some(format!("HTTP {}", resp.status()))),
            Err(e) => (false, Some(e.to_string())),
        };

        HealthStatus {
            provider: cfg.provider.as_str().to_string(),
            model: cfg.model.clone(),
            endpoint: cfg.endpoint.clone(),
            healthy,
            detail,
        }
    }
}
