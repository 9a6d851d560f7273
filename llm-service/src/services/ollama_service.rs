//! Lightweight Ollama client for streaming generation and embeddings.
//!
//! This module implements a thin client for the local Ollama API:
//! - `POST {endpoint}/api/generate`   — text generation (`stream=true`, NDJSON)
//! - `POST {endpoint}/api/embeddings` — embeddings retrieval
//!
//! It uses the universal configuration [`LlmModelConfig`] and ensures that
//! the selected provider is [`LlmProvider::Ollama`]. Transport and protocol
//! failures are classified into [`ProviderError`] so callers never see raw
//! `reqwest` errors.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, instrument, warn};

use crate::config::llm_model_config::LlmModelConfig;
use crate::config::llm_provider::LlmProvider;
use crate::error_handler::{ConfigError, LlmServiceError};
use crate::ports::{EmbeddingPort, GenerationPort, ProviderError, TokenStream};

/// Thin client for Ollama.
///
/// Initialized with a full [`LlmModelConfig`]. Reuses an HTTP client with a
/// configurable timeout.
pub struct OllamaService {
    client: reqwest::Client,
    cfg: LlmModelConfig,
    url_generate: String,
    url_embeddings: String,
}

impl OllamaService {
    /// Creates a new [`OllamaService`] from the given config.
    ///
    /// # Errors
    /// - [`ConfigError::UnsupportedProvider`] if `cfg.provider` is not Ollama
    /// - [`ConfigError::InvalidFormat`] if `cfg.endpoint` is invalid
    pub fn new(cfg: LlmModelConfig) -> Result<Self, LlmServiceError> {
        if cfg.provider != LlmProvider::Ollama {
            return Err(ConfigError::UnsupportedProvider(cfg.provider.as_str().to_string()).into());
        }

        let endpoint = cfg.endpoint.trim();
        if endpoint.is_empty()
            || !(endpoint.starts_with("http://") || endpoint.starts_with("https://"))
        {
            return Err(ConfigError::InvalidFormat {
                var: "endpoint",
                reason: "must start with http:// or https://",
            }
            .into());
        }

        let timeout = cfg
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(120));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                LlmServiceError::from(ProviderError::Unavailable(format!(
                    "http client build: {e}"
                )))
            })?;

        let base = endpoint.trim_end_matches('/').to_string();
        let url_generate = format!("{base}/api/generate");
        let url_embeddings = format!("{base}/api/embeddings");

        Ok(Self {
            client,
            cfg,
            url_generate,
            url_embeddings,
        })
    }

    async fn embed_one(&self, input: &str) -> Result<Vec<f32>, ProviderError> {
        let body = EmbeddingsRequest {
            model: &self.cfg.model,
            prompt: input,
        };

        debug!("POST {}", self.url_embeddings);
        let resp = self
            .client
            .post(&self.url_embeddings)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let resp = check_status(resp, &self.url_embeddings).await?;

        let out: EmbeddingsResponse = resp.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("embeddings decode: {e}"))
        })?;

        Ok(out.embedding)
    }
}

#[async_trait]
impl EmbeddingPort for OllamaService {
    #[instrument(skip_all, fields(model = %self.cfg.model))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.embed_one(text).await
    }

    #[instrument(skip_all, fields(model = %self.cfg.model, batch = texts.len()))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        // The embeddings endpoint takes one input per call; the batch fails
        // atomically on the first error so no partial result escapes.
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed_one(text).await?);
        }
        Ok(out)
    }
}

#[async_trait]
impl GenerationPort for OllamaService {
    /// Opens a streaming generation call via `/api/generate`.
    ///
    /// Ollama answers with NDJSON: one JSON object per line, the terminal
    /// line carrying `done: true`. Lines may arrive split across body
    /// chunks, so the reader keeps a carry-over buffer.
    #[instrument(skip_all, fields(model = %self.cfg.model))]
    async fn generate_stream(&self, prompt: &str) -> Result<TokenStream, ProviderError> {
        let body = GenerateRequest::from_cfg(&self.cfg, prompt);

        debug!("POST {} (stream)", self.url_generate);
        let resp = self
            .client
            .post(&self.url_generate)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let resp = check_status(resp, &self.url_generate).await?;

        let (tx, rx) = mpsc::channel::<Result<String, ProviderError>>(32);
        tokio::spawn(forward_ndjson(resp, tx));

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    fn provider_id(&self) -> &str {
        self.cfg.provider.as_str()
    }

    fn model_id(&self) -> &str {
        &self.cfg.model
    }
}

/// Reads the NDJSON body and forwards fragments into the channel.
///
/// Stops as soon as the receiver is dropped, which drops the response body
/// and closes the upstream connection.
async fn forward_ndjson(
    resp: reqwest::Response,
    tx: mpsc::Sender<Result<String, ProviderError>>,
) {
    use futures_util::StreamExt;

    let mut body = resp.bytes_stream();
    let mut carry = String::new();

    while let Some(chunk) = body.next().await {
        let bytes = match chunk {
            Ok(b) => b,
            Err(e) => {
                let _ = tx
                    .send(Err(ProviderError::Unavailable(format!("stream read: {e}"))))
                    .await;
                return;
            }
        };

        carry.push_str(&String::from_utf8_lossy(&bytes));

        while let Some(pos) = carry.find('\n') {
            let line: String = carry.drain(..=pos).collect();
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<StreamChunk>(line) {
                Ok(part) => {
                    if !part.response.is_empty()
                        && tx.send(Ok(part.response)).await.is_err()
                    {
                        // Consumer gone; cancel upstream by returning.
                        return;
                    }
                    if part.done {
                        return;
                    }
                }
                Err(e) => {
                    warn!("undecodable stream line: {e}");
                    let _ = tx
                        .send(Err(ProviderError::InvalidResponse(format!(
                            "stream decode: {e}"
                        ))))
                        .await;
                    return;
                }
            }
        }
    }
}

/// Maps a `reqwest` transport failure into the typed taxonomy.
fn transport_error(e: reqwest::Error) -> ProviderError {
    ProviderError::Unavailable(format!("transport: {e}"))
}

/// Classifies non-2xx responses; passes successful responses through.
async fn check_status(
    resp: reqwest::Response,
    url: &str,
) -> Result<reqwest::Response, ProviderError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let text = resp.text().await.unwrap_or_default();
    let snippet: String = text.chars().take(240).collect();

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ProviderError::RateLimited(format!("{url}: {snippet}")));
    }
    Err(ProviderError::Unavailable(format!(
        "HTTP {status} from {url}: {snippet}"
    )))
}

/* ==========================
HTTP payloads & options
========================== */

/// Request body for `/api/generate` (streaming).
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateOptions>,
}

impl<'a> GenerateRequest<'a> {
    /// Builds a request from config and prompt.
    fn from_cfg(cfg: &'a LlmModelConfig, prompt: &'a str) -> Self {
        let options = GenerateOptions {
            temperature: cfg.temperature,
            top_p: cfg.top_p,
            num_predict: cfg.max_tokens,
        };

        Self {
            model: &cfg.model,
            prompt,
            stream: true,
            options: Some(options),
        }
    }
}

/// Subset of Ollama `options`.
#[derive(Debug, Default, Serialize)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// One NDJSON line of the streaming `/api/generate` response.
#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

/// Request body for `/api/embeddings`.
#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

/// Response body for `/api/embeddings`.
#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}
