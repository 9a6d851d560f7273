//! Minimal OpenAI REST client for streaming chat completions and embeddings.
//!
//! - `POST {endpoint}/v1/chat/completions` — chat completion (`stream=true`, SSE)
//! - `POST {endpoint}/v1/embeddings`       — batched embeddings
//!
//! Like the Ollama client, every failure is classified into
//! [`ProviderError`]; HTTP 429 maps to `RateLimited`.

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

/// Thin client for the OpenAI API.
pub struct OpenAiService {
    client: reqwest::Client,
    cfg: LlmModelConfig,
    url_chat: String,
    url_embeddings: String,
}

impl OpenAiService {
    /// Creates a new [`OpenAiService`] from the given config.
    ///
    /// # Errors
    /// - [`ConfigError::UnsupportedProvider`] if `cfg.provider` is not OpenAI
    /// - [`ConfigError::MissingVar`] if no API key is configured
    pub fn new(cfg: LlmModelConfig) -> Result<Self, LlmServiceError> {
        if cfg.provider != LlmProvider::OpenAi {
            return Err(ConfigError::UnsupportedProvider(cfg.provider.as_str().to_string()).into());
        }
        if cfg.api_key.as_deref().map(str::trim).unwrap_or("").is_empty() {
            return Err(ConfigError::MissingVar("OPENAI_API_KEY").into());
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

        let base = cfg.endpoint.trim_end_matches('/').to_string();
        let url_chat = format!("{base}/v1/chat/completions");
        let url_embeddings = format!("{base}/v1/embeddings");

        Ok(Self {
            client,
            cfg,
            url_chat,
            url_embeddings,
        })
    }

    fn bearer(&self) -> &str {
        self.cfg.api_key.as_deref().unwrap_or_default()
    }
}

#[async_trait]
impl EmbeddingPort for OpenAiService {
    #[instrument(skip_all, fields(model = %self.cfg.model))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let input = [text.to_string()];
        let mut vectors = self.embed_batch(&input).await?;
        vectors
            .pop()
            .ok_or_else(|| ProviderError::InvalidResponse("empty embeddings data".into()))
    }

    #[instrument(skip_all, fields(model = %self.cfg.model, batch = texts.len()))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let body = EmbeddingsRequest {
            model: &self.cfg.model,
            input: texts,
        };

        debug!("POST {}", self.url_embeddings);
        let resp = self
            .client
            .post(&self.url_embeddings)
            .bearer_auth(self.bearer())
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let resp = check_status(resp, &self.url_embeddings).await?;

        let out: EmbeddingsResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("embeddings decode: {e}")))?;

        if out.data.len() != texts.len() {
            return Err(ProviderError::InvalidResponse(format!(
                "embeddings count mismatch: got {}, want {}",
                out.data.len(),
                texts.len()
            )));
        }

        // The API may reorder items; `index` restores input order.
        let mut data = out.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl GenerationPort for OpenAiService {
    /// Opens a streaming chat completion (`stream=true`, SSE framing).
    #[instrument(skip_all, fields(model = %self.cfg.model))]
    async fn generate_stream(&self, prompt: &str) -> Result<TokenStream, ProviderError> {
        let body = ChatRequest {
            model: &self.cfg.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: true,
            max_tokens: self.cfg.max_tokens,
            temperature: self.cfg.temperature,
            top_p: self.cfg.top_p,
        };

        debug!("POST {} (stream)", self.url_chat);
        let resp = self
            .client
            .post(&self.url_chat)
            .bearer_auth(self.bearer())
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let resp = check_status(resp, &self.url_chat).await?;

        let (tx, rx) = mpsc::channel::<Result<String, ProviderError>>(32);
        tokio::spawn(forward_sse(resp, tx));

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    fn provider_id(&self) -> &str {
        self.cfg.provider.as_str()
    }

    fn model_id(&self) -> &str {
        &self.cfg.model
    }
}

/// Reads the SSE body (`data: {json}` lines, `data: [DONE]` terminator) and
/// forwards content deltas into the channel.
async fn forward_sse(resp: reqwest::Response, tx: mpsc::Sender<Result<String, ProviderError>>) {
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

            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data.is_empty() {
                continue;
            }
            if data == "[DONE]" {
                return;
            }

            match serde_json::from_str::<ChatStreamChunk>(data) {
                Ok(part) => {
                    let Some(choice) = part.choices.into_iter().next() else {
                        continue;
                    };
                    if let Some(content) = choice.delta.content {
                        if !content.is_empty() && tx.send(Ok(content)).await.is_err() {
                            // Consumer gone; cancel upstream by returning.
                            return;
                        }
                    }
                    if choice.finish_reason.is_some() {
                        return;
                    }
                }
                Err(e) => {
                    warn!("undecodable SSE line: {e}");
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

fn transport_error(e: reqwest::Error) -> ProviderError {
    ProviderError::Unavailable(format!("transport: {e}"))
}

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
HTTP payloads
========================== */

/// Request body for `/v1/chat/completions` (streaming).
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// One SSE payload of the streaming chat response.
#[derive(Debug, Deserialize)]
struct ChatStreamChunk {
    #[serde(default)]
    choices: Vec<ChatStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatStreamChoice {
    #[serde(default)]
    delta: ChatDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Request body for `/v1/embeddings`.
#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

/// Response body for `/v1/embeddings`.
#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}
