// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Ollama provider adapter for local models.
//!
//! Roles pass through unchanged. Streaming is newline-delimited JSON with a
//! `done` flag; the adapter yields every chunk and ends on `done = true` or
//! server EOF. Embeddings use `/api/embed` with `/api/embeddings` as the
//! legacy fallback for older servers.

use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "telemetry")]
use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use crate::error::ProviderError;
use crate::types::{
    ChatRequest, ChatResponse, ChatStream, ClientConfig, CompletionRequest, LlmClient, Role,
};

use super::rate_limit::RateLimiter;
use super::retry::{with_retry, RetryPolicy};
use super::sse::LineReader;

/// Default endpoint for a local Ollama server.
const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Default request timeout in seconds; local models can be slow to load.
const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Ollama adapter.
#[derive(Clone)]
pub struct OllamaClient {
    http: Client,
    model: String,
    embedding_model: String,
    base_url: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    top_p: Option<f32>,
    top_k: Option<u32>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl OllamaClient {
    /// Create an adapter from configuration. No API key required.
    pub fn new(config: &ClientConfig, limiter: Arc<RateLimiter>) -> Result<Self, ProviderError> {
        let timeout = config
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            model: config.model.clone().unwrap_or_else(|| "llama3.2".to_string()),
            embedding_model: config
                .embedding_model
                .clone()
                .unwrap_or_else(|| "nomic-embed-text".to_string()),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
            top_k: config.top_k,
            limiter,
            retry: RetryPolicy::with_max_retries(config.max_retries.unwrap_or(3)),
        })
    }

    fn build_body(&self, request: &ChatRequest, stream: bool) -> OllamaChatRequest {
        let messages = request
            .messages
            .iter()
            .map(|m| WireMessage {
                role: match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::System => "system",
                }
                .to_string(),
                content: m.content.clone(),
            })
            .collect();

        OllamaChatRequest {
            model: request.model.clone().unwrap_or_else(|| self.model.clone()),
            messages,
            stream,
            options: OllamaOptions {
                temperature: request.temperature.or(self.temperature),
                top_p: request.options.top_p.or(self.top_p),
                top_k: request.options.top_k.or(self.top_k),
                num_predict: request.max_tokens.or(self.max_tokens),
            },
        }
    }

    async fn post(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(ProviderError::from)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), text));
        }
        Ok(response)
    }

    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let body = self.build_body(request, false);
        let response = self.post("/api/chat", &body).await?;

        let api: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        Ok(ChatResponse::full(
            api.message.map(|m| m.content).unwrap_or_default(),
            api.model,
        ))
    }

    async fn run_stream(self, request: ChatRequest, tx: mpsc::Sender<ChatResponse>) {
        let model = request.model.clone().unwrap_or_else(|| self.model.clone());
        let body = self.build_body(&request, true);
        let mut attempt = 0u32;

        loop {
            let response = match self.post("/api/chat", &body).await {
                Ok(response) => response,
                Err(err) => {
                    if err.is_retryable() && attempt < self.retry.max_retries {
                        tokio::time::sleep(self.retry.delay_for(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    let _ = tx.send(ChatResponse::failed(err.to_string(), &model)).await;
                    return;
                }
            };

            match self.forward_stream(response, &model, &tx).await {
                Forward::Done | Forward::ConsumerGone => return,
                Forward::Failed { err, delivered } => {
                    if !delivered && err.is_retryable() && attempt < self.retry.max_retries {
                        tokio::time::sleep(self.retry.delay_for(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    let _ = tx.send(ChatResponse::failed(err.to_string(), &model)).await;
                    return;
                }
            }
        }
    }

    async fn forward_stream(
        &self,
        response: reqwest::Response,
        model: &str,
        tx: &mpsc::Sender<ChatResponse>,
    ) -> Forward {
        let mut reader = LineReader::new(response);
        let mut delivered = false;

        loop {
            let line = match reader.next_line().await {
                Ok(Some(line)) => line,
                // Server EOF ends the sequence even without done=true.
                Ok(None) => break,
                Err(err) => return Forward::Failed { err, delivered },
            };

            if line.trim().is_empty() {
                continue;
            }

            let chunk: OllamaChatResponse = match serde_json::from_str(&line) {
                Ok(chunk) => chunk,
                Err(_) => continue,
            };

            if chunk.done {
                let _ = tx.send(ChatResponse::full("", model)).await;
                return Forward::Done;
            }

            let text = chunk.message.map(|m| m.content).unwrap_or_default();
            if !text.is_empty() {
                if tx.send(ChatResponse::delta(text, model)).await.is_err() {
                    return Forward::ConsumerGone;
                }
                delivered = true;
            }
        }

        let _ = tx.send(ChatResponse::full("", model)).await;
        Forward::Done
    }

    /// Embed via `/api/embed`; on 404 fall back to the legacy
    /// `/api/embeddings` endpoint one text at a time.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let body = EmbedRequest {
            model: self.embedding_model.clone(),
            input: texts.to_vec(),
        };

        match self.post("/api/embed", &body).await {
            Ok(response) => {
                let api: EmbedResponse = response
                    .json()
                    .await
                    .map_err(|e| ProviderError::Parse(e.to_string()))?;
                if api.embeddings.len() != texts.len() {
                    return Err(ProviderError::Parse(format!(
                        "embedding count mismatch: {} inputs, {} outputs",
                        texts.len(),
                        api.embeddings.len()
                    )));
                }
                Ok(api.embeddings)
            }
            Err(ProviderError::BadRequest { status_code: 404, .. }) => {
                debug!("'/api/embed' not found, using legacy /api/embeddings");
                let mut embeddings = Vec::with_capacity(texts.len());
                for text in texts {
                    embeddings.push(self.embed_legacy(text).await?);
                }
                Ok(embeddings)
            }
            Err(err) => Err(err),
        }
    }

    async fn embed_legacy(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let body = LegacyEmbedRequest {
            model: self.embedding_model.clone(),
            prompt: text.to_string(),
        };
        let response = self.post("/api/embeddings", &body).await?;
        let api: LegacyEmbedResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(api.embedding)
    }

    /// Names of models currently loaded into memory (`/api/ps`).
    pub async fn running_models(&self) -> Result<Vec<String>, ProviderError> {
        let response = self
            .http
            .get(format!("{}/api/ps", self.base_url))
            .send()
            .await
            .map_err(ProviderError::from)?;
        let api: TagsResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(api.models.into_iter().map(|m| m.name).collect())
    }

    /// Server version, for diagnostics.
    pub async fn version(&self) -> Result<String, ProviderError> {
        let response = self
            .http
            .get(format!("{}/api/version", self.base_url))
            .send()
            .await
            .map_err(ProviderError::from)?;
        let api: VersionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(api.version)
    }
}

enum Forward {
    Done,
    ConsumerGone,
    Failed { err: ProviderError, delivered: bool },
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn generate_chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let result = with_retry(&self.retry, "ollama.chat", || async {
            self.limiter.acquire().await;
            self.send_chat(request).await
        })
        .await;

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("llm.ollama.chat", start.elapsed());

        result
    }

    async fn generate_chat_stream(&self, request: &ChatRequest) -> Result<ChatStream, ProviderError> {
        self.limiter.acquire().await;

        let (tx, rx) = mpsc::channel(32);
        let client = self.clone();
        let request = request.clone();
        tokio::spawn(async move {
            client.run_stream(request, tx).await;
        });

        Ok(rx)
    }

    async fn generate_completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<ChatResponse, ProviderError> {
        let result = with_retry(&self.retry, "ollama.generate", || async {
            self.limiter.acquire().await;

            let body = GenerateRequest {
                model: request.model.clone().unwrap_or_else(|| self.model.clone()),
                prompt: request.prompt.clone(),
                system: request.system_prompt.clone(),
                stream: false,
                options: OllamaOptions {
                    temperature: request.temperature.or(self.temperature),
                    top_p: self.top_p,
                    top_k: self.top_k,
                    num_predict: request.max_tokens.or(self.max_tokens),
                },
            };
            let response = self.post("/api/generate", &body).await?;
            let api: GenerateResponse = response
                .json()
                .await
                .map_err(|e| ProviderError::Parse(e.to_string()))?;
            Ok(ChatResponse::full(api.response, api.model))
        })
        .await?;

        Ok(result)
    }

    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let texts = vec![text.to_string()];
        let mut result = with_retry(&self.retry, "ollama.embed", || async {
            self.limiter.acquire().await;
            self.embed_batch(&texts).await
        })
        .await?;
        result
            .pop()
            .ok_or_else(|| ProviderError::Parse("no embedding returned".to_string()))
    }

    async fn batch_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        with_retry(&self.retry, "ollama.embed_batch", || async {
            self.limiter.acquire().await;
            self.embed_batch(texts).await
        })
        .await
    }

    fn name(&self) -> &str {
        "Ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn is_available(&self) -> bool {
        let response = self
            .http
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await;
        matches!(response, Ok(r) if r.status().is_success())
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    message: Option<WireMessage>,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    response: String,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct LegacyEmbedRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct LegacyEmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    version: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TaggedModel>,
}

#[derive(Debug, Deserialize)]
struct TaggedModel {
    name: String,
}
