// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Claude provider adapter via the Messages API.
//!
//! System-role messages are lifted out of the message list into the API's
//! top-level `system` field. Streaming parses the newline-delimited event
//! stream (`content_block_start`, `content_block_delta`, `message_delta`)
//! and coalesces text deltas; the terminal chunk carries `completed = true`
//! once `message_delta` reports a stop reason.

use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "telemetry")]
use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use crate::error::ProviderError;
use crate::types::{
    ChatRequest, ChatResponse, ChatStream, ClientConfig, CompletionRequest, LlmClient, Role,
    SharedClient,
};

use super::rate_limit::RateLimiter;
use super::retry::{with_retry, RetryPolicy};
use super::sse::LineReader;

/// Default Messages API version header.
const DEFAULT_API_VERSION: &str = "2023-06-01";

/// Default max tokens if not configured.
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Claude adapter.
#[derive(Clone)]
pub struct ClaudeClient {
    http: Client,
    api_key: String,
    model: String,
    base_url: String,
    api_version: String,
    beta_headers: Vec<String>,
    max_tokens: u32,
    temperature: Option<f32>,
    top_p: Option<f32>,
    top_k: Option<u32>,
    stop_sequences: Vec<String>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    /// Cross-provider embedding delegation (embedding model `"ollama"`).
    embed_fallback: Option<SharedClient>,
}

impl ClaudeClient {
    /// Create an adapter from configuration. Requires an API key.
    pub fn new(config: &ClientConfig, limiter: Arc<RateLimiter>) -> Result<Self, ProviderError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ProviderError::NotConfigured("API key required for Claude".to_string()))?;

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
            api_key,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| "claude-sonnet-4-20250514".to_string()),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.anthropic.com".to_string())
                .trim_end_matches('/')
                .to_string(),
            api_version: config
                .api_version
                .clone()
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            beta_headers: config.beta_headers.clone(),
            max_tokens: config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: config.temperature,
            top_p: config.top_p,
            top_k: config.top_k,
            stop_sequences: config.stop_sequences.clone(),
            limiter,
            retry: RetryPolicy::with_max_retries(config.max_retries.unwrap_or(3)),
            embed_fallback: None,
        })
    }

    /// Attach an embedding delegate (selected when the configured embedding
    /// model is `"ollama"`).
    pub fn with_embedding_fallback(mut self, fallback: SharedClient) -> Self {
        self.embed_fallback = Some(fallback);
        self
    }

    /// Split fabric messages into the API shape: system text is a top-level
    /// field, everything else stays in the list.
    fn build_body(&self, request: &ChatRequest, stream: bool) -> MessagesRequest {
        let mut system_parts = Vec::new();
        let mut messages = Vec::new();

        for message in &request.messages {
            match message.role {
                Role::System => system_parts.push(message.content.clone()),
                Role::User => messages.push(WireMessage {
                    role: "user".to_string(),
                    content: message.content.clone(),
                }),
                Role::Assistant => messages.push(WireMessage {
                    role: "assistant".to_string(),
                    content: message.content.clone(),
                }),
            }
        }

        let stop_sequences = if request.options.stop_sequences.is_empty() {
            self.stop_sequences.clone()
        } else {
            request.options.stop_sequences.clone()
        };

        MessagesRequest {
            model: request.model.clone().unwrap_or_else(|| self.model.clone()),
            max_tokens: request.max_tokens.unwrap_or(self.max_tokens),
            messages,
            system: if system_parts.is_empty() {
                None
            } else {
                Some(system_parts.join("\n\n"))
            },
            temperature: request.temperature.or(self.temperature),
            top_p: request.options.top_p.or(self.top_p),
            top_k: request.options.top_k.or(self.top_k),
            stream,
            stop_sequences: if stop_sequences.is_empty() {
                None
            } else {
                Some(stop_sequences)
            },
        }
    }

    async fn post_messages(&self, body: &MessagesRequest) -> Result<reqwest::Response, ProviderError> {
        let mut req = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("content-type", "application/json")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version);

        if !self.beta_headers.is_empty() {
            let betas = serde_json::to_string(&self.beta_headers)
                .map_err(|e| ProviderError::Parse(e.to_string()))?;
            req = req.header("anthropic-beta", betas);
        }

        let response = req.json(body).send().await.map_err(ProviderError::from)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(map_error(status.as_u16(), &text));
        }
        Ok(response)
    }

    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let body = self.build_body(request, false);
        let response = self.post_messages(&body).await?;

        let api: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let content: String = api
            .content
            .iter()
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        Ok(ChatResponse::full(content, api.model))
    }

    async fn run_stream(self, request: ChatRequest, tx: mpsc::Sender<ChatResponse>) {
        let model = request.model.clone().unwrap_or_else(|| self.model.clone());
        let body = self.build_body(&request, true);
        let mut attempt = 0u32;

        loop {
            let response = match self.post_messages(&body).await {
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
                    // Retries re-open the whole stream; partials from a
                    // failed attempt are discarded, so only retry while the
                    // consumer has seen nothing.
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
                // Server EOF ends the sequence.
                Ok(None) => break,
                Err(err) => return Forward::Failed { err, delivered },
            };

            let line = line.trim();
            if line.is_empty() || line.starts_with("event:") {
                continue;
            }
            let data = line.strip_prefix("data:").map(str::trim).unwrap_or(line);

            let event: StreamEvent = match serde_json::from_str(data) {
                Ok(event) => event,
                Err(_) => continue, // unknown event shapes are skipped
            };

            match event.event_type.as_str() {
                "content_block_delta" => {
                    if let Some(text) = event.delta.and_then(|d| d.text) {
                        if !text.is_empty() {
                            if tx.send(ChatResponse::delta(text, model)).await.is_err() {
                                return Forward::ConsumerGone;
                            }
                            delivered = true;
                        }
                    }
                }
                "message_delta" => {
                    let stopped = event
                        .delta
                        .and_then(|d| d.stop_reason)
                        .map(|r| !r.is_empty())
                        .unwrap_or(false);
                    if stopped {
                        let _ = tx.send(ChatResponse::full("", model)).await;
                        return Forward::Done;
                    }
                }
                "error" => {
                    let message = event
                        .error
                        .map(|e| e.message)
                        .unwrap_or_else(|| "stream error".to_string());
                    return Forward::Failed {
                        err: ProviderError::Stream(message),
                        delivered,
                    };
                }
                _ => {}
            }
        }

        let _ = tx.send(ChatResponse::full("", model)).await;
        Forward::Done
    }
}

enum Forward {
    Done,
    ConsumerGone,
    Failed { err: ProviderError, delivered: bool },
}

#[async_trait]
impl LlmClient for ClaudeClient {
    async fn generate_chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let result = with_retry(&self.retry, "claude.chat", || async {
            self.limiter.acquire().await;
            self.send_chat(request).await
        })
        .await;

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("llm.claude.chat", start.elapsed());

        result
    }

    async fn generate_chat_stream(&self, request: &ChatRequest) -> Result<ChatStream, ProviderError> {
        // Streaming waits on the limiter once, before the first attempt.
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
        // No native completion endpoint; emulate via a two-message chat.
        self.generate_chat(&request.clone().into_chat()).await
    }

    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        match &self.embed_fallback {
            Some(delegate) => delegate.generate_embedding(text).await,
            None => Err(ProviderError::EmbeddingsUnsupported(
                "Claude has no embeddings endpoint; set embedding model \"ollama\" to delegate"
                    .to_string(),
            )),
        }
    }

    async fn batch_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        match &self.embed_fallback {
            Some(delegate) => delegate.batch_embeddings(texts).await,
            None => Err(ProviderError::EmbeddingsUnsupported(
                "Claude has no embeddings endpoint; set embedding model \"ollama\" to delegate"
                    .to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        "Claude"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Map an error body to the provider taxonomy.
fn map_error(status_code: u16, body: &str) -> ProviderError {
    if let Ok(api_error) = serde_json::from_str::<ApiError>(body) {
        match api_error.error.error_type.as_str() {
            "authentication_error" | "permission_error" => {
                ProviderError::Auth(api_error.error.message)
            }
            "rate_limit_error" => ProviderError::RateLimited(api_error.error.message),
            "overloaded_error" => ProviderError::Server {
                message: api_error.error.message,
                status_code,
            },
            _ => ProviderError::from_status(status_code, api_error.error.message),
        }
    } else {
        ProviderError::from_status(status_code, body.to_string())
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    model: String,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    #[allow(dead_code)]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    delta: Option<StreamDelta>,
    #[serde(default)]
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(rename = "type", default)]
    error_type: String,
    message: String,
}
