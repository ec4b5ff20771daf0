// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Gemini provider adapter via generateContent.
//!
//! Gemini has no system role: system text is prepended as a user message,
//! and assistant turns map to the `"model"` role. Streaming uses SSE
//! (`data: <json>` lines) terminated by a `data: [DONE]` sentinel.

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
use super::sse::{sse_data, LineReader};

/// Default API version path segment.
const DEFAULT_API_VERSION: &str = "v1beta";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Gemini adapter.
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    api_key: String,
    model: String,
    embedding_model: Option<String>,
    base_url: String,
    api_version: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    top_p: Option<f32>,
    top_k: Option<u32>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    embed_fallback: Option<SharedClient>,
}

impl GeminiClient {
    /// Create an adapter from configuration. Requires an API key.
    pub fn new(config: &ClientConfig, limiter: Arc<RateLimiter>) -> Result<Self, ProviderError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ProviderError::NotConfigured("API key required for Gemini".to_string()))?;

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
                .unwrap_or_else(|| "gemini-2.0-flash".to_string()),
            embedding_model: config.embedding_model.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string())
                .trim_end_matches('/')
                .to_string(),
            api_version: config
                .api_version
                .clone()
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
            top_k: config.top_k,
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

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!(
            "{}/{}/models/{}:{}?key={}",
            self.base_url, self.api_version, model, method, self.api_key
        )
    }

    /// Translate fabric messages: no system role exists, so system text is
    /// prepended as a user message; assistant becomes "model".
    fn build_body(&self, request: &ChatRequest) -> GenerateContentRequest {
        // System text is prepended as a user message; the rest keep their
        // order with assistant mapped to "model".
        let mut contents: Vec<Content> = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: m.content.clone(),
                }],
            })
            .collect();

        for message in &request.messages {
            let role = match message.role {
                Role::System => continue,
                Role::User => "user",
                Role::Assistant => "model",
            };
            contents.push(Content {
                role: role.to_string(),
                parts: vec![Part {
                    text: message.content.clone(),
                }],
            });
        }

        GenerateContentRequest {
            contents,
            generation_config: GenerationConfig {
                max_output_tokens: request.max_tokens.or(self.max_tokens),
                temperature: request.temperature.or(self.temperature),
                top_p: request.options.top_p.or(self.top_p),
                top_k: request.options.top_k.or(self.top_k),
            },
        }
    }

    async fn post(
        &self,
        url: &str,
        body: &impl Serialize,
    ) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .http
            .post(url)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(ProviderError::from)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(map_error(status.as_u16(), &text));
        }
        Ok(response)
    }

    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let model = request.model.clone().unwrap_or_else(|| self.model.clone());
        let body = self.build_body(request);
        let url = self.endpoint(&model, "generateContent");

        let response = self.post(&url, &body).await?;
        let api: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        Ok(ChatResponse::full(api.first_text(), model))
    }

    async fn run_stream(self, request: ChatRequest, tx: mpsc::Sender<ChatResponse>) {
        let model = request.model.clone().unwrap_or_else(|| self.model.clone());
        let body = self.build_body(&request);
        let url = self.endpoint(&model, "streamGenerateContent");
        let mut attempt = 0u32;

        loop {
            let response = match self.post(&url, &body).await {
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
                Ok(None) => break,
                Err(err) => return Forward::Failed { err, delivered },
            };

            let Some(data) = sse_data(line.trim()) else {
                continue;
            };

            // The [DONE] sentinel terminates the sequence.
            if data == "[DONE]" {
                let _ = tx.send(ChatResponse::full("", model)).await;
                return Forward::Done;
            }

            let chunk: GenerateContentResponse = match serde_json::from_str(data) {
                Ok(chunk) => chunk,
                Err(_) => continue,
            };

            let text = chunk.first_text();
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
}

enum Forward {
    Done,
    ConsumerGone,
    Failed { err: ProviderError, delivered: bool },
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate_chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let result = with_retry(&self.retry, "gemini.chat", || async {
            self.limiter.acquire().await;
            self.send_chat(request).await
        })
        .await;

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("llm.gemini.chat", start.elapsed());

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
        self.generate_chat(&request.clone().into_chat()).await
    }

    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        // The string "ollama" as embedding model selects cross-provider
        // delegation instead of a Gemini model name.
        if self.embedding_model.as_deref() == Some("ollama") {
            return match &self.embed_fallback {
                Some(delegate) => delegate.generate_embedding(text).await,
                None => Err(ProviderError::EmbeddingsUnsupported(
                    "embedding delegation requested but no Ollama adapter configured".to_string(),
                )),
            };
        }

        let model = self
            .embedding_model
            .clone()
            .unwrap_or_else(|| "text-embedding-004".to_string());

        let result = with_retry(&self.retry, "gemini.embed", || async {
            self.limiter.acquire().await;

            let body = EmbedContentRequest {
                model: format!("models/{}", model),
                content: Content {
                    role: "user".to_string(),
                    parts: vec![Part {
                        text: text.to_string(),
                    }],
                },
            };
            let url = self.endpoint(&model, "embedContent");
            let response = self.post(&url, &body).await?;

            let api: EmbedContentResponse = response
                .json()
                .await
                .map_err(|e| ProviderError::Parse(e.to_string()))?;
            Ok(api.embedding.values)
        })
        .await?;

        Ok(result)
    }

    fn name(&self) -> &str {
        "Gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn map_error(status_code: u16, body: &str) -> ProviderError {
    if let Ok(api_error) = serde_json::from_str::<ApiError>(body) {
        ProviderError::from_status(status_code, api_error.error.message)
    } else {
        ProviderError::from_status(status_code, body.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    code: u32,
    message: String,
    #[serde(default)]
    status: String,
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(rename = "topP", skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(rename = "topK", skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    /// Text of the first candidate's first part, the streaming delta shape.
    fn first_text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Serialize)]
struct EmbedContentRequest {
    model: String,
    content: Content,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    fn client() -> GeminiClient {
        let config = ClientConfig::new("test-key", "gemini-2.0-flash");
        GeminiClient::new(&config, Arc::new(RateLimiter::unlimited())).unwrap()
    }

    #[test]
    fn test_requires_api_key() {
        let config = ClientConfig::default();
        let result = GeminiClient::new(&config, Arc::new(RateLimiter::unlimited()));
        assert!(matches!(result, Err(ProviderError::NotConfigured(_))));
    }

    #[test]
    fn test_system_becomes_user_message() {
        let client = client();
        let request = ChatRequest::new(vec![
            Message::system("You review code."),
            Message::user("Review this."),
        ]);

        let body = client.build_body(&request);
        assert_eq!(body.contents.len(), 2);
        assert_eq!(body.contents[0].role, "user");
        assert_eq!(body.contents[0].parts[0].text, "You review code.");
        assert_eq!(body.contents[1].role, "user");
    }

    #[test]
    fn test_assistant_becomes_model_role() {
        let client = client();
        let request = ChatRequest::new(vec![
            Message::user("Hi"),
            Message::assistant("Hello"),
        ]);

        let body = client.build_body(&request);
        assert_eq!(body.contents[0].role, "user");
        assert_eq!(body.contents[1].role, "model");
    }

    #[test]
    fn test_endpoint_shapes() {
        let client = client();
        assert_eq!(
            client.endpoint("gemini-2.0-flash", "generateContent"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent?key=test-key"
        );
        assert!(client
            .endpoint("gemini-2.0-flash", "streamGenerateContent")
            .contains(":streamGenerateContent?key="));
    }

    #[test]
    fn test_response_first_text() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hello"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(response.first_text(), "Hello");

        let empty: GenerateContentResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(empty.first_text(), "");
    }

    #[test]
    fn test_error_mapping() {
        let err = map_error(
            400,
            r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#,
        );
        assert!(matches!(err, ProviderError::BadRequest { .. }));

        let server = map_error(503, "upstream unavailable");
        assert!(server.is_retryable());
    }

    #[tokio::test]
    async fn test_embedding_delegation_requires_fallback() {
        let config = ClientConfig::new("test-key", "gemini-2.0-flash").with_embedding_model("ollama");
        let client = GeminiClient::new(&config, Arc::new(RateLimiter::unlimited())).unwrap();

        let result = client.generate_embedding("text").await;
        assert!(matches!(result, Err(ProviderError::EmbeddingsUnsupported(_))));
    }
}
