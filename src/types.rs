// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Core types for the LLM client fabric.
//!
//! This module defines the uniform contract every provider adapter satisfies:
//! messages, chat/completion requests, responses, streaming chunks, and the
//! [`LlmClient`] trait itself.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;

// ============================================================================
// Message Types
// ============================================================================

/// Role of a message sender in a conversation.
///
/// Providers translate these to their own vocabularies: Claude lifts system
/// messages into a top-level field, Gemini folds them into the first user
/// turn, Ollama passes them through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Sampling and transport options attached to a request.
///
/// The enumerated fields cover the options every adapter understands; the
/// `extras` map carries provider-specific knobs forward without schema churn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extras: HashMap<String, serde_json::Value>,
}

/// A chat request against the uniform client contract.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// Model override; adapters fall back to their configured model.
    pub model: Option<String>,
    /// Conversation history, oldest first.
    pub messages: Vec<Message>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Additional options.
    pub options: RequestOptions,
}

impl ChatRequest {
    /// Create a request from a message list.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    /// Set the model override.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the max tokens.
    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    /// Set the temperature.
    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }
}

/// A completion request (single prompt, optional system text).
///
/// Providers without a native completion endpoint emulate this as a
/// two-message chat.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub model: Option<String>,
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    /// Create a completion request from a prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    /// Set the system prompt.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    /// Convert into the equivalent two-message chat request.
    pub fn into_chat(self) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = self.system_prompt {
            messages.push(Message::system(system));
        }
        messages.push(Message::user(self.prompt));
        ChatRequest {
            model: self.model,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            options: RequestOptions::default(),
        }
    }
}

// ============================================================================
// Responses & Streaming
// ============================================================================

/// Response from a chat or completion call.
///
/// Streaming calls deliver a sequence of these; the final chunk has
/// `completed = true` and is always last.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Text content (for streaming chunks, the incremental delta).
    pub content: String,
    /// Model that produced the response.
    pub model: String,
    /// Whether this is the terminal chunk of the sequence.
    pub completed: bool,
    /// Error text when the stream failed after partial output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChatResponse {
    /// A completed response carrying the full content.
    pub fn full(content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
            completed: true,
            error: None,
        }
    }

    /// An incremental streaming delta.
    pub fn delta(content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
            completed: false,
            error: None,
        }
    }

    /// A terminal chunk signalling stream failure.
    pub fn failed(error: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: String::new(),
            model: model.into(),
            completed: true,
            error: Some(error.into()),
        }
    }
}

/// A lazy, finite sequence of streaming chunks.
///
/// The sequence terminates with exactly one `completed = true` chunk.
/// Dropping the receiver cancels the underlying request within one pending
/// read.
pub type ChatStream = mpsc::Receiver<ChatResponse>;

// ============================================================================
// Client Configuration
// ============================================================================

/// Configuration for one provider adapter instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    /// API key for authentication.
    pub api_key: Option<String>,

    /// Base URL for the API endpoint.
    pub base_url: Option<String>,

    /// Model identifier to use.
    pub model: Option<String>,

    /// Embedding model; the value `"ollama"` on a non-Ollama adapter selects
    /// cross-provider embedding delegation.
    pub embedding_model: Option<String>,

    /// Request timeout in milliseconds.
    pub timeout_ms: Option<u64>,

    /// Maximum retry attempts for transient failures.
    pub max_retries: Option<u32>,

    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,

    /// Sampling temperature (0.0 - 2.0).
    pub temperature: Option<f32>,

    /// Nucleus sampling threshold.
    pub top_p: Option<f32>,

    /// Top-k sampling cutoff.
    pub top_k: Option<u32>,

    /// Provider API version header (Claude).
    pub api_version: Option<String>,

    /// Beta feature headers (Claude).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub beta_headers: Vec<String>,

    /// Stop sequences.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,

    /// Requests per minute; 0 or negative means unlimited.
    pub requests_per_minute: Option<i32>,

    /// Token bucket burst size.
    pub burst_limit: Option<u32>,
}

impl ClientConfig {
    /// Create a config with API key and model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            model: Some(model.into()),
            ..Default::default()
        }
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the embedding model.
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = Some(model.into());
        self
    }

    /// Set the max retries.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Set the rate limit.
    pub fn with_rate_limit(mut self, rpm: i32, burst: u32) -> Self {
        self.requests_per_minute = Some(rpm);
        self.burst_limit = Some(burst);
        self
    }
}

// ============================================================================
// Client Trait
// ============================================================================

/// The uniform client contract every provider adapter satisfies.
///
/// Adapters are composed, not inherited: each holds a concrete HTTP client,
/// a rate limiter, and (optionally) a fallback embedding adapter.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a non-streaming chat request. Blocking; retried internally with
    /// exponential backoff on transient failures.
    async fn generate_chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError>;

    /// Send a streaming chat request.
    ///
    /// Returns a lazy, finite sequence of partial responses terminated by a
    /// chunk with `completed = true`. The sequence is not restartable;
    /// retries happen before the first delta is delivered.
    async fn generate_chat_stream(
        &self,
        request: &ChatRequest,
    ) -> Result<ChatStream, ProviderError>;

    /// Send a completion request. Adapters without a native completion
    /// endpoint emulate it via a two-message chat.
    async fn generate_completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<ChatResponse, ProviderError>;

    /// Generate an embedding for a single text.
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// Generate embeddings for multiple texts.
    ///
    /// Order and length are preserved: the i-th vector corresponds to the
    /// i-th input. The default implementation issues sequential single calls,
    /// each respecting the rate limiter.
    async fn batch_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.generate_embedding(text).await?);
        }
        Ok(vectors)
    }

    /// Provider name for display and logging.
    fn name(&self) -> &str;

    /// The configured model.
    fn model(&self) -> &str;

    /// Check whether the provider is reachable and usable.
    async fn is_available(&self) -> bool {
        true
    }
}

/// Arc-wrapped client for shared ownership across the pipeline.
pub type SharedClient = Arc<dyn LlmClient>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello");

        let msg = Message::system("Be terse");
        assert_eq!(msg.role, Role::System);
    }

    #[test]
    fn test_chat_request_builder() {
        let req = ChatRequest::new(vec![Message::user("hi")])
            .with_model("test-model")
            .with_max_tokens(512)
            .with_temperature(0.2);

        assert_eq!(req.model.as_deref(), Some("test-model"));
        assert_eq!(req.max_tokens, Some(512));
        assert_eq!(req.messages.len(), 1);
    }

    #[test]
    fn test_completion_into_chat() {
        let req = CompletionRequest::new("Review this").with_system("You are a reviewer");
        let chat = req.into_chat();

        assert_eq!(chat.messages.len(), 2);
        assert_eq!(chat.messages[0].role, Role::System);
        assert_eq!(chat.messages[1].role, Role::User);
        assert_eq!(chat.messages[1].content, "Review this");
    }

    #[test]
    fn test_completion_into_chat_no_system() {
        let chat = CompletionRequest::new("hi").into_chat();
        assert_eq!(chat.messages.len(), 1);
        assert_eq!(chat.messages[0].role, Role::User);
    }

    #[test]
    fn test_chat_response_variants() {
        let full = ChatResponse::full("done", "m");
        assert!(full.completed);
        assert!(full.error.is_none());

        let delta = ChatResponse::delta("partial", "m");
        assert!(!delta.completed);

        let failed = ChatResponse::failed("connection reset", "m");
        assert!(failed.completed);
        assert!(failed.error.is_some());
    }

    #[test]
    fn test_message_serialization() {
        let msg = Message::user("test");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"role\":\"user\""));
        assert!(json.contains("\"content\":\"test\""));
    }

    #[test]
    fn test_client_config_builder() {
        let config = ClientConfig::new("key", "model-x")
            .with_base_url("http://localhost:9999")
            .with_embedding_model("ollama")
            .with_rate_limit(60, 10);

        assert_eq!(config.api_key.as_deref(), Some("key"));
        assert_eq!(config.embedding_model.as_deref(), Some("ollama"));
        assert_eq!(config.requests_per_minute, Some(60));
        assert_eq!(config.burst_limit, Some(10));
    }
}
