// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! LLM provider adapters.
//!
//! Implementations of the [`crate::types::LlmClient`] contract:
//!
//! - [`claude::ClaudeClient`] - Claude models via the Messages API
//! - [`gemini::GeminiClient`] - Gemini models via generateContent
//! - [`ollama::OllamaClient`] - local models via the Ollama REST API
//!
//! Plus the shared machinery: per-provider token-bucket rate limiting,
//! exponential-backoff retry, line-based stream decoding, and the
//! [`factory::ClientFactory`] that resolves which adapter serves a request.

pub mod claude;
pub mod factory;
pub mod gemini;
pub mod ollama;
pub mod rate_limit;
pub mod retry;
mod sse;

pub use claude::ClaudeClient;
pub use factory::{ClientFactory, ProviderKind};
pub use gemini::GeminiClient;
pub use ollama::OllamaClient;
pub use rate_limit::RateLimiter;
pub use retry::{with_retry, RetryPolicy};
