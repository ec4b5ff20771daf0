// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! coderev - local AI code review.
//!
//! Ingests a set of changed source files, cuts each into semantic chunks,
//! embeds them into a local vector store, retrieves related code for each
//! file under review, and asks an LLM provider for structured findings.
//!
//! # Architecture
//!
//! - [`types`] - LLM fabric types (messages, requests, the client trait)
//! - [`error`] - per-subsystem error taxonomies
//! - [`config`] - configuration loading and resolution
//! - [`telemetry`] - tracing and lightweight operation metrics
//! - [`parser`] - source files into chunks (tree-sitter Go + fallback)
//! - [`vector`] - vector math and the SQLite-backed vector store
//! - [`llm`] - provider adapters (Claude, Gemini, Ollama), retry, rate
//!   limiting, and the client factory
//! - [`rag`] - batch embedding and token-budgeted context assembly
//! - [`review`] - the review orchestrator and reply parsing
//! - [`store`] - persistence facade (repositories over SQLite)
//! - [`tui`] - the interactive review shell
//! - [`cancel`] - cooperative cancellation token

pub mod cancel;
pub mod config;
pub mod error;
pub mod llm;
pub mod parser;
pub mod rag;
pub mod review;
pub mod store;
pub mod telemetry;
pub mod tui;
pub mod types;
pub mod vector;

// Re-export commonly used types at crate root
pub use cancel::CancelToken;
pub use error::{ConfigError, ParseError, ProviderError, Result, ReviewError, StoreError};
pub use llm::{ClientFactory, ProviderKind};
pub use types::{
    ChatRequest, ChatResponse, ChatStream, ClientConfig, CompletionRequest, LlmClient, Message,
    Role, SharedClient,
};

/// coderev version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_public_exports() {
        let _msg = Message::user("test");
        let _response = ChatResponse::full("done", "model");
    }
}
