// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Provider factory.
//!
//! Holds one adapter (and its rate limiter) per configured provider and
//! resolves which one serves a request: the explicit kind, the configured
//! default, or - when neither is available - the first initialized provider
//! in the order Gemini, Claude, Ollama, with a logged fallback.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::ProviderError;
use crate::types::SharedClient;

use super::claude::ClaudeClient;
use super::gemini::GeminiClient;
use super::ollama::OllamaClient;
use super::rate_limit::RateLimiter;

/// Fallback resolution order when the requested provider is unavailable.
const FALLBACK_ORDER: [ProviderKind; 3] =
    [ProviderKind::Gemini, ProviderKind::Claude, ProviderKind::Ollama];

/// The providers the fabric knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Claude,
    Gemini,
    Ollama,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Gemini => "gemini",
            Self::Ollama => "ollama",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error type for parsing a provider kind from a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseProviderKindError;

impl std::fmt::Display for ParseProviderKindError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid provider name")
    }
}

impl std::error::Error for ParseProviderKindError {}

impl std::str::FromStr for ProviderKind {
    type Err = ParseProviderKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "claude" | "anthropic" => Ok(Self::Claude),
            "gemini" | "google" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            _ => Err(ParseProviderKindError),
        }
    }
}

/// Process-wide factory; immutable after configuration.
pub struct ClientFactory {
    clients: HashMap<ProviderKind, SharedClient>,
    default_kind: ProviderKind,
}

impl ClientFactory {
    /// Build adapters for every provider the config has enough material for.
    ///
    /// Claude and Gemini need API keys; Ollama only needs its endpoint and
    /// is always constructed. At least one provider must come up.
    pub fn from_config(config: &Config) -> Result<Self, ProviderError> {
        let mut clients: HashMap<ProviderKind, SharedClient> = HashMap::new();

        // Ollama comes first: it doubles as the embedding delegate.
        let ollama = Arc::new(OllamaClient::new(
            &config.ollama,
            Arc::new(limiter_for(&config.ollama)),
        )?);
        clients.insert(ProviderKind::Ollama, ollama.clone() as SharedClient);

        match ClaudeClient::new(&config.claude, Arc::new(limiter_for(&config.claude))) {
            Ok(client) => {
                let client = if config.claude.embedding_model.as_deref() == Some("ollama") {
                    client.with_embedding_fallback(ollama.clone() as SharedClient)
                } else {
                    client
                };
                clients.insert(ProviderKind::Claude, Arc::new(client));
            }
            Err(err) => info!(provider = "claude", error = %err, "provider not configured"),
        }

        match GeminiClient::new(&config.gemini, Arc::new(limiter_for(&config.gemini))) {
            Ok(client) => {
                let client = if config.gemini.embedding_model.as_deref() == Some("ollama") {
                    client.with_embedding_fallback(ollama.clone() as SharedClient)
                } else {
                    client
                };
                clients.insert(ProviderKind::Gemini, Arc::new(client));
            }
            Err(err) => info!(provider = "gemini", error = %err, "provider not configured"),
        }

        if clients.is_empty() {
            return Err(ProviderError::Unavailable(
                "no provider could be initialized from the configuration".to_string(),
            ));
        }

        let default_kind = config
            .default_provider
            .parse()
            .unwrap_or(ProviderKind::Ollama);

        Ok(Self {
            clients,
            default_kind,
        })
    }

    /// Build a factory from explicit clients (tests and embedding setups).
    pub fn from_clients(
        clients: HashMap<ProviderKind, SharedClient>,
        default_kind: ProviderKind,
    ) -> Self {
        Self {
            clients,
            default_kind,
        }
    }

    /// The configured default provider.
    pub fn default_kind(&self) -> ProviderKind {
        self.default_kind
    }

    /// Providers that were actually initialized.
    pub fn available(&self) -> Vec<ProviderKind> {
        FALLBACK_ORDER
            .into_iter()
            .filter(|kind| self.clients.contains_key(kind))
            .collect()
    }

    /// Resolve a client: the explicit kind, the default, or the fallback
    /// chain (Gemini, Claude, Ollama) with a logged substitution.
    pub fn client(&self, kind: Option<ProviderKind>) -> Result<SharedClient, ProviderError> {
        let wanted = kind.unwrap_or(self.default_kind);

        if let Some(client) = self.clients.get(&wanted) {
            return Ok(Arc::clone(client));
        }

        for candidate in FALLBACK_ORDER {
            if let Some(client) = self.clients.get(&candidate) {
                warn!(
                    requested = %wanted,
                    using = %candidate,
                    "requested provider unavailable, falling back"
                );
                return Ok(Arc::clone(client));
            }
        }

        Err(ProviderError::Unavailable(format!(
            "no configured adapter can serve provider '{}'",
            wanted
        )))
    }
}

fn limiter_for(config: &crate::types::ClientConfig) -> RateLimiter {
    RateLimiter::new(
        config.requests_per_minute.unwrap_or(0),
        config.burst_limit.unwrap_or(1),
    )
}
