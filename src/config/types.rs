// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration type definitions.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::ClientConfig;
use crate::vector::types::{DistanceMetric, VectorType};

/// Top-level configuration for a review run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Default provider name: "claude", "gemini", or "ollama".
    pub default_provider: String,

    /// Claude adapter settings.
    pub claude: ClientConfig,

    /// Gemini adapter settings.
    pub gemini: ClientConfig,

    /// Ollama adapter settings.
    pub ollama: ClientConfig,

    /// Retrieval settings.
    pub rag: RagSettings,

    /// Database path; defaults to `<data dir>/coderev/coderev.db`.
    pub database_path: Option<PathBuf>,

    /// Logging settings.
    pub log: LogSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_provider: "ollama".to_string(),
            claude: ClientConfig {
                base_url: Some("https://api.anthropic.com".to_string()),
                model: Some("claude-sonnet-4-20250514".to_string()),
                api_version: Some("2023-06-01".to_string()),
                ..Default::default()
            },
            gemini: ClientConfig {
                base_url: Some("https://generativelanguage.googleapis.com".to_string()),
                model: Some("gemini-2.0-flash".to_string()),
                api_version: Some("v1beta".to_string()),
                ..Default::default()
            },
            ollama: ClientConfig {
                base_url: Some("http://localhost:11434".to_string()),
                model: Some("llama3.2".to_string()),
                embedding_model: Some("nomic-embed-text".to_string()),
                ..Default::default()
            },
            rag: RagSettings::default(),
            database_path: None,
            log: LogSettings::default(),
        }
    }
}

impl Config {
    /// Resolve the database path, falling back to the user data directory.
    pub fn resolved_database_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("coderev")
                .join("coderev.db")
        })
    }

    /// Settings for a provider by name, if known.
    pub fn provider_settings(&self, name: &str) -> Option<&ClientConfig> {
        match name.to_lowercase().as_str() {
            "claude" | "anthropic" => Some(&self.claude),
            "gemini" | "google" => Some(&self.gemini),
            "ollama" => Some(&self.ollama),
            _ => None,
        }
    }
}

/// Retrieval / embedding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RagSettings {
    /// Chunks per embedding batch.
    pub batch_size: usize,

    /// Number of similar chunks to retrieve per file.
    pub n_similar_chunks: usize,

    /// Distance metric for similarity search.
    pub default_metric: DistanceMetric,

    /// Normalize embeddings at store and query time.
    pub normalization: bool,

    /// Minimum similarity for retrieved chunks.
    pub min_similarity: f32,

    /// Encoding to store vectors under.
    pub vector_type: VectorType,

    /// Enable complexity-aware adaptive dimensionality.
    pub enable_compression: bool,

    /// Token budget for assembled context windows.
    pub max_context_tokens: usize,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            batch_size: 20,
            n_similar_chunks: 10,
            default_metric: DistanceMetric::Cosine,
            normalization: true,
            min_similarity: 0.0,
            vector_type: VectorType::Float32,
            enable_compression: false,
            max_context_tokens: 2048,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LogSettings {
    /// Log level: trace, debug, info, warn, error.
    pub level: String,

    /// Log format: "compact" or "full".
    pub format: String,

    /// Log destination: "stderr" or "stdout".
    pub output: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
            output: "stderr".to_string(),
        }
    }
}
