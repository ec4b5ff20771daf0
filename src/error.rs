// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for the coderev review engine.
//!
//! This module provides strongly-typed errors for each subsystem,
//! using `thiserror` for ergonomic error definitions and `anyhow` for
//! propagation at the application boundary.

use thiserror::Error;

/// Errors that can occur during LLM provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Server error ({status_code}): {message}")]
    Server { message: String, status_code: u16 },

    #[error("Bad request ({status_code}): {message}")]
    BadRequest { message: String, status_code: u16 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Response parsing error: {0}")]
    Parse(String),

    #[error("Streaming error: {0}")]
    Stream(String),

    #[error("Embeddings not supported: {0}")]
    EmbeddingsUnsupported(String),

    #[error("No provider available: {0}")]
    Unavailable(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Classify an HTTP error status into the provider taxonomy.
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status_code {
            401 | 403 => Self::Auth(message),
            429 => Self::RateLimited(message),
            500..=599 => Self::Server { message, status_code },
            _ => Self::BadRequest { message, status_code },
        }
    }

    /// Check if this error is retryable.
    ///
    /// Rate limits, 5xx responses, raw network failures, and timeouts are
    /// transient; everything else surfaces immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::Server { .. } | Self::Network(_) | Self::Timeout(_)
        )
    }

    /// Check if this is a rate limit error.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(0)
        } else if let Some(status) = err.status() {
            Self::from_status(status.as_u16(), err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Errors that can occur while parsing source files into chunks.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Syntax error in {path}: {message}")]
    Syntax { path: String, message: String },

    #[error("Parser initialization failed: {0}")]
    Init(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ParseError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::Io(err.to_string()),
        }
    }
}

/// Errors from the persistence layer and vector store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid vector: expected {expected} dimensions, got {actual}")]
    InvalidDimensions { expected: usize, actual: usize },

    #[error("Invalid vector: {0}")]
    InvalidVector(String),

    #[error("Unsupported distance metric: {0}")]
    UnsupportedMetric(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => Self::NotFound(err.to_string()),
            _ => Self::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    Io(String),

    #[error("YAML parsing error: {0}")]
    Yaml(String),

    #[error("JSON parsing error: {0}")]
    Json(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::Io(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml(err.to_string())
    }
}

/// Errors that can occur while driving a review.
#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Embedding failed: {0}")]
    EmbedFailed(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Review cancelled")]
    Cancelled,
}

impl From<std::io::Error> for ReviewError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl ReviewError {
    /// Cancellation is distinguished from failure: a cancelled review keeps
    /// its in-progress status rather than being marked failed.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Provider(ProviderError::Cancelled))
    }
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_retryable() {
        assert!(ProviderError::RateLimited("wait 1s".to_string()).is_retryable());
        assert!(ProviderError::Network("reset".to_string()).is_retryable());
        assert!(ProviderError::Timeout(30000).is_retryable());
        assert!(ProviderError::Server {
            message: "overloaded".to_string(),
            status_code: 529
        }
        .is_retryable());
        assert!(!ProviderError::Auth("invalid key".to_string()).is_retryable());
        assert!(!ProviderError::BadRequest {
            message: "bad model".to_string(),
            status_code: 400
        }
        .is_retryable());
        assert!(!ProviderError::Cancelled.is_retryable());
    }

    #[test]
    fn test_provider_error_from_status() {
        assert!(matches!(
            ProviderError::from_status(401, "nope"),
            ProviderError::Auth(_)
        ));
        assert!(matches!(
            ProviderError::from_status(429, "slow down"),
            ProviderError::RateLimited(_)
        ));
        assert!(matches!(
            ProviderError::from_status(503, "unavailable"),
            ProviderError::Server { status_code: 503, .. }
        ));
        assert!(matches!(
            ProviderError::from_status(404, "missing"),
            ProviderError::BadRequest { status_code: 404, .. }
        ));
    }

    #[test]
    fn test_parse_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let parse_err: ParseError = io_err.into();
        assert!(matches!(parse_err, ParseError::NotFound(_)));
    }

    #[test]
    fn test_review_error_cancelled() {
        assert!(ReviewError::Cancelled.is_cancelled());
        assert!(ReviewError::Provider(ProviderError::Cancelled).is_cancelled());
        assert!(!ReviewError::EmbedFailed("all batches failed".to_string()).is_cancelled());
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::InvalidDimensions {
            expected: 768,
            actual: 512,
        };
        let display = format!("{}", err);
        assert!(display.contains("768"));
        assert!(display.contains("512"));
    }
}
