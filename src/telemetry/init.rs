// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tracing setup for review runs.
//!
//! The subscriber is derived from the crate's own log settings: level,
//! compact/full format, and stderr/stdout routing. Output goes to stderr by
//! default because the interactive shell owns stdout.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::LogSettings;

/// How the subscriber is configured for this run.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Level applied when no `RUST_LOG` directive is present.
    pub level: Level,

    /// Compact one-line format versus the full multi-line one.
    pub compact: bool,

    /// Route log lines to stderr (the shell owns stdout).
    pub use_stderr: bool,

    /// Explicit filter directive, overriding `level` and `RUST_LOG`.
    pub filter_directive: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            compact: true,
            use_stderr: true,
            filter_directive: None,
        }
    }
}

impl TelemetryConfig {
    /// Derive the subscriber configuration from the loaded log settings.
    pub fn from_log_settings(settings: &LogSettings) -> Self {
        Self {
            level: settings.level.parse().unwrap_or(Level::WARN),
            compact: settings.format != "full",
            use_stderr: settings.output != "stdout",
            filter_directive: None,
        }
    }

    /// Debug-level full-format output for `--debug` runs.
    pub fn verbose() -> Self {
        Self {
            level: Level::DEBUG,
            compact: false,
            ..Default::default()
        }
    }

    /// Resolve the filter: an explicit directive wins, then `RUST_LOG`,
    /// then the configured level.
    fn env_filter(&self) -> EnvFilter {
        let directive = self
            .filter_directive
            .clone()
            .or_else(|| std::env::var("RUST_LOG").ok())
            .unwrap_or_else(|| self.level.to_string());

        EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(self.level.to_string()))
    }
}

/// Install the global subscriber. Call once at startup; a second call
/// reports the registry conflict as an error.
pub fn init_telemetry(config: &TelemetryConfig) -> io::Result<()> {
    set_use_stderr(config.use_stderr);

    let base = fmt::layer().with_writer(pick_writer);

    // The compact/full split changes the layer's type, so both arms are
    // erased into one boxed layer before registration.
    type FilteredRegistry = tracing_subscriber::layer::Layered<EnvFilter, Registry>;

    let format_layer: Box<dyn Layer<FilteredRegistry> + Send + Sync> = if config.compact {
        base.compact().boxed()
    } else {
        base.boxed()
    };

    Registry::default()
        .with(config.env_filter())
        .with(format_layer)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e.to_string()))
}

// The writer is chosen per log line through a process-wide flag because the
// subscriber outlives the borrowed config.
static USE_STDERR: AtomicBool = AtomicBool::new(true);

fn set_use_stderr(value: bool) {
    USE_STDERR.store(value, Ordering::Relaxed);
}

fn pick_writer() -> Box<dyn io::Write> {
    if USE_STDERR.load(Ordering::Relaxed) {
        Box::new(io::stderr())
    } else {
        Box::new(io::stdout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(config.compact);
        assert!(config.use_stderr);
    }

    #[test]
    fn test_from_log_settings() {
        let settings = LogSettings {
            level: "debug".to_string(),
            format: "full".to_string(),
            output: "stdout".to_string(),
        };
        let config = TelemetryConfig::from_log_settings(&settings);
        assert_eq!(config.level, Level::DEBUG);
        assert!(!config.compact);
        assert!(!config.use_stderr);
    }

    #[test]
    fn test_bad_level_falls_back_to_warn() {
        let settings = LogSettings {
            level: "shouting".to_string(),
            ..Default::default()
        };
        let config = TelemetryConfig::from_log_settings(&settings);
        assert_eq!(config.level, Level::WARN);
    }

    #[test]
    fn test_verbose() {
        let config = TelemetryConfig::verbose();
        assert_eq!(config.level, Level::DEBUG);
        assert!(!config.compact);
    }
}
