// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tracing and metrics for the review pipeline.
//!
//! Call [`init_telemetry`] once at startup, usually from the loaded log
//! settings:
//!
//! ```rust,ignore
//! use coderev::telemetry::{init_telemetry, TelemetryConfig};
//!
//! init_telemetry(&TelemetryConfig::from_log_settings(&config.log))?;
//! ```
//!
//! With the `telemetry` feature enabled, parser, vector-store, RAG, and
//! provider calls record their timings in [`metrics::GLOBAL_METRICS`].

pub mod init;
pub mod metrics;

pub use init::{init_telemetry, TelemetryConfig};
pub use metrics::{Metrics, OperationMetrics};
