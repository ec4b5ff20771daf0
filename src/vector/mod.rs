// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Vector operations and the on-disk vector store.
//!
//! - [`ops`] - pure, deterministic vector math: serialization, quantization,
//!   distances, and the contractual distance-to-similarity mappings
//! - [`store`] - SQLite-backed store keyed by chunk id with filtered
//!   similarity search
//! - [`types`] - records, metrics, and search options

pub mod ops;
pub mod store;
pub mod types;

pub use store::{SqliteVectorStore, VectorStore};
pub use types::{DistanceMetric, ScoredChunk, SearchOptions, VectorMetadata, VectorRecord, VectorType};
