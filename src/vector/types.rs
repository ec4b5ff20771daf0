// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Vector store records and search options.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::parser::{Chunk, ChunkType};

/// Encoding of a stored vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorType {
    /// Little-endian IEEE-754 f32, 4 bytes per component.
    Float32,
    /// One signed byte per component.
    Int8,
    /// One bit per component, 8 components per byte.
    Binary,
}

impl VectorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Float32 => "float32",
            Self::Int8 => "int8",
            Self::Binary => "binary",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "float32" | "f32" => Some(Self::Float32),
            "int8" | "i8" => Some(Self::Int8),
            "binary" | "1bit" | "bit" => Some(Self::Binary),
            _ => None,
        }
    }
}

impl Default for VectorType {
    fn default() -> Self {
        Self::Float32
    }
}

/// Distance metric for similarity search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Cosine,
    L2,
    Hamming,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::L2 => "l2",
            Self::Hamming => "hamming",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cosine" => Some(Self::Cosine),
            "l2" | "euclidean" => Some(Self::L2),
            "hamming" => Some(Self::Hamming),
            _ => None,
        }
    }
}

impl Default for DistanceMetric {
    fn default() -> Self {
        Self::Cosine
    }
}

/// Typed metadata stored alongside a vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorMetadata {
    /// Whether the stored vector is L2-normalized. On by default; the store
    /// normalizes embeddings at store time when this is set.
    pub normalized: bool,

    /// Complexity class that drove adaptive dimensionality, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity: Option<String>,

    /// Dimensionality chosen at store time (pre-slicing diagnostics).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,

    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub extras: HashMap<String, serde_json::Value>,
}

impl Default for VectorMetadata {
    fn default() -> Self {
        Self {
            normalized: true,
            complexity: None,
            dimensions: None,
            extras: HashMap::new(),
        }
    }
}

/// A stored embedding, one per chunk.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub chunk_id: String,
    pub workspace_id: String,
    pub data: Vec<u8>,
    pub vector_type: VectorType,
    pub dimensions: usize,
    pub metadata: VectorMetadata,
}

/// Options for a similarity search.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Restrict to one workspace.
    pub workspace_id: Option<String>,
    /// Restrict to chunks from these files.
    pub file_ids: Vec<String>,
    /// Drop chunks from the file being reviewed.
    pub exclude_file_id: Option<String>,
    /// Restrict to chunks of one type.
    pub chunk_type: Option<ChunkType>,
    /// Drop specific chunk ids.
    pub exclude_chunk_ids: Vec<String>,
    /// Max results.
    pub limit: usize,
    /// Drop weaker matches; in [0, 1].
    pub min_similarity: f32,
    /// Distance metric.
    pub metric: DistanceMetric,
    /// Normalize the query before matching.
    pub normalization: bool,
    /// Encoding to store vectors under.
    pub compression: VectorType,
    /// Attach raw distance to each result.
    pub include_distance: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            workspace_id: None,
            file_ids: Vec::new(),
            exclude_file_id: None,
            chunk_type: None,
            exclude_chunk_ids: Vec::new(),
            limit: 10,
            min_similarity: 0.0,
            metric: DistanceMetric::Cosine,
            normalization: true,
            compression: VectorType::Float32,
            include_distance: false,
        }
    }
}

impl SearchOptions {
    /// Restrict to one workspace.
    pub fn for_workspace(workspace_id: impl Into<String>) -> Self {
        Self {
            workspace_id: Some(workspace_id.into()),
            ..Default::default()
        }
    }

    /// Exclude a file (typically the one under review).
    pub fn excluding_file(mut self, file_id: impl Into<String>) -> Self {
        self.exclude_file_id = Some(file_id.into());
        self
    }

    /// Cap the number of results.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Set the similarity floor.
    pub fn with_min_similarity(mut self, min: f32) -> Self {
        self.min_similarity = min;
        self
    }
}

/// A chunk scored by similarity to a query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Similarity in [0, 1]; 1 is identical.
    pub similarity: f32,
    /// Raw metric distance, attached when requested.
    pub distance: Option<f32>,
}
