// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Retrieval service: batch chunk embedding and token-budgeted context
//! assembly.
//!
//! [`RagService::process_chunks`] embeds parsed chunks in batches and
//! persists them through the vector store, skipping chunks that already
//! have vectors - re-running over a stable corpus issues zero embedding
//! requests. [`RagService::build_context`] embeds a query, retrieves
//! similar chunks, and greedily packs them under a token budget.

use std::sync::Arc;

#[cfg(feature = "telemetry")]
use std::time::Instant;

use tracing::{debug, warn};

use crate::config::RagSettings;
use crate::error::ReviewError;
use crate::parser::{Chunk, Complexity};
use crate::types::SharedClient;
use crate::vector::ops;
use crate::vector::store::VectorStore;
use crate::vector::types::{ScoredChunk, SearchOptions, VectorMetadata};

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

/// Default context budget when the caller passes a non-positive limit.
pub const DEFAULT_CONTEXT_TOKENS: usize = 2048;

/// Stop packing once this share of the budget is consumed.
const BUDGET_STOP_NUMERATOR: usize = 9;
const BUDGET_STOP_DENOMINATOR: usize = 10;

/// Smallest dimensionality adaptive slicing will produce.
const MIN_ADAPTIVE_DIMENSIONS: usize = 16;

/// Per-chunk metadata projection applied before storing vectors.
pub type MetadataFn<'a> = &'a (dyn Fn(&Chunk) -> VectorMetadata + Send + Sync);

/// Outcome of a [`RagService::process_chunks`] run.
#[derive(Debug, Clone, Default)]
pub struct EmbedReport {
    /// Chunks embedded and stored in this run.
    pub embedded: usize,
    /// Chunks skipped because a vector already existed.
    pub skipped: usize,
    /// Batches whose embedding request failed.
    pub batches_failed: usize,
}

/// Chunks assembled under a token budget to accompany a review query.
#[derive(Debug, Clone, Default)]
pub struct ContextWindow {
    pub chunks: Vec<ScoredChunk>,
    pub total_tokens: usize,
}

/// Token cost estimator: `ceil(len/4)`. Contractual so context packing is
/// deterministic.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Adaptive dimensionality for a complexity class: a quarter, half, or the
/// full width, floored at 16.
pub fn adaptive_dimensions(full: usize, complexity: Complexity) -> usize {
    let target = match complexity {
        Complexity::Simple => full / 4,
        Complexity::Medium => full / 2,
        Complexity::Complex => full,
    };
    target.max(MIN_ADAPTIVE_DIMENSIONS.min(full))
}

/// Retrieval service over one client and one vector store.
pub struct RagService {
    client: SharedClient,
    vectors: Arc<dyn VectorStore>,
    settings: RagSettings,
}

impl RagService {
    pub fn new(client: SharedClient, vectors: Arc<dyn VectorStore>, settings: RagSettings) -> Self {
        Self {
            client,
            vectors,
            settings,
        }
    }

    pub fn settings(&self) -> &RagSettings {
        &self.settings
    }

    /// Embed chunks in batches and persist their vectors.
    ///
    /// Already-embedded chunks (by chunk id) are skipped, making the
    /// operation idempotent for a stable corpus. Per-batch failures are
    /// logged and tolerated; if every batch fails the run is an error.
    pub async fn process_chunks(
        &self,
        chunks: &[Chunk],
        metadata_fn: Option<MetadataFn<'_>>,
    ) -> Result<EmbedReport, ReviewError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let mut report = EmbedReport::default();
        if chunks.is_empty() {
            return Ok(report);
        }

        let ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();
        let existing = self.vectors.existing_chunk_ids(&ids)?;

        let pending: Vec<&Chunk> = chunks
            .iter()
            .filter(|c| !existing.contains(&c.id))
            .collect();
        report.skipped = chunks.len() - pending.len();

        if pending.is_empty() {
            debug!(skipped = report.skipped, "all chunks already embedded");
            return Ok(report);
        }

        let batch_size = self.settings.batch_size.max(1);
        let mut batches_attempted = 0usize;

        for batch in pending.chunks(batch_size) {
            batches_attempted += 1;
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();

            let embeddings = match self.client.batch_embeddings(&texts).await {
                Ok(embeddings) => embeddings,
                Err(err) => {
                    warn!(batch = batches_attempted, error = %err, "embedding batch failed");
                    report.batches_failed += 1;
                    continue;
                }
            };

            if embeddings.len() != batch.len() {
                warn!(
                    batch = batches_attempted,
                    inputs = batch.len(),
                    outputs = embeddings.len(),
                    "embedding batch length mismatch"
                );
                report.batches_failed += 1;
                continue;
            }

            for (chunk, embedding) in batch.iter().zip(embeddings) {
                if let Err(err) = self.store_one(chunk, embedding, metadata_fn) {
                    warn!(chunk_id = %chunk.id, error = %err, "failed to store vector");
                    continue;
                }
                report.embedded += 1;
            }
        }

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("rag.process_chunks", start.elapsed());

        if report.embedded == 0 && report.batches_failed == batches_attempted {
            return Err(ReviewError::EmbedFailed(format!(
                "all {} embedding batches failed",
                batches_attempted
            )));
        }

        Ok(report)
    }

    fn store_one(
        &self,
        chunk: &Chunk,
        mut embedding: Vec<f32>,
        metadata_fn: Option<MetadataFn<'_>>,
    ) -> Result<(), ReviewError> {
        let mut metadata = match metadata_fn {
            Some(project) => project(chunk),
            None => VectorMetadata {
                normalized: self.settings.normalization,
                ..Default::default()
            },
        };

        // Complexity-aware mode slices the embedding before storing; the
        // chosen dimensionality lands in the vector metadata via the store.
        if self.settings.enable_compression {
            if let Some(complexity) = chunk.metadata.complexity {
                let dims = adaptive_dimensions(embedding.len(), complexity);
                if dims < embedding.len() {
                    embedding = ops::slice(&embedding, 0, dims)?;
                }
                metadata.complexity = Some(complexity.as_str().to_string());
            }
        }

        self.vectors.store(
            &embedding,
            &chunk.id,
            &chunk.workspace_id,
            metadata,
            self.settings.vector_type,
        )?;
        Ok(())
    }

    /// Embed a query, retrieve similar chunks, and pack them greedily under
    /// `max_tokens` (non-positive defaults to 2048).
    pub async fn build_context(
        &self,
        query: &str,
        mut options: SearchOptions,
        max_tokens: i64,
    ) -> Result<ContextWindow, ReviewError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        if options.limit == 0 {
            options.limit = self.settings.n_similar_chunks;
        }
        if options.min_similarity == 0.0 {
            options.min_similarity = self.settings.min_similarity;
        }

        let query_embedding = self.client.generate_embedding(query).await?;
        let results = self.vectors.find_similar(&query_embedding, &options)?;
        let window = pack_chunks(results, budget_from(max_tokens));

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("rag.build_context", start.elapsed());

        Ok(window)
    }
}

fn budget_from(max_tokens: i64) -> usize {
    if max_tokens <= 0 {
        DEFAULT_CONTEXT_TOKENS
    } else {
        max_tokens as usize
    }
}

/// Greedy packer over similarity-sorted results.
///
/// Oversized chunks are skipped, not break points - smaller candidates
/// behind them may still fit. Packing stops early once 90% of the budget is
/// consumed.
fn pack_chunks(results: Vec<ScoredChunk>, budget: usize) -> ContextWindow {
    let stop_at = budget * BUDGET_STOP_NUMERATOR / BUDGET_STOP_DENOMINATOR;
    let mut window = ContextWindow::default();

    for result in results {
        let cost = estimate_tokens(&result.chunk.content);
        if window.total_tokens + cost > budget {
            continue;
        }
        window.total_tokens += cost;
        window.chunks.push(result);

        if window.total_tokens >= stop_at {
            break;
        }
    }

    window
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::error::ProviderError;
    use crate::parser::{ChunkMetadata, ChunkType};
    use crate::store::{ChunkRepo, FileRepo, SqliteStore, WorkspaceRepo};
    use crate::types::{ChatRequest, ChatResponse, ChatStream, CompletionRequest, LlmClient};
    use crate::vector::store::SqliteVectorStore;

    /// Deterministic embedding client that counts embedding calls.
    struct CountingEmbedder {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }

        fn embed(text: &str) -> Vec<f32> {
            // Cheap deterministic direction from the text bytes.
            let sum: u32 = text.bytes().map(u32::from).sum();
            vec![1.0, (sum % 7) as f32 * 0.1, (sum % 3) as f32 * 0.1, 0.5]
        }
    }

    #[async_trait]
    impl LlmClient for CountingEmbedder {
        async fn generate_chat(&self, _: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            unimplemented!("not used in rag tests")
        }

        async fn generate_chat_stream(&self, _: &ChatRequest) -> Result<ChatStream, ProviderError> {
            unimplemented!("not used in rag tests")
        }

        async fn generate_completion(
            &self,
            _: &CompletionRequest,
        ) -> Result<ChatResponse, ProviderError> {
            unimplemented!("not used in rag tests")
        }

        async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ProviderError::Network("embedder down".to_string()));
            }
            Ok(Self::embed(text))
        }

        async fn batch_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ProviderError::Network("embedder down".to_string()));
            }
            Ok(texts.iter().map(|t| Self::embed(t)).collect())
        }

        fn name(&self) -> &str {
            "Counting"
        }

        fn model(&self) -> &str {
            "test-embed"
        }
    }

    struct Fixture {
        store: SqliteStore,
        service: RagService,
        client: Arc<CountingEmbedder>,
        vectors: Arc<SqliteVectorStore>,
        workspace_id: String,
        file_id: String,
    }

    fn fixture_with(client: Arc<CountingEmbedder>, settings: RagSettings) -> Fixture {
        let store = SqliteStore::open_in_memory().unwrap();
        let ws = store.ensure_workspace("/repo", "repo").unwrap();
        let file = store.upsert_file(&ws.id, "main.go", "go", None).unwrap();
        let vectors = Arc::new(SqliteVectorStore::new(store.connection()));
        let service = RagService::new(client.clone(), vectors.clone(), settings);
        Fixture {
            store,
            service,
            client,
            vectors,
            workspace_id: ws.id,
            file_id: file.id,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(CountingEmbedder::new()), RagSettings::default())
    }

    fn make_chunk(fixture: &Fixture, id: &str, content: &str) -> Chunk {
        let chunk = Chunk {
            id: id.to_string(),
            workspace_id: fixture.workspace_id.clone(),
            file_id: fixture.file_id.clone(),
            name: id.to_string(),
            chunk_type: ChunkType::Function,
            content: content.to_string(),
            signature: None,
            start_line: 1,
            end_line: 1,
            start_offset: 0,
            end_offset: content.len() as u32,
            parent_id: None,
            child_ids: Vec::new(),
            metadata: ChunkMetadata::default(),
        };
        fixture.store.insert_chunks(std::slice::from_ref(&chunk)).unwrap();
        chunk
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens(&"x".repeat(100)), 25);
    }

    #[test]
    fn test_adaptive_dimensions() {
        assert_eq!(adaptive_dimensions(768, Complexity::Simple), 192);
        assert_eq!(adaptive_dimensions(768, Complexity::Medium), 384);
        assert_eq!(adaptive_dimensions(768, Complexity::Complex), 768);
        // Floor of 16.
        assert_eq!(adaptive_dimensions(32, Complexity::Simple), 16);
        // Tiny embeddings keep their width.
        assert_eq!(adaptive_dimensions(8, Complexity::Simple), 8);
    }

    #[test]
    fn test_pack_chunks_skips_oversized() {
        let make = |id: &str, len: usize, similarity: f32| ScoredChunk {
            chunk: Chunk {
                id: id.to_string(),
                workspace_id: "ws".to_string(),
                file_id: "f".to_string(),
                name: id.to_string(),
                chunk_type: ChunkType::Function,
                content: "x".repeat(len),
                signature: None,
                start_line: 1,
                end_line: 1,
                start_offset: 0,
                end_offset: len as u32,
                parent_id: None,
                child_ids: Vec::new(),
                metadata: ChunkMetadata::default(),
            },
            similarity,
            distance: None,
        };

        // Budget 100 tokens: big (88) fits, huge (80) would overflow and is
        // skipped, small (8) behind it still fits.
        let window = pack_chunks(
            vec![make("big", 352, 0.9), make("huge", 320, 0.8), make("small", 32, 0.7)],
            100,
        );

        let ids: Vec<&str> = window.chunks.iter().map(|c| c.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["big", "small"]);
        assert_eq!(window.total_tokens, 96);
    }

    #[test]
    fn test_pack_chunks_stops_at_ninety_percent() {
        let make = |id: &str, len: usize| ScoredChunk {
            chunk: Chunk {
                id: id.to_string(),
                workspace_id: "ws".to_string(),
                file_id: "f".to_string(),
                name: id.to_string(),
                chunk_type: ChunkType::Function,
                content: "x".repeat(len),
                signature: None,
                start_line: 1,
                end_line: 1,
                start_offset: 0,
                end_offset: len as u32,
                parent_id: None,
                child_ids: Vec::new(),
                metadata: ChunkMetadata::default(),
            },
            similarity: 0.9,
            distance: None,
        };

        // 92 tokens out of 100 crosses the 90% stop line; the last chunk is
        // never considered.
        let window = pack_chunks(vec![make("a", 368), make("b", 16)], 100);
        assert_eq!(window.chunks.len(), 1);
        assert_eq!(window.total_tokens, 92);
    }

    #[tokio::test]
    async fn test_process_chunks_idempotent() {
        let f = fixture();
        let chunks = vec![
            make_chunk(&f, "c1", "func a() {}"),
            make_chunk(&f, "c2", "func b() {}"),
        ];

        let report = f.service.process_chunks(&chunks, None).await.unwrap();
        assert_eq!(report.embedded, 2);
        assert_eq!(report.skipped, 0);
        let calls_after_first = f.client.calls.load(Ordering::SeqCst);
        assert!(calls_after_first > 0);

        // Second run over the same corpus issues zero embedding requests.
        let report = f.service.process_chunks(&chunks, None).await.unwrap();
        assert_eq!(report.embedded, 0);
        assert_eq!(report.skipped, 2);
        assert_eq!(f.client.calls.load(Ordering::SeqCst), calls_after_first);
    }

    #[tokio::test]
    async fn test_process_chunks_total_failure_is_error() {
        let f = fixture_with(Arc::new(CountingEmbedder::failing()), RagSettings::default());
        let chunks = vec![make_chunk(&f, "c1", "func a() {}")];

        let result = f.service.process_chunks(&chunks, None).await;
        assert!(matches!(result, Err(ReviewError::EmbedFailed(_))));
    }

    #[tokio::test]
    async fn test_process_chunks_empty_is_ok() {
        let f = fixture();
        let report = f.service.process_chunks(&[], None).await.unwrap();
        assert_eq!(report.embedded, 0);
        assert_eq!(report.skipped, 0);
    }

    #[tokio::test]
    async fn test_adaptive_slicing_records_dimensions() {
        let settings = RagSettings {
            enable_compression: true,
            ..Default::default()
        };
        let f = fixture_with(Arc::new(CountingEmbedder::new()), settings);

        let mut chunk = make_chunk(&f, "c1", "func tiny() {}");
        chunk.metadata.complexity = Some(Complexity::Simple);

        f.service
            .process_chunks(std::slice::from_ref(&chunk), None)
            .await
            .unwrap();

        // 4-dim test embeddings floor at the full width, so the stored
        // vector keeps 4 dims; the metadata records the choice.
        let existing = f.vectors.existing_chunk_ids(&["c1".to_string()]).unwrap();
        assert!(existing.contains("c1"));
    }

    #[tokio::test]
    async fn test_build_context_retrieves_and_packs() {
        let f = fixture();
        let chunks = vec![
            make_chunk(&f, "c1", "func handler() { return }"),
            make_chunk(&f, "c2", "func helper() { return }"),
        ];
        f.service.process_chunks(&chunks, None).await.unwrap();

        let options = SearchOptions::for_workspace(&f.workspace_id);
        let window = f
            .service
            .build_context("func handler", options, 0)
            .await
            .unwrap();

        assert!(!window.chunks.is_empty());
        assert!(window.total_tokens > 0);
        assert!(window.total_tokens <= DEFAULT_CONTEXT_TOKENS);
    }
}
