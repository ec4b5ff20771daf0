// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Review orchestration.
//!
//! Drives one review through its phases:
//!
//! ```text
//! created -> parsing -> embedding -> reviewing -> completed
//!                                       |
//!                                       +-> failed
//! ```
//!
//! Per-file errors (parse failures, provider errors, unparseable replies)
//! are recorded against the file and the run continues; only total
//! embedding failure or a store fault fails the review. Cancellation leaves
//! the review in progress rather than failed.

pub mod prompt;
pub mod response;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::config::RagSettings;
use crate::error::ReviewError;
use crate::llm::{ClientFactory, ProviderKind};
use crate::parser::{Chunk, Complexity, Language, ParserRegistry};
use crate::rag::RagService;
use crate::store::{
    Issue, Review, ReviewFile, ReviewKind, ReviewStatus, ReviewSummary, Store, Workspace,
};
use crate::types::ChatRequest;
use crate::vector::types::SearchOptions;

/// Phase of a running review, surfaced to the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewPhase {
    Parsing,
    Embedding,
    Reviewing,
    Completed,
    Failed,
}

impl ReviewPhase {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Parsing => "parse",
            Self::Embedding => "embed",
            Self::Reviewing => "review",
            Self::Completed => "done",
            Self::Failed => "failed",
        }
    }
}

/// Progress event stream consumed by the shell. The orchestrator only
/// emits; the shell only observes.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub phase: ReviewPhase,
    pub detail: String,
    pub done: usize,
    pub total: usize,
}

/// What to review: a version-control slice plus the files the diff
/// resolver produced.
#[derive(Debug, Clone)]
pub struct ReviewOptions {
    pub kind: ReviewKind,
    pub commit_hash: Option<String>,
    pub base_branch: Option<String>,
    pub head_branch: Option<String>,
    /// Changed files, workspace-relative or absolute.
    pub files: Vec<PathBuf>,
    /// Explicit provider; the factory default otherwise.
    pub provider: Option<ProviderKind>,
}

impl ReviewOptions {
    pub fn staged(files: Vec<PathBuf>) -> Self {
        Self {
            kind: ReviewKind::Staged,
            commit_hash: None,
            base_branch: None,
            head_branch: None,
            files,
            provider: None,
        }
    }
}

/// Result of a finished (or zero-file) review.
#[derive(Debug)]
pub struct ReviewOutcome {
    pub review: Review,
    pub issues: Vec<Issue>,
    pub summary: ReviewSummary,
}

/// The review orchestrator.
pub struct Orchestrator {
    store: Arc<dyn Store>,
    rag: Arc<RagService>,
    factory: Arc<ClientFactory>,
    parser: Mutex<ParserRegistry>,
    workspace: Workspace,
    settings: RagSettings,
    cancel: CancelToken,
    progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        rag: Arc<RagService>,
        factory: Arc<ClientFactory>,
        workspace: Workspace,
        settings: RagSettings,
        cancel: CancelToken,
    ) -> Result<Self, ReviewError> {
        Ok(Self {
            store,
            rag,
            factory,
            parser: Mutex::new(ParserRegistry::new()?),
            workspace,
            settings,
            cancel,
            progress: None,
        })
    }

    /// Attach a progress channel for the shell.
    pub fn with_progress(mut self, sender: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    fn emit(&self, phase: ReviewPhase, detail: impl Into<String>, done: usize, total: usize) {
        if let Some(sender) = &self.progress {
            let _ = sender.send(ProgressEvent {
                phase,
                detail: detail.into(),
                done,
                total,
            });
        }
    }

    fn check_cancelled(&self) -> Result<(), ReviewError> {
        if self.cancel.is_cancelled() {
            // The review stays in progress; cancellation is not failure.
            Err(ReviewError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Run one review to completion.
    pub async fn run(&self, options: ReviewOptions) -> Result<ReviewOutcome, ReviewError> {
        let mut review = Review::new(&self.workspace.id, options.kind);
        review.commit_hash = options.commit_hash.clone();
        review.base_branch = options.base_branch.clone();
        review.head_branch = options.head_branch.clone();
        self.store.create_review(&review)?;
        self.store
            .set_review_status(&review.id, ReviewStatus::InProgress, None)?;
        review.status = ReviewStatus::InProgress;

        match self.drive(&review, &options).await {
            Ok(outcome) => Ok(outcome),
            Err(err) if err.is_cancelled() => {
                info!(review_id = %review.id, "review cancelled; leaving in progress");
                Err(err)
            }
            Err(err) => {
                let now = Utc::now();
                if let Err(store_err) =
                    self.store
                        .set_review_status(&review.id, ReviewStatus::Failed, Some(now))
                {
                    warn!(error = %store_err, "failed to mark review failed");
                }
                self.emit(ReviewPhase::Failed, err.to_string(), 0, 0);
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        review: &Review,
        options: &ReviewOptions,
    ) -> Result<ReviewOutcome, ReviewError> {
        // -- parsing ---------------------------------------------------
        let parsed_files = self.parse_files(options)?;
        let all_chunks: Vec<Chunk> = parsed_files
            .iter()
            .flat_map(|f| f.chunks.iter().cloned())
            .collect();

        // An empty change set is a completed review with zero issues.
        if all_chunks.is_empty() {
            return self.complete(review);
        }

        // -- embedding -------------------------------------------------
        self.check_cancelled()?;
        self.emit(ReviewPhase::Embedding, "embedding chunks", 0, all_chunks.len());
        let report = self.rag.process_chunks(&all_chunks, None).await?;
        self.emit(
            ReviewPhase::Embedding,
            format!("embedded {} chunks ({} cached)", report.embedded, report.skipped),
            all_chunks.len(),
            all_chunks.len(),
        );

        // -- reviewing -------------------------------------------------
        let client = self.factory.client(options.provider)?;
        let provider_kind = options.provider.unwrap_or_else(|| {
            client
                .name()
                .to_lowercase()
                .parse()
                .unwrap_or(self.factory.default_kind())
        });
        let diff_hint = review.diff_hint();

        let total = parsed_files.len();
        for (index, file) in parsed_files.iter().enumerate() {
            self.check_cancelled()?;
            self.emit(ReviewPhase::Reviewing, file.display_path.clone(), index, total);

            let review_file = self.review_one_file(review, file, &client, provider_kind, &diff_hint).await;
            match review_file {
                Ok(issues_count) => {
                    self.emit(
                        ReviewPhase::Reviewing,
                        format!("{}: {} issues", file.display_path, issues_count),
                        index + 1,
                        total,
                    );
                }
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => {
                    // Per-file failures are recorded and do not abort the run.
                    warn!(file = %file.display_path, error = %err, "file review failed");
                    let record = ReviewFile::new(&review.id, &file.file_id);
                    self.store.create_review_file(&record)?;
                }
            }
        }

        self.complete(review)
    }

    fn complete(&self, review: &Review) -> Result<ReviewOutcome, ReviewError> {
        let now = Utc::now();
        self.store
            .set_review_status(&review.id, ReviewStatus::Completed, Some(now))?;

        let issues = self.store.issues_for_review(&review.id)?;
        let summary = self.store.review_summary(&review.id)?;
        self.emit(
            ReviewPhase::Completed,
            format!("{} issues across {} files", summary.total_issues, summary.files_reviewed),
            summary.files_reviewed as usize,
            summary.files_reviewed as usize,
        );

        let mut review = review.clone();
        review.status = ReviewStatus::Completed;
        review.completed_at = Some(now);

        Ok(ReviewOutcome {
            review,
            issues,
            summary,
        })
    }

    // ------------------------------------------------------------------
    // parsing phase
    // ------------------------------------------------------------------

    fn parse_files(&self, options: &ReviewOptions) -> Result<Vec<ParsedFileState>, ReviewError> {
        let total = options.files.len();
        let mut parsed = Vec::with_capacity(total);

        for (index, path) in options.files.iter().enumerate() {
            self.check_cancelled()?;
            let display_path = display_path(path, &self.workspace.path);
            self.emit(ReviewPhase::Parsing, display_path.clone(), index, total);

            match self.parse_one(path, &display_path) {
                Ok(state) => parsed.push(state),
                Err(err) => {
                    // Recorded, skipped, and the run continues.
                    warn!(file = %display_path, error = %err, "parse failed");
                }
            }
        }

        self.emit(ReviewPhase::Parsing, "parsed", total, total);
        Ok(parsed)
    }

    fn parse_one(&self, path: &Path, display_path: &str) -> Result<ParsedFileState, ReviewError> {
        let content = std::fs::read_to_string(path).map_err(crate::error::ParseError::from)?;

        let language = path
            .extension()
            .and_then(|e| e.to_str())
            .map(Language::from_extension)
            .unwrap_or(Language::Unknown);

        let file = self.store.upsert_file(
            &self.workspace.id,
            display_path,
            language.as_str(),
            file_mtime(path),
        )?;

        let mut registry = self
            .parser
            .lock()
            .map_err(|_| ReviewError::InvalidState("parser lock poisoned".to_string()))?;
        let parsed = registry.parse_file(&self.workspace.id, &file.id, path)?;
        drop(registry);

        let mut chunks = parsed.chunks;
        if self.settings.enable_compression {
            for chunk in &mut chunks {
                chunk.metadata.complexity = Some(classify_complexity(chunk));
            }
        }
        self.store.insert_chunks(&chunks)?;

        Ok(ParsedFileState {
            file_id: file.id,
            display_path: display_path.to_string(),
            language: parsed.language,
            line_count: content.lines().count().max(1) as u32,
            content,
            chunks,
        })
    }

    // ------------------------------------------------------------------
    // reviewing phase
    // ------------------------------------------------------------------

    async fn review_one_file(
        &self,
        review: &Review,
        file: &ParsedFileState,
        client: &crate::types::SharedClient,
        provider_kind: ProviderKind,
        diff_hint: &str,
    ) -> Result<u32, ReviewError> {
        // Retrieve related chunks, excluding the file under review.
        let search = SearchOptions {
            workspace_id: Some(self.workspace.id.clone()),
            exclude_file_id: Some(file.file_id.clone()),
            limit: self.settings.n_similar_chunks,
            min_similarity: self.settings.min_similarity,
            metric: self.settings.default_metric,
            normalization: self.settings.normalization,
            ..Default::default()
        };

        let context = match self
            .rag
            .build_context(&file.content, search, self.settings.max_context_tokens as i64)
            .await
        {
            Ok(context) => context,
            Err(err) => {
                warn!(file = %file.display_path, error = %err, "context retrieval failed; reviewing without context");
                Default::default()
            }
        };

        let file_context = prompt::file_context(
            &file.display_path,
            file.language,
            diff_hint,
            &file.content,
            &context.chunks,
        );
        let messages = prompt::build_messages(provider_kind, &file_context);

        // Non-streaming for robustness; the cancel token aborts the wait.
        let request = ChatRequest::new(messages);
        let response = tokio::select! {
            response = client.generate_chat(&request) => response?,
            _ = self.cancel.cancelled() => return Err(ReviewError::Cancelled),
        };

        let mut review_file = ReviewFile::new(&review.id, &file.file_id);

        let drafts = match response::parse_reply(&response.content, file.line_count) {
            Ok(parsed) => {
                info!(
                    file = %file.display_path,
                    issues = parsed.issues.len(),
                    summary = %parsed.summary,
                    "file reviewed"
                );
                parsed.issues
            }
            Err(err) => {
                warn!(file = %file.display_path, error = %err, "unparseable reply; recording zero issues");
                Vec::new()
            }
        };

        review_file.issues_count = drafts.len() as u32;
        self.store.create_review_file(&review_file)?;

        if !drafts.is_empty() {
            let now = Utc::now();
            let issues: Vec<Issue> = drafts
                .into_iter()
                .map(|draft| Issue {
                    id: Uuid::new_v4().to_string(),
                    review_id: review.id.clone(),
                    review_file_id: review_file.id.clone(),
                    issue_type: draft.issue_type,
                    severity: draft.severity,
                    title: draft.title,
                    description: draft.description,
                    suggestion: draft.suggestion,
                    affected_code: draft.affected_code,
                    code_snippet: draft.code_snippet,
                    line_start: draft.line_start,
                    line_end: draft.line_end,
                    is_valid: false,
                    created_at: now,
                    updated_at: now,
                    metadata: Some(serde_json::json!({ "file_path": file.display_path })),
                })
                .collect();
            self.store.insert_issues(&issues)?;
        }

        Ok(review_file.issues_count)
    }
}

/// Per-file state carried between phases.
struct ParsedFileState {
    file_id: String,
    display_path: String,
    language: Language,
    line_count: u32,
    content: String,
    chunks: Vec<Chunk>,
}

/// Complexity heuristic for adaptive dimensionality.
fn classify_complexity(chunk: &Chunk) -> Complexity {
    match chunk.line_count() {
        0..=10 => Complexity::Simple,
        11..=40 => Complexity::Medium,
        _ => Complexity::Complex,
    }
}

fn display_path(path: &Path, workspace_root: &str) -> String {
    path.strip_prefix(workspace_root)
        .unwrap_or(path)
        .to_string_lossy()
        .to_string()
}

fn file_mtime(path: &Path) -> Option<chrono::DateTime<Utc>> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(chrono::DateTime::<Utc>::from)
}
