// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Persistence facade.
//!
//! Repository traits for each entity plus the default SQLite-backed
//! implementation. The core pipeline compiles against the traits alone;
//! [`SqliteStore`] is the only concrete backend shipped.

pub mod sqlite;
pub mod types;

pub use sqlite::SqliteStore;
pub use types::{
    FileRecord, Issue, IssueType, Review, ReviewFile, ReviewKind, ReviewStatus, ReviewSummary,
    Severity, Workspace,
};

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::parser::Chunk;

/// Workspace lifecycle.
pub trait WorkspaceRepo: Send + Sync {
    /// Create-or-load the workspace row for a repository root.
    fn ensure_workspace(&self, path: &str, name: &str) -> Result<Workspace, StoreError>;

    fn get_workspace(&self, id: &str) -> Result<Workspace, StoreError>;

    /// Deleting a workspace deletes all downstream entities.
    fn delete_workspace(&self, id: &str) -> Result<(), StoreError>;
}

/// Files observed inside a workspace.
pub trait FileRepo: Send + Sync {
    /// Upsert by (workspace, path); returns the persisted record.
    fn upsert_file(
        &self,
        workspace_id: &str,
        path: &str,
        language: &str,
        last_modified: Option<DateTime<Utc>>,
    ) -> Result<FileRecord, StoreError>;

    fn get_file(&self, id: &str) -> Result<FileRecord, StoreError>;

    fn files_for_workspace(&self, workspace_id: &str) -> Result<Vec<FileRecord>, StoreError>;
}

/// Parsed chunks.
pub trait ChunkRepo: Send + Sync {
    /// Insert a batch inside one transaction; existing ids are replaced.
    fn insert_chunks(&self, chunks: &[Chunk]) -> Result<(), StoreError>;

    fn get_chunk(&self, id: &str) -> Result<Chunk, StoreError>;

    fn chunks_for_file(&self, file_id: &str) -> Result<Vec<Chunk>, StoreError>;

    fn delete_chunks_for_file(&self, file_id: &str) -> Result<usize, StoreError>;
}

/// Reviews, review files, and issues.
pub trait ReviewRepo: Send + Sync {
    fn create_review(&self, review: &Review) -> Result<(), StoreError>;

    fn get_review(&self, id: &str) -> Result<Review, StoreError>;

    /// Most recently created review in a workspace, if any.
    fn latest_review_for_workspace(&self, workspace_id: &str)
        -> Result<Option<Review>, StoreError>;

    fn set_review_status(
        &self,
        id: &str,
        status: ReviewStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    fn create_review_file(&self, review_file: &ReviewFile) -> Result<(), StoreError>;

    fn insert_issues(&self, issues: &[Issue]) -> Result<(), StoreError>;

    fn issues_for_review_file(&self, review_file_id: &str) -> Result<Vec<Issue>, StoreError>;

    fn issues_for_review(&self, review_id: &str) -> Result<Vec<Issue>, StoreError>;

    /// Persist the user's accept/reject toggle.
    fn set_issue_valid(&self, issue_id: &str, is_valid: bool) -> Result<(), StoreError>;

    fn review_summary(&self, review_id: &str) -> Result<ReviewSummary, StoreError>;
}

/// String key/value settings.
pub trait SettingsRepo: Send + Sync {
    fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Everything the review pipeline needs from the backing store.
pub trait Store: WorkspaceRepo + FileRepo + ChunkRepo + ReviewRepo + SettingsRepo {}

impl<T: WorkspaceRepo + FileRepo + ChunkRepo + ReviewRepo + SettingsRepo> Store for T {}
