// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! SQLite-backed persistence.
//!
//! One connection, WAL journaling, foreign keys on. The vector store shares
//! this connection so similarity search can join vectors with their chunks.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::StoreError;
use crate::parser::{Chunk, ChunkMetadata, ChunkType};

use super::types::{
    FileRecord, Issue, IssueType, Review, ReviewFile, ReviewKind, ReviewStatus, ReviewSummary,
    Severity, Workspace,
};
use super::{ChunkRepo, FileRepo, ReviewRepo, SettingsRepo, WorkspaceRepo};

/// Schema version recorded in the settings table.
pub const SCHEMA_VERSION: &str = "1";

/// Column list used by every chunk SELECT, kept in one place so the row
/// mapper stays in sync.
pub(crate) const CHUNK_COLUMNS: &str = "id, workspace_id, file_id, name, chunk_type, content, \
     signature, start_line, end_line, start_offset, end_offset, parent_id, child_ids, metadata";

const ISSUE_COLUMNS: &str = "id, review_id, review_file_id, issue_type, severity, title, \
     description, suggestion, affected_code, code_snippet, line_start, line_end, is_valid, \
     created_at, updated_at, metadata";

/// SQLite-backed store implementing every repository trait.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create a store at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(format!("create db directory: {}", e)))?;
        }
        let conn = Connection::open(path)
            .map_err(|e| StoreError::Unavailable(format!("open database: {}", e)))?;
        Self::from_connection(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Unavailable(format!("open database: {}", e)))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA cache_size = -64000;",
        )?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Shared connection handle for the vector store.
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS workspaces (
                id TEXT PRIMARY KEY,
                path TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS files (
                id TEXT PRIMARY KEY,
                workspace_id TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
                path TEXT NOT NULL,
                language TEXT NOT NULL,
                last_modified TEXT,
                UNIQUE(workspace_id, path)
            );

            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                workspace_id TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
                file_id TEXT NOT NULL REFERENCES files(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                chunk_type TEXT NOT NULL,
                content TEXT NOT NULL,
                signature TEXT,
                start_line INTEGER NOT NULL,
                end_line INTEGER NOT NULL,
                start_offset INTEGER NOT NULL,
                end_offset INTEGER NOT NULL,
                parent_id TEXT,
                child_ids TEXT NOT NULL DEFAULT '[]',
                metadata TEXT NOT NULL DEFAULT '{}'
            );

            CREATE TABLE IF NOT EXISTS vectors (
                id TEXT PRIMARY KEY,
                chunk_id TEXT NOT NULL UNIQUE REFERENCES chunks(id) ON DELETE CASCADE,
                workspace_id TEXT NOT NULL,
                embedding BLOB NOT NULL,
                vector_type TEXT NOT NULL,
                dimensions INTEGER NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS reviews (
                id TEXT PRIMARY KEY,
                workspace_id TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
                review_kind TEXT NOT NULL,
                commit_hash TEXT,
                base_branch TEXT,
                head_branch TEXT,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                completed_at TEXT
            );

            CREATE TABLE IF NOT EXISTS review_files (
                id TEXT PRIMARY KEY,
                review_id TEXT NOT NULL REFERENCES reviews(id) ON DELETE CASCADE,
                file_id TEXT NOT NULL,
                issues_count INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS issues (
                id TEXT PRIMARY KEY,
                review_id TEXT NOT NULL REFERENCES reviews(id) ON DELETE CASCADE,
                review_file_id TEXT NOT NULL REFERENCES review_files(id) ON DELETE CASCADE,
                issue_type TEXT NOT NULL,
                severity TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                suggestion TEXT NOT NULL,
                affected_code TEXT NOT NULL,
                code_snippet TEXT NOT NULL,
                line_start INTEGER NOT NULL,
                line_end INTEGER NOT NULL,
                is_valid INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                metadata TEXT
            );

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_files_workspace ON files(workspace_id);
            CREATE INDEX IF NOT EXISTS idx_chunks_file ON chunks(file_id);
            CREATE INDEX IF NOT EXISTS idx_chunks_workspace ON chunks(workspace_id);
            CREATE INDEX IF NOT EXISTS idx_vectors_workspace ON vectors(workspace_id);
            CREATE INDEX IF NOT EXISTS idx_issues_review_file ON issues(review_file_id);
            CREATE INDEX IF NOT EXISTS idx_review_files_review ON review_files(review_id);
            "#,
        )?;

        conn.execute(
            "INSERT OR IGNORE INTO settings (key, value) VALUES ('schema_version', ?1)",
            params![SCHEMA_VERSION],
        )?;

        Ok(())
    }
}

impl WorkspaceRepo for SqliteStore {
    fn ensure_workspace(&self, path: &str, name: &str) -> Result<Workspace, StoreError> {
        let conn = self.conn()?;

        let existing = conn
            .query_row(
                "SELECT id, path, name, created_at FROM workspaces WHERE path = ?1",
                params![path],
                workspace_from_row,
            )
            .optional()?;

        if let Some(workspace) = existing {
            return Ok(workspace);
        }

        let workspace = Workspace::new(path, name);
        conn.execute(
            "INSERT INTO workspaces (id, path, name, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                workspace.id,
                workspace.path,
                workspace.name,
                workspace.created_at.to_rfc3339()
            ],
        )?;
        Ok(workspace)
    }

    fn get_workspace(&self, id: &str) -> Result<Workspace, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, path, name, created_at FROM workspaces WHERE id = ?1",
            params![id],
            workspace_from_row,
        )
        .map_err(StoreError::from)
    }

    fn delete_workspace(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM workspaces WHERE id = ?1", params![id])?;
        Ok(())
    }
}

impl FileRepo for SqliteStore {
    fn upsert_file(
        &self,
        workspace_id: &str,
        path: &str,
        language: &str,
        last_modified: Option<DateTime<Utc>>,
    ) -> Result<FileRecord, StoreError> {
        let conn = self.conn()?;

        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM files WHERE workspace_id = ?1 AND path = ?2",
                params![workspace_id, path],
                |row| row.get(0),
            )
            .optional()?;

        let modified_sql = last_modified.map(|dt| dt.to_rfc3339());

        let id = match existing {
            Some(id) => {
                conn.execute(
                    "UPDATE files SET language = ?1, last_modified = ?2 WHERE id = ?3",
                    params![language, modified_sql, id],
                )?;
                id
            }
            None => {
                let id = Uuid::new_v4().to_string();
                conn.execute(
                    "INSERT INTO files (id, workspace_id, path, language, last_modified)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![id, workspace_id, path, language, modified_sql],
                )?;
                id
            }
        };

        Ok(FileRecord {
            id,
            workspace_id: workspace_id.to_string(),
            path: path.to_string(),
            language: language.to_string(),
            last_modified,
        })
    }

    fn get_file(&self, id: &str) -> Result<FileRecord, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, workspace_id, path, language, last_modified FROM files WHERE id = ?1",
            params![id],
            file_from_row,
        )
        .map_err(StoreError::from)
    }

    fn files_for_workspace(&self, workspace_id: &str) -> Result<Vec<FileRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, workspace_id, path, language, last_modified
             FROM files WHERE workspace_id = ?1 ORDER BY path",
        )?;
        let files = stmt
            .query_map(params![workspace_id], file_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(files)
    }
}

impl ChunkRepo for SqliteStore {
    fn insert_chunks(&self, chunks: &[Chunk]) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO chunks
                 (id, workspace_id, file_id, name, chunk_type, content, signature,
                  start_line, end_line, start_offset, end_offset, parent_id, child_ids, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            )?;

            for chunk in chunks {
                let child_ids = serde_json::to_string(&chunk.child_ids)?;
                let metadata = serde_json::to_string(&chunk.metadata)?;
                stmt.execute(params![
                    chunk.id,
                    chunk.workspace_id,
                    chunk.file_id,
                    chunk.name,
                    chunk.chunk_type.as_str(),
                    chunk.content,
                    chunk.signature,
                    chunk.start_line,
                    chunk.end_line,
                    chunk.start_offset,
                    chunk.end_offset,
                    chunk.parent_id,
                    child_ids,
                    metadata,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn get_chunk(&self, id: &str) -> Result<Chunk, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM chunks WHERE id = ?1", CHUNK_COLUMNS),
            params![id],
            chunk_from_row,
        )
        .map_err(StoreError::from)
    }

    fn chunks_for_file(&self, file_id: &str) -> Result<Vec<Chunk>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM chunks WHERE file_id = ?1 ORDER BY start_offset",
            CHUNK_COLUMNS
        ))?;
        let chunks = stmt
            .query_map(params![file_id], chunk_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(chunks)
    }

    fn delete_chunks_for_file(&self, file_id: &str) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM chunks WHERE file_id = ?1", params![file_id])?;
        Ok(deleted)
    }
}

impl ReviewRepo for SqliteStore {
    fn create_review(&self, review: &Review) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO reviews
             (id, workspace_id, review_kind, commit_hash, base_branch, head_branch,
              status, created_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                review.id,
                review.workspace_id,
                review.kind.as_str(),
                review.commit_hash,
                review.base_branch,
                review.head_branch,
                review.status.as_str(),
                review.created_at.to_rfc3339(),
                review.completed_at.map(|dt| dt.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    fn get_review(&self, id: &str) -> Result<Review, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, workspace_id, review_kind, commit_hash, base_branch, head_branch,
                    status, created_at, completed_at
             FROM reviews WHERE id = ?1",
            params![id],
            review_from_row,
        )
        .map_err(StoreError::from)
    }

    fn latest_review_for_workspace(
        &self,
        workspace_id: &str,
    ) -> Result<Option<Review>, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, workspace_id, review_kind, commit_hash, base_branch, head_branch,
                    status, created_at, completed_at
             FROM reviews WHERE workspace_id = ?1 ORDER BY created_at DESC LIMIT 1",
            params![workspace_id],
            review_from_row,
        )
        .optional()
        .map_err(StoreError::from)
    }

    fn set_review_status(
        &self,
        id: &str,
        status: ReviewStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE reviews SET status = ?1, completed_at = ?2 WHERE id = ?3",
            params![status.as_str(), completed_at.map(|dt| dt.to_rfc3339()), id],
        )?;
        Ok(())
    }

    fn create_review_file(&self, review_file: &ReviewFile) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO review_files (id, review_id, file_id, issues_count)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                review_file.id,
                review_file.review_id,
                review_file.file_id,
                review_file.issues_count,
            ],
        )?;
        Ok(())
    }

    fn insert_issues(&self, issues: &[Issue]) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO issues ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                ISSUE_COLUMNS
            ))?;

            for issue in issues {
                let metadata = issue
                    .metadata
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?;
                stmt.execute(params![
                    issue.id,
                    issue.review_id,
                    issue.review_file_id,
                    issue.issue_type.as_str(),
                    issue.severity.as_str(),
                    issue.title,
                    issue.description,
                    issue.suggestion,
                    issue.affected_code,
                    issue.code_snippet,
                    issue.line_start,
                    issue.line_end,
                    issue.is_valid,
                    issue.created_at.to_rfc3339(),
                    issue.updated_at.to_rfc3339(),
                    metadata,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn issues_for_review_file(&self, review_file_id: &str) -> Result<Vec<Issue>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM issues WHERE review_file_id = ?1 ORDER BY line_start",
            ISSUE_COLUMNS
        ))?;
        let issues = stmt
            .query_map(params![review_file_id], issue_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(issues)
    }

    fn issues_for_review(&self, review_id: &str) -> Result<Vec<Issue>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM issues WHERE review_id = ?1 ORDER BY created_at, line_start",
            ISSUE_COLUMNS
        ))?;
        let issues = stmt
            .query_map(params![review_id], issue_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(issues)
    }

    fn set_issue_valid(&self, issue_id: &str, is_valid: bool) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE issues SET is_valid = ?1, updated_at = ?2 WHERE id = ?3",
            params![is_valid, Utc::now().to_rfc3339(), issue_id],
        )?;
        Ok(())
    }

    fn review_summary(&self, review_id: &str) -> Result<ReviewSummary, StoreError> {
        let conn = self.conn()?;

        let files_reviewed: u32 = conn.query_row(
            "SELECT COUNT(*) FROM review_files WHERE review_id = ?1",
            params![review_id],
            |row| row.get(0),
        )?;

        let mut summary = ReviewSummary {
            files_reviewed,
            ..Default::default()
        };

        let mut stmt = conn.prepare(
            "SELECT severity, COUNT(*) FROM issues WHERE review_id = ?1 GROUP BY severity",
        )?;
        let rows = stmt.query_map(params![review_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
        })?;

        for row in rows {
            let (severity, count) = row?;
            summary.total_issues += count;
            match Severity::parse(&severity) {
                Some(Severity::Critical) => summary.critical += count,
                Some(Severity::High) => summary.high += count,
                Some(Severity::Medium) => summary.medium += count,
                Some(Severity::Low) => summary.low += count,
                Some(Severity::Info) | None => summary.info += count,
            }
        }

        Ok(summary)
    }
}

impl SettingsRepo for SqliteStore {
    fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(StoreError::from)
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}

// ============================================================================
// Row mappers
// ============================================================================

fn conversion_err(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        rusqlite::types::Type::Text,
        message.into(),
    )
}

fn datetime_from_sql(index: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(index, format!("bad timestamp: {}", e)))
}

fn workspace_from_row(row: &Row<'_>) -> rusqlite::Result<Workspace> {
    Ok(Workspace {
        id: row.get(0)?,
        path: row.get(1)?,
        name: row.get(2)?,
        created_at: datetime_from_sql(3, row.get(3)?)?,
    })
}

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let last_modified: Option<String> = row.get(4)?;
    Ok(FileRecord {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        path: row.get(2)?,
        language: row.get(3)?,
        last_modified: last_modified.map(|s| datetime_from_sql(4, s)).transpose()?,
    })
}

pub(crate) fn chunk_from_row(row: &Row<'_>) -> rusqlite::Result<Chunk> {
    let chunk_type: String = row.get(4)?;
    let chunk_type = ChunkType::parse(&chunk_type)
        .ok_or_else(|| conversion_err(4, format!("unknown chunk type: {}", chunk_type)))?;

    let child_ids: String = row.get(12)?;
    let child_ids: Vec<String> = serde_json::from_str(&child_ids)
        .map_err(|e| conversion_err(12, format!("bad child_ids json: {}", e)))?;

    let metadata: String = row.get(13)?;
    let metadata: ChunkMetadata = serde_json::from_str(&metadata)
        .map_err(|e| conversion_err(13, format!("bad metadata json: {}", e)))?;

    Ok(Chunk {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        file_id: row.get(2)?,
        name: row.get(3)?,
        chunk_type,
        content: row.get(5)?,
        signature: row.get(6)?,
        start_line: row.get(7)?,
        end_line: row.get(8)?,
        start_offset: row.get(9)?,
        end_offset: row.get(10)?,
        parent_id: row.get(11)?,
        child_ids,
        metadata,
    })
}

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<Review> {
    let kind: String = row.get(2)?;
    let kind = ReviewKind::parse(&kind)
        .ok_or_else(|| conversion_err(2, format!("unknown review kind: {}", kind)))?;

    let status: String = row.get(6)?;
    let status = ReviewStatus::parse(&status)
        .ok_or_else(|| conversion_err(6, format!("unknown review status: {}", status)))?;

    let completed_at: Option<String> = row.get(8)?;

    Ok(Review {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        kind,
        commit_hash: row.get(3)?,
        base_branch: row.get(4)?,
        head_branch: row.get(5)?,
        status,
        created_at: datetime_from_sql(7, row.get(7)?)?,
        completed_at: completed_at.map(|s| datetime_from_sql(8, s)).transpose()?,
    })
}

fn issue_from_row(row: &Row<'_>) -> rusqlite::Result<Issue> {
    let issue_type: String = row.get(3)?;
    let issue_type = IssueType::parse(&issue_type)
        .ok_or_else(|| conversion_err(3, format!("unknown issue type: {}", issue_type)))?;

    let severity: String = row.get(4)?;
    let severity = Severity::parse(&severity)
        .ok_or_else(|| conversion_err(4, format!("unknown severity: {}", severity)))?;

    let metadata: Option<String> = row.get(15)?;
    let metadata = metadata
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| conversion_err(15, format!("bad metadata json: {}", e)))?;

    Ok(Issue {
        id: row.get(0)?,
        review_id: row.get(1)?,
        review_file_id: row.get(2)?,
        issue_type,
        severity,
        title: row.get(5)?,
        description: row.get(6)?,
        suggestion: row.get(7)?,
        affected_code: row.get(8)?,
        code_snippet: row.get(9)?,
        line_start: row.get(10)?,
        line_end: row.get(11)?,
        is_valid: row.get(12)?,
        created_at: datetime_from_sql(13, row.get(13)?)?,
        updated_at: datetime_from_sql(14, row.get(14)?)?,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ChunkMetadata;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn seed_workspace(store: &SqliteStore) -> Workspace {
        store.ensure_workspace("/repo", "repo").unwrap()
    }

    fn seed_file(store: &SqliteStore, workspace: &Workspace) -> FileRecord {
        store
            .upsert_file(&workspace.id, "src/main.go", "go", None)
            .unwrap()
    }

    fn test_chunk(workspace_id: &str, file_id: &str, id: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            workspace_id: workspace_id.to_string(),
            file_id: file_id.to_string(),
            name: "main".to_string(),
            chunk_type: ChunkType::Function,
            content: "func main() {}".to_string(),
            signature: Some("func main()".to_string()),
            start_line: 1,
            end_line: 1,
            start_offset: 0,
            end_offset: 14,
            parent_id: None,
            child_ids: vec!["child-1".to_string()],
            metadata: ChunkMetadata::default(),
        }
    }

    #[test]
    fn test_ensure_workspace_is_idempotent() {
        let store = store();
        let first = store.ensure_workspace("/repo", "repo").unwrap();
        let second = store.ensure_workspace("/repo", "other-name").unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "repo");
    }

    #[test]
    fn test_file_upsert_keeps_id() {
        let store = store();
        let ws = seed_workspace(&store);

        let first = store.upsert_file(&ws.id, "a.go", "go", None).unwrap();
        let second = store.upsert_file(&ws.id, "a.go", "go", Some(Utc::now())).unwrap();
        assert_eq!(first.id, second.id);

        let files = store.files_for_workspace(&ws.id).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].last_modified.is_some());
    }

    #[test]
    fn test_chunk_roundtrip() {
        let store = store();
        let ws = seed_workspace(&store);
        let file = seed_file(&store, &ws);

        let chunk = test_chunk(&ws.id, &file.id, "chunk-1");
        store.insert_chunks(std::slice::from_ref(&chunk)).unwrap();

        let loaded = store.get_chunk("chunk-1").unwrap();
        assert_eq!(loaded.name, "main");
        assert_eq!(loaded.chunk_type, ChunkType::Function);
        assert_eq!(loaded.child_ids, vec!["child-1".to_string()]);
        assert_eq!(loaded.signature.as_deref(), Some("func main()"));
    }

    #[test]
    fn test_review_lifecycle() {
        let store = store();
        let ws = seed_workspace(&store);

        let review = Review::new(&ws.id, ReviewKind::Staged);
        store.create_review(&review).unwrap();

        store
            .set_review_status(&review.id, ReviewStatus::InProgress, None)
            .unwrap();
        let loaded = store.get_review(&review.id).unwrap();
        assert_eq!(loaded.status, ReviewStatus::InProgress);

        let now = Utc::now();
        store
            .set_review_status(&review.id, ReviewStatus::Completed, Some(now))
            .unwrap();
        let loaded = store.get_review(&review.id).unwrap();
        assert_eq!(loaded.status, ReviewStatus::Completed);
        assert!(loaded.completed_at.is_some());
    }

    #[test]
    fn test_issue_roundtrip_and_toggle() {
        let store = store();
        let ws = seed_workspace(&store);
        let file = seed_file(&store, &ws);

        let review = Review::new(&ws.id, ReviewKind::Staged);
        store.create_review(&review).unwrap();

        let mut review_file = ReviewFile::new(&review.id, &file.id);
        review_file.issues_count = 1;
        store.create_review_file(&review_file).unwrap();

        let now = Utc::now();
        let issue = Issue {
            id: "issue-1".to_string(),
            review_id: review.id.clone(),
            review_file_id: review_file.id.clone(),
            issue_type: IssueType::Bug,
            severity: Severity::Medium,
            title: "Off-by-one".to_string(),
            description: "Loop bound excludes final element".to_string(),
            suggestion: "Use <= instead of <".to_string(),
            affected_code: "for i := 0; i < n-1; i++ {".to_string(),
            code_snippet: "for i := 0; i < n; i++ {".to_string(),
            line_start: 10,
            line_end: 12,
            is_valid: false,
            created_at: now,
            updated_at: now,
            metadata: Some(serde_json::json!({"file_path": "src/main.go"})),
        };
        store.insert_issues(std::slice::from_ref(&issue)).unwrap();

        let issues = store.issues_for_review_file(&review_file.id).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].issue_type, IssueType::Bug);
        assert_eq!(issues[0].severity, Severity::Medium);
        assert!(!issues[0].is_valid);

        store.set_issue_valid("issue-1", true).unwrap();
        let issues = store.issues_for_review(&review.id).unwrap();
        assert!(issues[0].is_valid);
    }

    #[test]
    fn test_review_summary_counts() {
        let store = store();
        let ws = seed_workspace(&store);
        let file = seed_file(&store, &ws);

        let review = Review::new(&ws.id, ReviewKind::Staged);
        store.create_review(&review).unwrap();
        let review_file = ReviewFile::new(&review.id, &file.id);
        store.create_review_file(&review_file).unwrap();

        let now = Utc::now();
        let mut issues = Vec::new();
        for (i, severity) in [Severity::Critical, Severity::Critical, Severity::Low]
            .iter()
            .enumerate()
        {
            issues.push(Issue {
                id: format!("issue-{}", i),
                review_id: review.id.clone(),
                review_file_id: review_file.id.clone(),
                issue_type: IssueType::Bug,
                severity: *severity,
                title: "t".to_string(),
                description: "d".to_string(),
                suggestion: "s".to_string(),
                affected_code: String::new(),
                code_snippet: String::new(),
                line_start: 1,
                line_end: 1,
                is_valid: false,
                created_at: now,
                updated_at: now,
                metadata: None,
            });
        }
        store.insert_issues(&issues).unwrap();

        let summary = store.review_summary(&review.id).unwrap();
        assert_eq!(summary.files_reviewed, 1);
        assert_eq!(summary.total_issues, 3);
        assert_eq!(summary.critical, 2);
        assert_eq!(summary.low, 1);
    }

    #[test]
    fn test_delete_workspace_cascades() {
        let store = store();
        let ws = seed_workspace(&store);
        let file = seed_file(&store, &ws);

        let chunk = test_chunk(&ws.id, &file.id, "chunk-1");
        store.insert_chunks(std::slice::from_ref(&chunk)).unwrap();

        store.delete_workspace(&ws.id).unwrap();

        assert!(store.get_chunk("chunk-1").is_err());
        assert!(store.get_file(&file.id).is_err());
    }

    #[test]
    fn test_settings_roundtrip() {
        let store = store();
        assert!(store.get_setting("missing").unwrap().is_none());

        store.set_setting("last_review", "rev-1").unwrap();
        assert_eq!(store.get_setting("last_review").unwrap().as_deref(), Some("rev-1"));

        store.set_setting("last_review", "rev-2").unwrap();
        assert_eq!(store.get_setting("last_review").unwrap().as_deref(), Some("rev-2"));
    }
}
