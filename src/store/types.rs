// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Persisted entity types: workspaces, files, reviews, and issues.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a repository root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub path: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Workspace {
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            path: path.into(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// A source file observed inside a workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub workspace_id: String,
    /// Workspace-relative path.
    pub path: String,
    pub language: String,
    pub last_modified: Option<DateTime<Utc>>,
}

impl FileRecord {
    pub fn new(
        workspace_id: impl Into<String>,
        path: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            workspace_id: workspace_id.into(),
            path: path.into(),
            language: language.into(),
            last_modified: None,
        }
    }
}

/// Which version-control slice a review covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewKind {
    Staged,
    Commit,
    Branch,
}

impl ReviewKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Staged => "staged",
            Self::Commit => "commit",
            Self::Branch => "branch",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "staged" => Some(Self::Staged),
            "commit" => Some(Self::Commit),
            "branch" => Some(Self::Branch),
            _ => None,
        }
    }
}

/// Lifecycle status of a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Created,
    InProgress,
    Completed,
    Failed,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(Self::Created),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A single analysis pass over a set of changed files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub workspace_id: String,
    pub kind: ReviewKind,
    pub commit_hash: Option<String>,
    pub base_branch: Option<String>,
    pub head_branch: Option<String>,
    pub status: ReviewStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Review {
    pub fn new(workspace_id: impl Into<String>, kind: ReviewKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            workspace_id: workspace_id.into(),
            kind,
            commit_hash: None,
            base_branch: None,
            head_branch: None,
            status: ReviewStatus::Created,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Human-readable description of the reviewed slice, used in prompts.
    pub fn diff_hint(&self) -> String {
        match self.kind {
            ReviewKind::Staged => "Staged changes".to_string(),
            ReviewKind::Commit => match &self.commit_hash {
                Some(hash) => format!("Changes from commit {}", hash),
                None => "Changes from commit".to_string(),
            },
            ReviewKind::Branch => match (&self.base_branch, &self.head_branch) {
                (Some(base), Some(head)) => {
                    format!("Changes from {} to {} branch", base, head)
                }
                _ => "Branch changes".to_string(),
            },
        }
    }
}

/// Per-(review, file) record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewFile {
    pub id: String,
    pub review_id: String,
    pub file_id: String,
    pub issues_count: u32,
}

impl ReviewFile {
    pub fn new(review_id: impl Into<String>, file_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            review_id: review_id.into(),
            file_id: file_id.into(),
            issues_count: 0,
        }
    }
}

/// Category of a reported issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    Bug,
    Security,
    Performance,
    Design,
    Style,
    Complexity,
    BestPractice,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bug => "bug",
            Self::Security => "security",
            Self::Performance => "performance",
            Self::Design => "design",
            Self::Style => "style",
            Self::Complexity => "complexity",
            Self::BestPractice => "best_practice",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "bug" => Some(Self::Bug),
            "security" => Some(Self::Security),
            "performance" => Some(Self::Performance),
            "design" => Some(Self::Design),
            "style" => Some(Self::Style),
            "complexity" => Some(Self::Complexity),
            "best_practice" => Some(Self::BestPractice),
            _ => None,
        }
    }
}

/// Severity of a reported issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Info => "info",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "critical" => Some(Self::Critical),
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            "info" => Some(Self::Info),
            _ => None,
        }
    }
}

/// One finding from the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub review_id: String,
    pub review_file_id: String,
    pub issue_type: IssueType,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub suggestion: String,
    /// Verbatim copy of the problematic source.
    pub affected_code: String,
    /// Complete corrected form.
    pub code_snippet: String,
    pub line_start: u32,
    pub line_end: u32,
    /// User accept/reject toggle; false until the user weighs in.
    pub is_valid: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
}

/// Per-review aggregate for the shell's final screen.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub files_reviewed: u32,
    pub total_issues: u32,
    pub critical: u32,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
    pub info: u32,
}
