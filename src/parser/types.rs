// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Chunk types produced by the parser.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Type of code chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Function,
    Method,
    Struct,
    Interface,
    Type,
    Const,
    Var,
    Import,
    Package,
    File,
    Block,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Struct => "struct",
            Self::Interface => "interface",
            Self::Type => "type",
            Self::Const => "const",
            Self::Var => "var",
            Self::Import => "import",
            Self::Package => "package",
            Self::File => "file",
            Self::Block => "block",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "function" | "func" | "fn" => Some(Self::Function),
            "method" => Some(Self::Method),
            "struct" => Some(Self::Struct),
            "interface" => Some(Self::Interface),
            "type" => Some(Self::Type),
            "const" => Some(Self::Const),
            "var" => Some(Self::Var),
            "import" => Some(Self::Import),
            "package" => Some(Self::Package),
            "file" => Some(Self::File),
            "block" => Some(Self::Block),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChunkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Source language tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Go,
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Java,
    C,
    Cpp,
    Markdown,
    Text,
    Unknown,
}

impl Language {
    /// Detect language from a file extension.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "go" => Self::Go,
            "rs" => Self::Rust,
            "py" | "pyi" => Self::Python,
            "js" | "jsx" | "mjs" | "cjs" => Self::JavaScript,
            "ts" | "tsx" | "mts" | "cts" => Self::TypeScript,
            "java" => Self::Java,
            "c" | "h" => Self::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hxx" => Self::Cpp,
            "md" | "markdown" => Self::Markdown,
            "txt" | "rst" | "adoc" => Self::Text,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Go => "go",
            Self::Rust => "rust",
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Java => "java",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::Markdown => "markdown",
            Self::Text => "text",
            Self::Unknown => "unknown",
        }
    }

    /// Whether the file is documentation rather than source.
    pub fn is_documentation(&self) -> bool {
        matches!(self, Self::Markdown | Self::Text)
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rough size/branching classification used for adaptive embedding
/// dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Medium => "medium",
            Self::Complex => "complex",
        }
    }
}

/// Typed metadata bag attached to a chunk.
///
/// The enumerated fields cover everything the pipeline reads; `extras`
/// carries anything else forward.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity: Option<Complexity>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extras: HashMap<String, serde_json::Value>,
}

impl ChunkMetadata {
    pub fn is_empty(&self) -> bool {
        self.complexity.is_none() && self.file_path.is_none() && self.extras.is_empty()
    }
}

/// A contiguous span of a source file forming one unit of retrieval.
///
/// Parent/child links are stored as ids in both directions; resolve them
/// through a [`ChunkArena`] rather than holding pointers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable chunk id (hash of file, span, and type).
    pub id: String,
    /// Owning workspace.
    pub workspace_id: String,
    /// Owning file.
    pub file_id: String,
    /// Symbol name, or a synthesized label for anonymous chunks.
    pub name: String,
    /// Kind of code unit.
    pub chunk_type: ChunkType,
    /// The chunk's source text.
    pub content: String,
    /// Declaration line (functions, methods, types).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// 1-indexed start line.
    pub start_line: u32,
    /// 1-indexed end line, inclusive.
    pub end_line: u32,
    /// Byte offset of the span start.
    pub start_offset: u32,
    /// Byte offset one past the span end.
    pub end_offset: u32,
    /// Innermost enclosing emitted chunk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Chunks whose parent_id equals this id, in emission order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_ids: Vec<String>,
    /// Metadata bag.
    #[serde(default, skip_serializing_if = "ChunkMetadata::is_empty")]
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Generate a deterministic chunk id from file, span, and type.
    pub fn generate_id(file_id: &str, chunk_type: ChunkType, start_offset: u32) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}:{}:{}", file_id, chunk_type.as_str(), start_offset).as_bytes());
        let hash = format!("{:x}", hasher.finalize());
        hash[..16].to_string()
    }

    /// Number of lines covered by this chunk.
    pub fn line_count(&self) -> u32 {
        self.end_line.saturating_sub(self.start_line) + 1
    }

    /// Whether this chunk's span strictly encloses another's.
    pub fn encloses(&self, other: &Chunk) -> bool {
        self.start_offset <= other.start_offset
            && self.end_offset >= other.end_offset
            && (self.start_offset, self.end_offset) != (other.start_offset, other.end_offset)
    }
}

/// Arena of chunks keyed by id.
///
/// The parser populates parent_id and child_ids symmetrically; keeping only
/// ids in both directions keeps the graph acyclic in memory while preserving
/// the logical parent/child symmetry.
#[derive(Debug, Default)]
pub struct ChunkArena {
    chunks: Vec<Chunk>,
    by_id: HashMap<String, usize>,
}

impl ChunkArena {
    pub fn new(chunks: Vec<Chunk>) -> Self {
        let by_id = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();
        Self { chunks, by_id }
    }

    pub fn get(&self, id: &str) -> Option<&Chunk> {
        self.by_id.get(id).map(|&i| &self.chunks[i])
    }

    pub fn parent_of(&self, chunk: &Chunk) -> Option<&Chunk> {
        chunk.parent_id.as_deref().and_then(|id| self.get(id))
    }

    pub fn children_of<'a>(&'a self, chunk: &'a Chunk) -> impl Iterator<Item = &'a Chunk> {
        chunk.child_ids.iter().filter_map(|id| self.get(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn into_chunks(self) -> Vec<Chunk> {
        self.chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_type_roundtrip() {
        let types = [
            ChunkType::Function,
            ChunkType::Method,
            ChunkType::Struct,
            ChunkType::Interface,
            ChunkType::Type,
            ChunkType::Const,
            ChunkType::Var,
            ChunkType::Import,
            ChunkType::Package,
            ChunkType::File,
            ChunkType::Block,
        ];

        for ct in types {
            assert_eq!(ChunkType::parse(ct.as_str()), Some(ct));
        }
        assert_eq!(ChunkType::parse("nonsense"), None);
    }

    #[test]
    fn test_language_detection() {
        assert_eq!(Language::from_extension("go"), Language::Go);
        assert_eq!(Language::from_extension("rs"), Language::Rust);
        assert_eq!(Language::from_extension("md"), Language::Markdown);
        assert_eq!(Language::from_extension("xyz"), Language::Unknown);
        assert!(Language::Markdown.is_documentation());
        assert!(!Language::Go.is_documentation());
    }

    #[test]
    fn test_chunk_id_deterministic() {
        let a = Chunk::generate_id("file-1", ChunkType::Function, 120);
        let b = Chunk::generate_id("file-1", ChunkType::Function, 120);
        let c = Chunk::generate_id("file-1", ChunkType::Function, 121);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_encloses() {
        let outer = test_chunk("a", 0, 100, None);
        let inner = test_chunk("b", 10, 50, Some("a"));

        assert!(outer.encloses(&inner));
        assert!(!inner.encloses(&outer));
        assert!(!outer.encloses(&outer));
    }

    #[test]
    fn test_arena_resolution() {
        let mut parent = test_chunk("p", 0, 100, None);
        parent.child_ids.push("c".to_string());
        let child = test_chunk("c", 10, 50, Some("p"));

        let arena = ChunkArena::new(vec![parent, child]);
        assert_eq!(arena.len(), 2);

        let child = arena.get("c").unwrap();
        let parent = arena.parent_of(child).unwrap();
        assert_eq!(parent.id, "p");
        assert_eq!(arena.children_of(parent).count(), 1);
    }

    fn test_chunk(id: &str, start: u32, end: u32, parent: Option<&str>) -> Chunk {
        Chunk {
            id: id.to_string(),
            workspace_id: "ws".to_string(),
            file_id: "f".to_string(),
            name: id.to_string(),
            chunk_type: ChunkType::Block,
            content: String::new(),
            signature: None,
            start_line: start / 10 + 1,
            end_line: end / 10 + 1,
            start_offset: start,
            end_offset: end,
            parent_id: parent.map(String::from),
            child_ids: Vec::new(),
            metadata: ChunkMetadata::default(),
        }
    }
}
