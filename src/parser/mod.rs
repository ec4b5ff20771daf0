// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Source file parsing into retrieval chunks.
//!
//! The registry dispatches to a structural parser per language (tree-sitter
//! backed; Go ships first) and falls back to a single whole-file chunk for
//! anything else - unknown languages, documentation, vendored paths, and
//! binary files.

pub mod go;
pub mod types;

pub use types::{Chunk, ChunkArena, ChunkMetadata, ChunkType, Complexity, Language};

use std::collections::HashMap;
use std::path::Path;

#[cfg(feature = "telemetry")]
use std::time::Instant;

use crate::error::ParseError;

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

/// Identity of the file being parsed, threaded through chunk construction.
#[derive(Debug, Clone)]
pub struct FileContext {
    pub workspace_id: String,
    pub file_id: String,
    pub path: String,
    pub language: Language,
}

/// Result of parsing one file.
#[derive(Debug)]
pub struct ParsedFile {
    pub language: Language,
    pub chunks: Vec<Chunk>,
}

/// Classification of a file prior to structural parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Structurally parseable (or at least plain) source.
    Source,
    /// Binary content; embed-or-skip is the caller's call.
    Binary,
    /// Vendored/third-party path.
    Vendored,
    /// Documentation file.
    Documentation,
}

/// A structural parser for one language.
pub trait LanguageParser: Send {
    fn parse(&mut self, ctx: &FileContext, content: &str) -> Result<Vec<Chunk>, ParseError>;
}

/// Registry of structural parsers, growable per language.
pub struct ParserRegistry {
    structural: HashMap<Language, Box<dyn LanguageParser>>,
}

impl ParserRegistry {
    /// Create a registry with the built-in parsers registered.
    pub fn new() -> Result<Self, ParseError> {
        let mut registry = Self {
            structural: HashMap::new(),
        };
        registry.register(Language::Go, Box::new(go::GoParser::new()?));
        Ok(registry)
    }

    /// Register a structural parser for a language.
    pub fn register(&mut self, language: Language, parser: Box<dyn LanguageParser>) {
        self.structural.insert(language, parser);
    }

    /// Whether a structural parser exists for a language.
    pub fn has_structural(&self, language: Language) -> bool {
        self.structural.contains_key(&language)
    }

    /// Parse a file from disk.
    pub fn parse_file(
        &mut self,
        workspace_id: &str,
        file_id: &str,
        path: &Path,
    ) -> Result<ParsedFile, ParseError> {
        let bytes = std::fs::read(path)?;

        let language = path
            .extension()
            .and_then(|e| e.to_str())
            .map(Language::from_extension)
            .unwrap_or(Language::Unknown);

        let kind = classify(path, &bytes, language);

        let ctx = FileContext {
            workspace_id: workspace_id.to_string(),
            file_id: file_id.to_string(),
            path: path.to_string_lossy().to_string(),
            language,
        };

        match kind {
            FileKind::Source => {
                let content = String::from_utf8_lossy(&bytes).to_string();
                self.parse_content(&ctx, &content)
            }
            // Binary, vendored, and documentation files get a single
            // whole-file chunk; the caller decides whether to embed it.
            FileKind::Binary => Ok(ParsedFile {
                language,
                chunks: vec![file_chunk(&ctx, "")],
            }),
            FileKind::Vendored | FileKind::Documentation => {
                let content = String::from_utf8_lossy(&bytes).to_string();
                Ok(ParsedFile {
                    language,
                    chunks: vec![file_chunk(&ctx, &content)],
                })
            }
        }
    }

    /// Parse in-memory content for a file.
    pub fn parse_content(
        &mut self,
        ctx: &FileContext,
        content: &str,
    ) -> Result<ParsedFile, ParseError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let chunks = match self.structural.get_mut(&ctx.language) {
            Some(parser) => parser.parse(ctx, content)?,
            None => vec![file_chunk(ctx, content)],
        };

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("parser.parse_content", start.elapsed());

        Ok(ParsedFile {
            language: ctx.language,
            chunks,
        })
    }
}

/// Classify a file prior to parsing.
pub fn classify(path: &Path, bytes: &[u8], language: Language) -> FileKind {
    if is_binary(bytes) {
        return FileKind::Binary;
    }
    if is_vendored(path) {
        return FileKind::Vendored;
    }
    if language.is_documentation() {
        return FileKind::Documentation;
    }
    FileKind::Source
}

/// Binary sniff: a NUL byte in the first 8 KiB.
fn is_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(8192).any(|&b| b == 0)
}

/// Vendored paths are indexed but never structurally parsed.
fn is_vendored(path: &Path) -> bool {
    path.components().any(|c| {
        matches!(
            c.as_os_str().to_str(),
            Some("vendor") | Some("node_modules") | Some("third_party") | Some("testdata")
        )
    })
}

/// Build a whole-file chunk.
pub(crate) fn file_chunk(ctx: &FileContext, content: &str) -> Chunk {
    let line_count = content.lines().count().max(1) as u32;
    let name = Path::new(&ctx.path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(&ctx.path)
        .to_string();

    Chunk {
        id: Chunk::generate_id(&ctx.file_id, ChunkType::File, 0),
        workspace_id: ctx.workspace_id.clone(),
        file_id: ctx.file_id.clone(),
        name,
        chunk_type: ChunkType::File,
        content: content.to_string(),
        signature: None,
        start_line: 1,
        end_line: line_count,
        start_offset: 0,
        end_offset: content.len() as u32,
        parent_id: None,
        child_ids: Vec::new(),
        metadata: ChunkMetadata {
            file_path: Some(ctx.path.clone()),
            ..Default::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(language: Language) -> FileContext {
        FileContext {
            workspace_id: "ws-1".to_string(),
            file_id: "file-1".to_string(),
            path: "src/thing.xyz".to_string(),
            language,
        }
    }

    #[test]
    fn test_classify_binary() {
        let kind = classify(Path::new("a.bin"), b"\x00\x01\x02", Language::Unknown);
        assert_eq!(kind, FileKind::Binary);
    }

    #[test]
    fn test_classify_vendored() {
        let kind = classify(
            Path::new("vendor/lib/util.go"),
            b"package util\n",
            Language::Go,
        );
        assert_eq!(kind, FileKind::Vendored);
    }

    #[test]
    fn test_classify_documentation() {
        let kind = classify(Path::new("README.md"), b"# Title\n", Language::Markdown);
        assert_eq!(kind, FileKind::Documentation);
    }

    #[test]
    fn test_classify_source() {
        let kind = classify(Path::new("main.go"), b"package main\n", Language::Go);
        assert_eq!(kind, FileKind::Source);
    }

    #[test]
    fn test_unknown_language_falls_back_to_file_chunk() {
        let mut registry = ParserRegistry::new().unwrap();
        let parsed = registry
            .parse_content(&ctx(Language::Unknown), "some opaque text\nmore text\n")
            .unwrap();

        assert_eq!(parsed.chunks.len(), 1);
        assert_eq!(parsed.chunks[0].chunk_type, ChunkType::File);
        assert_eq!(parsed.chunks[0].start_line, 1);
        assert_eq!(parsed.chunks[0].end_line, 2);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let mut registry = ParserRegistry::new().unwrap();
        let err = registry
            .parse_file("ws", "f", Path::new("/definitely/not/here.go"))
            .unwrap_err();
        assert!(matches!(err, ParseError::NotFound(_)));
    }

    #[test]
    fn test_registry_has_go() {
        let registry = ParserRegistry::new().unwrap();
        assert!(registry.has_structural(Language::Go));
        assert!(!registry.has_structural(Language::Rust));
    }
}
