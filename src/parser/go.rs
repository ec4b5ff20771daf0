// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tree-sitter based structural parser for Go.
//!
//! Walks the syntax tree and emits chunks for the whole file, the package
//! clause, imports, const/var declarations, type/struct/interface specs,
//! functions, and methods. A function body emits exactly one block child;
//! declarations nested inside the body still get their own chunks, while
//! interior if/for/switch blocks are only emitted outside functions.

use tree_sitter::{Node, Parser};

use crate::error::ParseError;

use super::types::{Chunk, ChunkMetadata, ChunkType};
use super::{file_chunk, FileContext, LanguageParser};

/// Structural parser for Go source files.
pub struct GoParser {
    parser: Parser,
}

impl GoParser {
    /// Create a parser with the Go grammar loaded.
    pub fn new() -> Result<Self, ParseError> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_go::LANGUAGE.into())
            .map_err(|e| ParseError::Init(format!("Failed to load Go grammar: {}", e)))?;
        Ok(Self { parser })
    }

    fn emit(
        &self,
        chunks: &mut Vec<Chunk>,
        ctx: &FileContext,
        content: &str,
        node: Node<'_>,
        chunk_type: ChunkType,
        name: String,
        parent_idx: Option<usize>,
    ) -> usize {
        let text = node_text(node, content).to_string();
        let signature = match chunk_type {
            ChunkType::Function
            | ChunkType::Method
            | ChunkType::Struct
            | ChunkType::Interface
            | ChunkType::Type => Some(signature_line(&text)),
            _ => None,
        };

        let chunk = Chunk {
            id: Chunk::generate_id(&ctx.file_id, chunk_type, node.start_byte() as u32),
            workspace_id: ctx.workspace_id.clone(),
            file_id: ctx.file_id.clone(),
            name,
            chunk_type,
            content: text,
            signature,
            start_line: node.start_position().row as u32 + 1,
            end_line: node.end_position().row as u32 + 1,
            start_offset: node.start_byte() as u32,
            end_offset: node.end_byte() as u32,
            parent_id: parent_idx.map(|i| chunks[i].id.clone()),
            child_ids: Vec::new(),
            metadata: ChunkMetadata::default(),
        };

        let idx = chunks.len();
        let id = chunk.id.clone();
        chunks.push(chunk);
        if let Some(p) = parent_idx {
            chunks[p].child_ids.push(id);
        }
        idx
    }

    fn walk(
        &self,
        chunks: &mut Vec<Chunk>,
        ctx: &FileContext,
        content: &str,
        node: Node<'_>,
        parent_idx: usize,
        inside_function: bool,
    ) {
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();

        for child in children {
            match child.kind() {
                "package_clause" => {
                    let name = child
                        .named_child(0)
                        .map(|n| node_text(n, content).to_string())
                        .unwrap_or_else(|| "package".to_string());
                    self.emit(chunks, ctx, content, child, ChunkType::Package, name, Some(parent_idx));
                }
                "import_declaration" => {
                    self.emit(
                        chunks,
                        ctx,
                        content,
                        child,
                        ChunkType::Import,
                        "import".to_string(),
                        Some(parent_idx),
                    );
                }
                "const_declaration" => {
                    let name = first_spec_name(child, content).unwrap_or_else(|| "const".to_string());
                    self.emit(chunks, ctx, content, child, ChunkType::Const, name, Some(parent_idx));
                }
                "var_declaration" => {
                    let name = first_spec_name(child, content).unwrap_or_else(|| "var".to_string());
                    self.emit(chunks, ctx, content, child, ChunkType::Var, name, Some(parent_idx));
                }
                "type_declaration" => {
                    self.walk_type_declaration(chunks, ctx, content, child, parent_idx);
                }
                "function_declaration" => {
                    let name = field_text(child, "name", content)
                        .unwrap_or_else(|| "func".to_string());
                    let idx = self.emit(
                        chunks,
                        ctx,
                        content,
                        child,
                        ChunkType::Function,
                        name,
                        Some(parent_idx),
                    );
                    self.walk_function_body(chunks, ctx, content, child, idx);
                }
                "method_declaration" => {
                    let name = field_text(child, "name", content)
                        .unwrap_or_else(|| "method".to_string());
                    let idx = self.emit(
                        chunks,
                        ctx,
                        content,
                        child,
                        ChunkType::Method,
                        name,
                        Some(parent_idx),
                    );
                    self.walk_function_body(chunks, ctx, content, child, idx);
                }
                "if_statement" | "for_statement" | "expression_switch_statement"
                | "type_switch_statement" | "select_statement" => {
                    if inside_function {
                        // Covered by the function's single body block; keep
                        // walking for declarations nested further down.
                        self.walk(chunks, ctx, content, child, parent_idx, true);
                    } else {
                        let keyword = match child.kind() {
                            "if_statement" => "if",
                            "for_statement" => "for",
                            "select_statement" => "select",
                            _ => "switch",
                        };
                        let idx = self.emit(
                            chunks,
                            ctx,
                            content,
                            child,
                            ChunkType::Block,
                            keyword.to_string(),
                            Some(parent_idx),
                        );
                        self.walk(chunks, ctx, content, child, idx, inside_function);
                    }
                }
                _ => {
                    self.walk(chunks, ctx, content, child, parent_idx, inside_function);
                }
            }
        }
    }

    /// Emit chunks for each spec inside a `type ( ... )` declaration.
    fn walk_type_declaration(
        &self,
        chunks: &mut Vec<Chunk>,
        ctx: &FileContext,
        content: &str,
        node: Node<'_>,
        parent_idx: usize,
    ) {
        let mut cursor = node.walk();
        let specs: Vec<Node<'_>> = node.named_children(&mut cursor).collect();

        for spec in specs {
            if spec.kind() != "type_spec" && spec.kind() != "type_alias" {
                continue;
            }

            let name = field_text(spec, "name", content).unwrap_or_else(|| "type".to_string());
            let chunk_type = spec
                .child_by_field_name("type")
                .map(|t| match t.kind() {
                    "struct_type" => ChunkType::Struct,
                    "interface_type" => ChunkType::Interface,
                    _ => ChunkType::Type,
                })
                .unwrap_or(ChunkType::Type);

            self.emit(chunks, ctx, content, spec, chunk_type, name, Some(parent_idx));
        }
    }

    /// A function body emits exactly one block child, then the walk
    /// continues inside it with the function flag raised so interior
    /// if/for/switch statements add no further blocks.
    fn walk_function_body(
        &self,
        chunks: &mut Vec<Chunk>,
        ctx: &FileContext,
        content: &str,
        func_node: Node<'_>,
        func_idx: usize,
    ) {
        if let Some(body) = func_node.child_by_field_name("body") {
            let body_idx = self.emit(
                chunks,
                ctx,
                content,
                body,
                ChunkType::Block,
                "body".to_string(),
                Some(func_idx),
            );
            self.walk(chunks, ctx, content, body, body_idx, true);
        }
    }
}

impl LanguageParser for GoParser {
    fn parse(&mut self, ctx: &FileContext, content: &str) -> Result<Vec<Chunk>, ParseError> {
        let tree = self.parser.parse(content, None).ok_or_else(|| ParseError::Syntax {
            path: ctx.path.clone(),
            message: "tree-sitter returned no tree".to_string(),
        })?;

        let root = tree.root_node();
        if root.has_error() {
            // No partial chunk lists on syntax errors.
            return Err(ParseError::Syntax {
                path: ctx.path.clone(),
                message: "syntax error in source".to_string(),
            });
        }

        let mut chunks = vec![file_chunk(ctx, content)];
        self.walk(&mut chunks, ctx, content, root, 0, false);
        Ok(chunks)
    }
}

fn node_text<'a>(node: Node<'_>, content: &'a str) -> &'a str {
    content.get(node.byte_range()).unwrap_or("")
}

fn field_text(node: Node<'_>, field: &str, content: &str) -> Option<String> {
    node.child_by_field_name(field)
        .map(|n| node_text(n, content).to_string())
}

/// Name of the first spec inside a const/var declaration.
fn first_spec_name(node: Node<'_>, content: &str) -> Option<String> {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == "const_spec" || child.kind() == "var_spec" {
            if let Some(name) = field_text(child, "name", content) {
                return Some(name);
            }
        }
    }
    None
}

/// First line of a declaration, trimmed at the opening brace.
fn signature_line(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or("");
    match first_line.find('{') {
        Some(pos) => first_line[..pos].trim_end().to_string(),
        None => first_line.trim_end().to_string(),
    }
}
