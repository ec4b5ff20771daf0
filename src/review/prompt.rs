// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Provider-aware review prompt construction.
//!
//! Every variant embeds the same fixed JSON reply schema; they differ in
//! how the system text travels. Claude gets a system + user pair, Gemini
//! gets one concatenated user message (no system role), and Ollama gets a
//! terser system prompt tuned to smaller local models.

use crate::llm::ProviderKind;
use crate::parser::Language;
use crate::types::Message;
use crate::vector::types::ScoredChunk;

/// The reply schema every provider is held to.
const REPLY_SCHEMA: &str = r#"Respond with a single JSON object and nothing else outside it. The object must have exactly these keys:
- "summary": string, a short overview of the review
- "issues": array of issue objects
- "overall_assessment": string

Each issue object must have:
- "type": one of "bug", "security", "performance", "design", "style", "complexity", "best_practice"
- "severity": one of "critical", "high", "medium", "low", "info"
- "title": string
- "description": string
- "suggestion": string
- "affected_code": the problematic source, copied verbatim
- "code_snippet": a complete corrected version of the affected code
- "line_start": integer
- "line_end": integer

If there are no issues, reply exactly:
{"summary":"No issues found","issues":[],"overall_assessment":"Code is well-written"}"#;

/// Full system prompt for capable hosted models.
fn full_system_prompt() -> String {
    format!(
        "You are an expert code reviewer. Analyze the code under review for bugs, security \
         problems, performance issues, design flaws, style violations, needless complexity, and \
         departures from best practice. Use the related code snippets for context about how the \
         code is used, but only report issues in the file under review. Be precise about line \
         numbers and quote the affected code exactly.\n\n{}",
        REPLY_SCHEMA
    )
}

/// Terse system prompt for smaller local models; same schema.
fn terse_system_prompt() -> String {
    format!(
        "You are a code reviewer. Find real problems in the code below. Keep descriptions \
         short.\n\n{}",
        REPLY_SCHEMA
    )
}

/// Compose the file context block: header, content, and a Related Code
/// section (omitted when retrieval found nothing).
pub fn file_context(
    path: &str,
    language: Language,
    diff_hint: &str,
    content: &str,
    related: &[ScoredChunk],
) -> String {
    let mut out = format!("File: {} ({}, {})\n\n{}\n", path, language, diff_hint, content);

    if !related.is_empty() {
        out.push_str("\nRelated Code:\n");
        for scored in related {
            out.push_str(&format!(
                "\n--- {} ({}) ---\n{}\n",
                scored.chunk.name, scored.chunk.chunk_type, scored.chunk.content
            ));
        }
    }

    out
}

/// Build the provider-appropriate message list for one file review.
pub fn build_messages(kind: ProviderKind, file_context: &str) -> Vec<Message> {
    let user_body = format!("Please review the following code:\n\n{}", file_context);

    match kind {
        ProviderKind::Claude => vec![
            Message::system(full_system_prompt()),
            Message::user(user_body),
        ],
        // Gemini has no system role: one concatenated user message.
        ProviderKind::Gemini => vec![Message::user(format!(
            "{}\n\n{}",
            full_system_prompt(),
            user_body
        ))],
        ProviderKind::Ollama => vec![
            Message::system(terse_system_prompt()),
            Message::user(user_body),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{Chunk, ChunkMetadata, ChunkType};
    use crate::types::Role;

    fn related(name: &str, content: &str) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                id: "c1".to_string(),
                workspace_id: "ws".to_string(),
                file_id: "f".to_string(),
                name: name.to_string(),
                chunk_type: ChunkType::Function,
                content: content.to_string(),
                signature: None,
                start_line: 1,
                end_line: 3,
                start_offset: 0,
                end_offset: 10,
                parent_id: None,
                child_ids: Vec::new(),
                metadata: ChunkMetadata::default(),
            },
            similarity: 0.9,
            distance: None,
        }
    }

    #[test]
    fn test_file_context_header() {
        let ctx = file_context("src/main.go", Language::Go, "Staged changes", "package main\n", &[]);
        assert!(ctx.starts_with("File: src/main.go (go, Staged changes)\n"));
        assert!(ctx.contains("package main"));
        assert!(!ctx.contains("Related Code"));
    }

    #[test]
    fn test_file_context_related_section() {
        let ctx = file_context(
            "src/main.go",
            Language::Go,
            "Staged changes",
            "package main\n",
            &[related("helper", "func helper() {}")],
        );
        assert!(ctx.contains("Related Code:"));
        assert!(ctx.contains("--- helper (function) ---"));
        assert!(ctx.contains("func helper() {}"));
    }

    #[test]
    fn test_claude_variant_has_system_and_user() {
        let messages = build_messages(ProviderKind::Claude, "ctx");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::User);
        assert!(messages[1].content.starts_with("Please review the following code:"));
        assert!(messages[0].content.contains("\"summary\""));
    }

    #[test]
    fn test_gemini_variant_is_single_user_message() {
        let messages = build_messages(ProviderKind::Gemini, "ctx");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
        // System text and user body are concatenated.
        assert!(messages[0].content.contains("expert code reviewer"));
        assert!(messages[0].content.contains("Please review the following code:"));
    }

    #[test]
    fn test_ollama_variant_is_terse_but_same_schema() {
        let messages = build_messages(ProviderKind::Ollama, "ctx");
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.len() < full_system_prompt().len());
        assert!(messages[0].content.contains("\"overall_assessment\""));
    }

    #[test]
    fn test_all_variants_state_the_empty_reply() {
        for kind in [ProviderKind::Claude, ProviderKind::Gemini, ProviderKind::Ollama] {
            let messages = build_messages(kind, "ctx");
            let combined: String = messages.iter().map(|m| m.content.clone()).collect();
            assert!(combined.contains(r#"{"summary":"No issues found","issues":[],"overall_assessment":"Code is well-written"}"#));
        }
    }
}
