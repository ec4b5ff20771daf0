// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Model reply parsing.
//!
//! The reply text is scanned for its first balanced top-level JSON object
//! (models often wrap the JSON in prose), which is validated against the
//! review schema. Issues with unknown enumerations or missing required
//! fields are dropped with a warning; line ranges are clamped to the file
//! and swapped when reversed.

use serde::Deserialize;
use tracing::warn;

use crate::store::{IssueType, Severity};

/// A structurally valid reply.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewReply {
    pub summary: String,
    #[serde(default)]
    pub issues: Vec<RawIssue>,
    pub overall_assessment: String,
}

/// An issue as the model reported it, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct RawIssue {
    #[serde(rename = "type", default)]
    pub issue_type: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub suggestion: String,
    #[serde(default)]
    pub affected_code: String,
    #[serde(default)]
    pub code_snippet: String,
    #[serde(default)]
    pub line_start: i64,
    #[serde(default)]
    pub line_end: i64,
}

/// A validated issue ready to persist.
#[derive(Debug, Clone)]
pub struct IssueDraft {
    pub issue_type: IssueType,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub suggestion: String,
    pub affected_code: String,
    pub code_snippet: String,
    pub line_start: u32,
    pub line_end: u32,
}

/// A parsed and validated review reply.
#[derive(Debug, Clone)]
pub struct ParsedReview {
    pub summary: String,
    pub overall_assessment: String,
    pub issues: Vec<IssueDraft>,
}

/// Find the first balanced top-level JSON object in the text, tolerating
/// prose before and after it. String literals and escapes are respected.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Parse a reply into validated issue drafts.
///
/// Returns an error only when no valid JSON object can be extracted; the
/// caller records a zero-issue review file in that case. Invalid issues
/// inside a valid reply are dropped, not fatal.
pub fn parse_reply(text: &str, file_line_count: u32) -> Result<ParsedReview, String> {
    let json = extract_json_object(text).ok_or_else(|| "no JSON object in reply".to_string())?;

    let reply: ReviewReply =
        serde_json::from_str(json).map_err(|e| format!("reply does not match schema: {}", e))?;

    let issues = reply
        .issues
        .into_iter()
        .filter_map(|raw| validate_issue(raw, file_line_count))
        .collect();

    Ok(ParsedReview {
        summary: reply.summary,
        overall_assessment: reply.overall_assessment,
        issues,
    })
}

fn validate_issue(raw: RawIssue, file_line_count: u32) -> Option<IssueDraft> {
    let Some(issue_type) = IssueType::parse(&raw.issue_type) else {
        warn!(issue_type = %raw.issue_type, title = %raw.title, "dropping issue with unknown type");
        return None;
    };
    let Some(severity) = Severity::parse(&raw.severity) else {
        warn!(severity = %raw.severity, title = %raw.title, "dropping issue with unknown severity");
        return None;
    };
    if raw.title.is_empty() {
        warn!("dropping issue with empty title");
        return None;
    }

    let max_line = file_line_count.max(1);
    let clamp = |line: i64| -> u32 { line.clamp(1, max_line as i64) as u32 };

    let mut line_start = clamp(raw.line_start);
    let mut line_end = clamp(raw.line_end);
    if line_end < line_start {
        std::mem::swap(&mut line_start, &mut line_end);
    }

    Some(IssueDraft {
        issue_type,
        severity,
        title: raw.title,
        description: raw.description,
        suggestion: raw.suggestion,
        affected_code: raw.affected_code,
        code_snippet: raw.code_snippet,
        line_start,
        line_end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLEAN_REPLY: &str = r#"{"summary":"One problem","issues":[{"type":"bug","severity":"medium","title":"Off-by-one","description":"d","suggestion":"s","affected_code":"a","code_snippet":"c","line_start":10,"line_end":12}],"overall_assessment":"ok"}"#;

    #[test]
    fn test_extract_plain_object() {
        let json = extract_json_object(r#"{"a": 1}"#).unwrap();
        assert_eq!(json, r#"{"a": 1}"#);
    }

    #[test]
    fn test_extract_with_surrounding_prose() {
        let text = "Here is my review:\n{\"summary\":\"x\",\"issues\":[],\"overall_assessment\":\"ok\"}\nThanks.";
        let json = extract_json_object(text).unwrap();
        assert_eq!(json, r#"{"summary":"x","issues":[],"overall_assessment":"ok"}"#);
    }

    #[test]
    fn test_extract_respects_braces_in_strings() {
        let text = r#"note {"summary":"has } brace and \" quote","issues":[],"overall_assessment":"ok"} tail"#;
        let json = extract_json_object(text).unwrap();
        assert!(serde_json::from_str::<serde_json::Value>(json).is_ok());
    }

    #[test]
    fn test_extract_nested_objects() {
        let text = r#"{"a":{"b":{"c":1}},"d":2}"#;
        assert_eq!(extract_json_object(text).unwrap(), text);
    }

    #[test]
    fn test_extract_unbalanced_is_none() {
        assert!(extract_json_object(r#"{"a": 1"#).is_none());
        assert!(extract_json_object("no json here").is_none());
    }

    #[test]
    fn test_parse_clean_reply() {
        let parsed = parse_reply(CLEAN_REPLY, 100).unwrap();
        assert_eq!(parsed.summary, "One problem");
        assert_eq!(parsed.issues.len(), 1);

        let issue = &parsed.issues[0];
        assert_eq!(issue.issue_type, IssueType::Bug);
        assert_eq!(issue.severity, Severity::Medium);
        assert_eq!(issue.line_start, 10);
        assert_eq!(issue.line_end, 12);
    }

    #[test]
    fn test_parse_prose_wrapped_reply() {
        let text = format!("Sure! Here is my analysis:\n\n{}\n\nHope it helps.", CLEAN_REPLY);
        let parsed = parse_reply(&text, 100).unwrap();
        assert_eq!(parsed.issues.len(), 1);
    }

    #[test]
    fn test_parse_no_issues_reply() {
        let text = r#"{"summary":"No issues found","issues":[],"overall_assessment":"Code is well-written"}"#;
        let parsed = parse_reply(text, 20).unwrap();
        assert!(parsed.issues.is_empty());
        assert_eq!(parsed.summary, "No issues found");
    }

    #[test]
    fn test_invalid_enum_dropped_not_fatal() {
        let text = r#"{"summary":"s","issues":[
            {"type":"typo","severity":"medium","title":"bad type","line_start":1,"line_end":1},
            {"type":"bug","severity":"urgent","title":"bad severity","line_start":1,"line_end":1},
            {"type":"bug","severity":"low","title":"keeper","line_start":1,"line_end":1}
        ],"overall_assessment":"ok"}"#;

        let parsed = parse_reply(text, 10).unwrap();
        assert_eq!(parsed.issues.len(), 1);
        assert_eq!(parsed.issues[0].title, "keeper");
    }

    #[test]
    fn test_lines_clamped_and_swapped() {
        let text = r#"{"summary":"s","issues":[
            {"type":"bug","severity":"low","title":"clamped","line_start":-3,"line_end":900},
            {"type":"bug","severity":"low","title":"swapped","line_start":8,"line_end":2}
        ],"overall_assessment":"ok"}"#;

        let parsed = parse_reply(text, 50).unwrap();
        assert_eq!(parsed.issues[0].line_start, 1);
        assert_eq!(parsed.issues[0].line_end, 50);
        assert_eq!(parsed.issues[1].line_start, 2);
        assert_eq!(parsed.issues[1].line_end, 8);
    }

    #[test]
    fn test_garbage_reply_is_error() {
        assert!(parse_reply("I could not review this file.", 10).is_err());
        assert!(parse_reply(r#"{"wrong": "shape"}"#, 10).is_err());
    }
}
