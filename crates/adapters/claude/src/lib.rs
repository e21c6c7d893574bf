use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use core_model::{
    ParseError, ParsedMessage, ParsedSession, ParsedToolCall, Role, SourceAdapter, SourceKind,
};
use serde_json::Value;

/// Claude Code project transcripts: one JSONL file per session, entries of
/// type `user`/`assistant` wrapping an API-shaped `message` object.
pub struct ClaudeAdapter;

impl SourceAdapter for ClaudeAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Claude
    }

    fn default_roots(&self) -> Vec<PathBuf> {
        let base = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        vec![
            base.join(".claude/projects"),
            base.join(".config/claude/sessions"),
        ]
    }

    fn claims(&self, path: &Path) -> bool {
        if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
            return false;
        }
        let Some(first) = adapter_common::sniff_first_object(path) else {
            return false;
        };
        if first.get("payload").is_some() {
            return false;
        }
        first.get("sessionId").is_some()
            || matches!(
                first.get("type").and_then(Value::as_str),
                Some("user" | "assistant" | "summary" | "system")
            )
    }

    fn parse(&self, path: &Path) -> Result<ParsedSession, ParseError> {
        let entries = adapter_common::read_json_lines(path)?;
        Ok(parse_entries(&entries))
    }
}

fn parse_entries(entries: &[Value]) -> ParsedSession {
    let mut parsed = ParsedSession::default();
    let mut first_ts: Option<DateTime<Utc>> = None;
    let mut last_ts: Option<DateTime<Utc>> = None;
    let mut message_idx: i64 = 0;

    for entry in entries {
        let entry_type = entry.get("type").and_then(Value::as_str).unwrap_or("");
        let ts = entry
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(adapter_common::parse_rfc3339);
        if let Some(t) = ts {
            if first_ts.is_none() {
                first_ts = Some(t);
            }
            last_ts = Some(t);
        }

        // Session metadata rides on the first user entry.
        if entry_type == "user" && parsed.meta.session_id.is_none() {
            parsed.meta.session_id = entry
                .get("sessionId")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned);
            parsed.meta.cwd = entry
                .get("cwd")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned);
            parsed.meta.git_branch = entry
                .get("gitBranch")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned);
        }

        let role = match entry_type {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            _ => continue,
        };
        let message = entry.get("message").unwrap_or(entry);

        if role == Role::Assistant && parsed.meta.model.is_none() {
            parsed.meta.model = message
                .get("model")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned);
        }

        let content = message.get("content");
        let text = adapter_common::extract_text(content);
        let tools = adapter_common::extract_tool_names(content);
        let thinking = adapter_common::has_thinking(content);

        // Entries with neither text nor tool calls (pure thinking turns,
        // tool results) do not become transcript rows.
        if text.is_empty() && tools.is_empty() {
            continue;
        }

        parsed.messages.push(ParsedMessage {
            message_idx,
            role,
            content: (!text.is_empty()).then_some(text),
            ts,
            has_thinking: thinking,
        });
        for tool_name in tools {
            parsed.tool_calls.push(ParsedToolCall {
                message_idx: Some(message_idx),
                tool_name,
            });
        }
        message_idx += 1;
    }

    parsed.meta.started_at = first_ts;
    parsed.meta.ended_at = last_ts;
    parsed.meta.git_repo = parsed
        .meta
        .cwd
        .as_deref()
        .and_then(adapter_common::repo_name_from_cwd);
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tempdir() -> PathBuf {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir =
            std::env::temp_dir().join(format!("sift_claude_test_{}_{}", std::process::id(), id));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_session(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
        let file = dir.join(name);
        std::fs::write(&file, lines.join("\n")).unwrap();
        file
    }

    const USER_LINE: &str = r#"{"type":"user","sessionId":"sess-1","cwd":"/home/user/proj","gitBranch":"main","timestamp":"2025-01-15T10:00:00Z","message":{"role":"user","content":"fix the login bug"}}"#;
    const ASSISTANT_LINE: &str = r#"{"type":"assistant","timestamp":"2025-01-15T10:01:30Z","message":{"role":"assistant","model":"claude-sonnet-4","content":[{"type":"thinking","thinking":"hmm"},{"type":"text","text":"on it"},{"type":"tool_use","name":"Bash","input":{"command":"ls"}}]}}"#;

    #[test]
    fn parse_full_session() {
        let dir = tempdir();
        let file = write_session(&dir, "s.jsonl", &[USER_LINE, ASSISTANT_LINE]);
        let parsed = ClaudeAdapter.parse(&file).unwrap();
        assert_eq!(parsed.meta.session_id.as_deref(), Some("sess-1"));
        assert_eq!(parsed.meta.cwd.as_deref(), Some("/home/user/proj"));
        assert_eq!(parsed.meta.git_branch.as_deref(), Some("main"));
        assert_eq!(parsed.meta.git_repo.as_deref(), Some("proj"));
        assert_eq!(parsed.meta.model.as_deref(), Some("claude-sonnet-4"));
        assert_eq!(parsed.meta.duration_seconds(), Some(90));
        assert_eq!(parsed.messages.len(), 2);
        assert_eq!(parsed.messages[0].role, Role::User);
        assert_eq!(
            parsed.messages[0].content.as_deref(),
            Some("fix the login bug")
        );
        assert_eq!(parsed.messages[1].role, Role::Assistant);
        assert!(parsed.messages[1].has_thinking);
        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].tool_name, "Bash");
        assert_eq!(parsed.tool_calls[0].message_idx, Some(1));
    }

    #[test]
    fn empty_content_entries_skipped() {
        let dir = tempdir();
        let file = write_session(
            &dir,
            "s.jsonl",
            &[
                USER_LINE,
                r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"thinking","thinking":"only thinking"}]}}"#,
            ],
        );
        let parsed = ClaudeAdapter.parse(&file).unwrap();
        assert_eq!(parsed.messages.len(), 1);
    }

    #[test]
    fn summary_entries_ignored() {
        let dir = tempdir();
        let file = write_session(
            &dir,
            "s.jsonl",
            &[
                r#"{"type":"summary","summary":"a prior conversation"}"#,
                USER_LINE,
            ],
        );
        let parsed = ClaudeAdapter.parse(&file).unwrap();
        assert_eq!(parsed.messages.len(), 1);
        assert_eq!(parsed.messages[0].message_idx, 0);
    }

    #[test]
    fn malformed_lines_skipped() {
        let dir = tempdir();
        let file = write_session(&dir, "s.jsonl", &["not json at all", USER_LINE]);
        let parsed = ClaudeAdapter.parse(&file).unwrap();
        assert_eq!(parsed.messages.len(), 1);
    }

    #[test]
    fn garbage_file_is_parse_error() {
        let dir = tempdir();
        let file = write_session(&dir, "s.jsonl", &["junk", "more junk"]);
        assert!(matches!(
            ClaudeAdapter.parse(&file),
            Err(ParseError::Empty { .. })
        ));
    }

    #[test]
    fn claims_claude_shape_only() {
        let dir = tempdir();
        let claude = write_session(&dir, "c.jsonl", &[USER_LINE]);
        let rollout = write_session(
            &dir,
            "r.jsonl",
            &[r#"{"timestamp":"2025-01-15T10:00:00Z","type":"session_meta","payload":{"id":"x"}}"#],
        );
        let txt = write_session(&dir, "notes.txt", &[USER_LINE]);
        assert!(ClaudeAdapter.claims(&claude));
        assert!(!ClaudeAdapter.claims(&rollout));
        assert!(!ClaudeAdapter.claims(&txt));
    }

    #[test]
    fn string_content_form_supported() {
        let dir = tempdir();
        let file = write_session(
            &dir,
            "s.jsonl",
            &[
                r#"{"type":"user","sessionId":"s","message":{"role":"user","content":"plain string"}}"#,
            ],
        );
        let parsed = ClaudeAdapter.parse(&file).unwrap();
        assert_eq!(parsed.messages[0].content.as_deref(), Some("plain string"));
        assert!(parsed.meta.started_at.is_none());
        assert!(parsed.meta.duration_seconds().is_none());
    }
}
