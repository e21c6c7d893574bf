use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use core_model::{
    ParseError, ParsedMessage, ParsedSession, ParsedToolCall, Role, SourceAdapter, SourceKind,
};
use serde_json::Value;

/// Codex CLI rollout files: a `session_meta` line followed by
/// `response_item` lines whose payloads are messages or function calls.
/// Function calls arrive as standalone events with no enclosing message,
/// which is why `ToolCall.message_idx` is nullable.
pub struct CodexAdapter;

impl SourceAdapter for CodexAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Codex
    }

    fn default_roots(&self) -> Vec<PathBuf> {
        let base = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        vec![base.join(".codex/sessions")]
    }

    fn claims(&self, path: &Path) -> bool {
        if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
            return false;
        }
        let Some(first) = adapter_common::sniff_first_object(path) else {
            return false;
        };
        first.get("payload").is_some()
            || matches!(
                first.get("type").and_then(Value::as_str),
                Some("session_meta" | "response_item" | "turn_context")
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

        let Some(payload) = entry.get("payload") else {
            continue;
        };

        match entry_type {
            "session_meta" => {
                parsed.meta.session_id = payload
                    .get("id")
                    .and_then(Value::as_str)
                    .map(ToOwned::to_owned);
                parsed.meta.cwd = payload
                    .get("cwd")
                    .and_then(Value::as_str)
                    .map(ToOwned::to_owned);
                if let Some(git) = payload.get("git") {
                    parsed.meta.git_branch = git
                        .get("branch")
                        .and_then(Value::as_str)
                        .map(ToOwned::to_owned);
                    parsed.meta.git_repo = git
                        .get("repository_url")
                        .and_then(Value::as_str)
                        .and_then(repo_name_from_url);
                }
            }
            "turn_context" => {
                if parsed.meta.model.is_none() {
                    parsed.meta.model = payload
                        .get("model")
                        .and_then(Value::as_str)
                        .map(ToOwned::to_owned);
                }
            }
            "response_item" => match payload.get("type").and_then(Value::as_str) {
                Some("message") => {
                    let role = match payload.get("role").and_then(Value::as_str) {
                        Some("assistant") => Role::Assistant,
                        Some("user") => Role::User,
                        // instructions and environment context, not transcript
                        _ => continue,
                    };
                    let text = adapter_common::extract_text(payload.get("content"));
                    if text.is_empty() {
                        continue;
                    }
                    parsed.messages.push(ParsedMessage {
                        message_idx,
                        role,
                        content: Some(text),
                        ts,
                        has_thinking: false,
                    });
                    message_idx += 1;
                }
                Some("function_call") | Some("custom_tool_call") => {
                    let name = payload
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown");
                    parsed.tool_calls.push(ParsedToolCall {
                        message_idx: None,
                        tool_name: name.to_string(),
                    });
                }
                _ => {}
            },
            _ => {}
        }
    }

    parsed.meta.started_at = first_ts;
    parsed.meta.ended_at = last_ts;
    if parsed.meta.git_repo.is_none() {
        parsed.meta.git_repo = parsed
            .meta
            .cwd
            .as_deref()
            .and_then(adapter_common::repo_name_from_cwd);
    }
    parsed
}

fn repo_name_from_url(url: &str) -> Option<String> {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(|s| s.trim_end_matches(".git").to_string())
        .filter(|s| !s.is_empty())
}
