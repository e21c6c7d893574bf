use std::path::Path;

use chrono::{DateTime, Utc};
use core_model::ParseError;
use serde_json::Value;

pub fn parse_rfc3339(input: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(input)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Read a JSONL file and return every line that parses as a JSON object.
/// Blank and malformed lines are skipped; a file with no parseable object
/// at all is a parse error, not an empty session.
pub fn read_json_lines(path: &Path) -> Result<Vec<Value>, ParseError> {
    let content = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let entries: Vec<Value> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter_map(|l| serde_json::from_str::<Value>(l).ok())
        .filter(Value::is_object)
        .collect();
    if entries.is_empty() {
        return Err(ParseError::Empty {
            path: path.display().to_string(),
        });
    }
    Ok(entries)
}

/// First JSON object in the file, for cheap format sniffing in `claims`.
pub fn sniff_first_object(path: &Path) -> Option<Value> {
    use std::io::BufRead;
    let file = std::fs::File::open(path).ok()?;
    let reader = std::io::BufReader::new(file);
    for line in reader.lines().map_while(Result::ok).take(8) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Ok(val) = serde_json::from_str::<Value>(trimmed)
            && val.is_object()
        {
            return Some(val);
        }
    }
    None
}

/// Concatenated text blocks of a message content value. Handles both the
/// plain-string form and block arrays; any block carrying a string `text`
/// field counts (`text`, `input_text`, `output_text` block types alike).
pub fn extract_text(content: Option<&Value>) -> String {
    let Some(content) = content else {
        return String::new();
    };
    if let Some(s) = content.as_str() {
        return s.to_string();
    }
    let mut out = String::new();
    if let Some(arr) = content.as_array() {
        for block in arr {
            if block.get("type").and_then(Value::as_str) == Some("thinking") {
                continue;
            }
            if let Some(s) = block.get("text").and_then(Value::as_str)
                && !s.trim().is_empty()
            {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(s);
            }
        }
    }
    out
}

/// Names of `tool_use` blocks within a message content array.
pub fn extract_tool_names(content: Option<&Value>) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(arr) = content.and_then(Value::as_array) {
        for block in arr {
            if block.get("type").and_then(Value::as_str) == Some("tool_use") {
                let name = block
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                out.push(name.to_string());
            }
        }
    }
    out
}

pub fn has_thinking(content: Option<&Value>) -> bool {
    content
        .and_then(Value::as_array)
        .is_some_and(|arr| {
            arr.iter()
                .any(|b| b.get("type").and_then(Value::as_str) == Some("thinking"))
        })
}

/// Last path component of a working directory, used as the repo name.
pub fn repo_name_from_cwd(cwd: &str) -> Option<String> {
    Path::new(cwd)
        .file_name()
        .and_then(|s| s.to_str())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tempdir() -> std::path::PathBuf {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir =
            std::env::temp_dir().join(format!("sift_common_test_{}_{}", std::process::id(), id));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn extract_text_plain_string() {
        let val = Value::String("hello".to_string());
        assert_eq!(extract_text(Some(&val)), "hello");
    }

    #[test]
    fn extract_text_joins_blocks() {
        let val = serde_json::json!([
            {"type": "text", "text": "first"},
            {"type": "output_text", "text": "second"}
        ]);
        assert_eq!(extract_text(Some(&val)), "first\nsecond");
    }

    #[test]
    fn extract_text_skips_thinking_blocks() {
        let val = serde_json::json!([
            {"type": "thinking", "thinking": "hmm", "text": "hmm"},
            {"type": "text", "text": "answer"}
        ]);
        assert_eq!(extract_text(Some(&val)), "answer");
    }

    #[test]
    fn extract_text_none_and_empty() {
        assert_eq!(extract_text(None), "");
        let val = serde_json::json!([]);
        assert_eq!(extract_text(Some(&val)), "");
    }

    #[test]
    fn extract_tool_names_from_blocks() {
        let val = serde_json::json!([
            {"type": "text", "text": "running"},
            {"type": "tool_use", "name": "Bash", "input": {"command": "ls"}},
            {"type": "tool_use", "input": {}}
        ]);
        assert_eq!(extract_tool_names(Some(&val)), vec!["Bash", "unknown"]);
    }

    #[test]
    fn has_thinking_detects_block() {
        let with = serde_json::json!([{"type": "thinking", "thinking": "..."}]);
        let without = serde_json::json!([{"type": "text", "text": "hi"}]);
        assert!(has_thinking(Some(&with)));
        assert!(!has_thinking(Some(&without)));
        assert!(!has_thinking(None));
    }

    #[test]
    fn read_json_lines_skips_malformed() {
        let dir = tempdir();
        let file = dir.join("a.jsonl");
        std::fs::write(&file, "not json\n\n{\"ok\":1}\n[1,2]\n{\"ok\":2}\n").unwrap();
        let entries = read_json_lines(&file).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn read_json_lines_empty_file_is_error() {
        let dir = tempdir();
        let file = dir.join("empty.jsonl");
        std::fs::write(&file, "garbage\nmore garbage\n").unwrap();
        assert!(matches!(
            read_json_lines(&file),
            Err(ParseError::Empty { .. })
        ));
        assert!(matches!(
            read_json_lines(&dir.join("missing.jsonl")),
            Err(ParseError::Io { .. })
        ));
    }

    #[test]
    fn sniff_first_object_skips_junk() {
        let dir = tempdir();
        let file = dir.join("a.jsonl");
        std::fs::write(&file, "\nbroken\n{\"type\":\"user\"}\n").unwrap();
        let val = sniff_first_object(&file).unwrap();
        assert_eq!(val.get("type").unwrap().as_str().unwrap(), "user");
        assert!(sniff_first_object(&dir.join("missing.jsonl")).is_none());
    }

    #[test]
    fn repo_name_is_last_component() {
        assert_eq!(
            repo_name_from_cwd("/home/user/projects/sift").as_deref(),
            Some("sift")
        );
    }

    #[test]
    fn parse_rfc3339_handles_z_suffix() {
        assert!(parse_rfc3339("2025-01-15T10:30:00Z").is_some());
        assert!(parse_rfc3339("2025-01-15T10:30:00+00:00").is_some());
        assert!(parse_rfc3339("not a time").is_none());
    }
}
