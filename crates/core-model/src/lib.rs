use std::fmt;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Claude,
    Codex,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Claude => "claude",
            SourceKind::Codex => "codex",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claude" => Ok(SourceKind::Claude),
            "codex" => Ok(SourceKind::Codex),
            _ => anyhow::bail!("unknown source kind: {s}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `(mtime, size)` pair used to decide whether a file must be re-indexed.
/// Cheap to read and cheap to compare; never a content guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub mtime: f64,
    pub size: u64,
}

impl Fingerprint {
    pub fn of(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        let mtime = meta
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Ok(Self {
            mtime,
            size: meta.len(),
        })
    }

    pub fn matches(&self, other: &Fingerprint) -> bool {
        self.mtime == other.mtime && self.size == other.size
    }
}

/// Session-level metadata an adapter pulls out of one transcript file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMeta {
    pub session_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub model: Option<String>,
    pub cwd: Option<String>,
    pub git_branch: Option<String>,
    pub git_repo: Option<String>,
}

impl SessionMeta {
    pub fn duration_seconds(&self) -> Option<i64> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some((end - start).num_seconds()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedMessage {
    pub message_idx: i64,
    pub role: Role,
    pub content: Option<String>,
    pub ts: Option<DateTime<Utc>>,
    pub has_thinking: bool,
}

/// `message_idx` is None for tool events a source emits outside any message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedToolCall {
    pub message_idx: Option<i64>,
    pub tool_name: String,
}

/// Normalized output of one adapter over one file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedSession {
    pub meta: SessionMeta,
    pub messages: Vec<ParsedMessage>,
    pub tool_calls: Vec<ParsedToolCall>,
}

/// One row of the sessions table, as read back from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub file_path: String,
    pub session_id: Option<String>,
    pub source: SourceKind,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub model: Option<String>,
    pub cwd: Option<String>,
    pub git_branch: Option<String>,
    pub git_repo: Option<String>,
    pub message_count: i64,
    pub tool_count: i64,
    pub file_mtime: f64,
    pub file_size: i64,
    pub indexed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub file_path: String,
    pub message_idx: i64,
    pub role: Role,
    pub content: Option<String>,
    pub ts: Option<DateTime<Utc>>,
    pub has_thinking: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: no recognizable session entries")]
    Empty { path: String },
}

/// One adapter per transcript format. The reconciler only ever sees this
/// trait; it never branches on a specific source.
pub trait SourceAdapter: Send + Sync {
    fn kind(&self) -> SourceKind;
    /// Directories scanned when the caller does not pass explicit roots.
    fn default_roots(&self) -> Vec<PathBuf>;
    /// Whether a discovered file belongs to this adapter's format.
    fn claims(&self, path: &Path) -> bool;
    fn parse(&self, path: &Path) -> Result<ParsedSession, ParseError>;
}
