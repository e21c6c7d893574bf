use chrono::{DateTime, Duration, Utc};
use core_model::{MessageRecord, Role, SessionRecord};
use store_sqlite::{IndexStore, StatsReport, ToolUsage};

/// How many characters of context an excerpt keeps on each side of a match.
const EXCERPT_CONTEXT: usize = 50;

/// How short a user message can be and still count as the opening prompt.
const MIN_PROMPT_CHARS: i64 = 20;

const PROMPT_PREVIEW_CHARS: usize = 500;

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub file_path: String,
    pub started_at: Option<DateTime<Utc>>,
    pub cwd: Option<String>,
    pub git_branch: Option<String>,
    pub role: Role,
    pub excerpt: String,
}

#[derive(Debug)]
pub enum SessionView {
    Full {
        session: SessionRecord,
        messages: Vec<MessageRecord>,
    },
    Summary {
        session: SessionRecord,
        first_prompt: Option<String>,
    },
}

pub fn recent(
    store: &IndexStore,
    project: Option<&str>,
    since: Option<Duration>,
    limit: usize,
) -> anyhow::Result<Vec<SessionRecord>> {
    let cutoff = since.map(|d| Utc::now() - d);
    store.recent_sessions(project, cutoff, limit as i64)
}

/// Containment search over message content, case-insensitive. Returns one
/// hit per matching message with an excerpt around the first occurrence.
pub fn search(
    store: &IndexStore,
    term: &str,
    cwd: Option<&str>,
    limit: usize,
) -> anyhow::Result<Vec<SearchHit>> {
    let rows = store.search_messages(term, cwd, limit as i64)?;
    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let excerpt = excerpt(&row.content, term, EXCERPT_CONTEXT)?;
            Some(SearchHit {
                file_path: row.file_path,
                started_at: row.started_at,
                cwd: row.cwd,
                git_branch: row.git_branch,
                role: row.role,
                excerpt,
            })
        })
        .collect())
}

pub fn tool_usage(store: &IndexStore, top: usize) -> anyhow::Result<Vec<ToolUsage>> {
    store.tool_usage(top as i64)
}

pub fn stats(store: &IndexStore) -> anyhow::Result<StatsReport> {
    store.stats()
}

/// A single session with its transcript, or just its metadata and opening
/// prompt in summary mode. None when the path was never indexed.
pub fn show(
    store: &IndexStore,
    file_path: &str,
    summary: bool,
) -> anyhow::Result<Option<SessionView>> {
    let Some(session) = store.get_session(file_path)? else {
        return Ok(None);
    };
    let view = if summary {
        let first_prompt = store
            .first_user_prompt(file_path, MIN_PROMPT_CHARS)?
            .map(|p| preview(&p, PROMPT_PREVIEW_CHARS));
        SessionView::Summary {
            session,
            first_prompt,
        }
    } else {
        let messages = store.get_session_messages(file_path)?;
        SessionView::Full { session, messages }
    };
    Ok(Some(view))
}

/// Snippet of `content` around the first case-insensitive occurrence of
/// `term`, newlines flattened, ellipses marking truncation.
pub fn excerpt(content: &str, term: &str, context: usize) -> Option<String> {
    let lower = content.to_lowercase();
    let needle = term.to_lowercase();
    let idx = lower.find(&needle)?;
    // Offsets in the lowered string can drift from the original for
    // non-ASCII text; snapping to char boundaries keeps the slice valid.
    let start = snap_down(content, idx.saturating_sub(context));
    let end = snap_down(
        content,
        (idx + needle.len() + context).min(content.len()),
    );
    let mut snippet = content[start..end].replace('\n', " ");
    if start > 0 {
        snippet = format!("...{snippet}");
    }
    if end < content.len() {
        snippet.push_str("...");
    }
    Some(snippet)
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.trim().replace('\n', " ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{cut}...")
}

fn snap_down(s: &str, mut idx: usize) -> usize {
    idx = idx.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
