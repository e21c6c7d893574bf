use core_model::SessionRecord;
use query::{SearchHit, SessionView};
use store_sqlite::{StatsReport, ToolUsage};

pub fn session_row(s: &SessionRecord) -> String {
    let date = s
        .started_at
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "{} | {:>7} | {:>4} msgs | {:>3} tools | {}",
        date,
        format_duration(s.duration_seconds),
        s.message_count,
        s.tool_count,
        s.cwd.as_deref().unwrap_or("-")
    )
}

pub fn search_hit(hit: &SearchHit) -> String {
    let date = hit
        .started_at
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "{} [{}] {}\n  {}",
        date, hit.role, hit.file_path, hit.excerpt
    )
}

pub fn tool_usage_rows(rows: &[ToolUsage]) -> String {
    let mut out = String::new();
    for row in rows {
        out.push_str(&format!("{:>6}  {}\n", row.count, row.tool_name));
    }
    out
}

pub fn stats_report(report: &StatsReport, integrity: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("sessions:   {}\n", report.sessions));
    out.push_str(&format!("messages:   {}\n", report.messages));
    out.push_str(&format!("tool calls: {}\n", report.tool_calls));
    if !report.by_source.is_empty() {
        out.push_str("by source:\n");
        for (source, count) in &report.by_source {
            out.push_str(&format!("  {source}: {count}\n"));
        }
    }
    if !report.by_model.is_empty() {
        out.push_str("by model:\n");
        for (model, count) in &report.by_model {
            out.push_str(&format!("  {model}: {count}\n"));
        }
    }
    out.push_str(&format!(
        "total time: {}\n",
        format_duration(Some(report.total_duration_seconds))
    ));
    if let Some(avg) = report.avg_duration_seconds {
        out.push_str(&format!(
            "avg time:   {}\n",
            format_duration(Some(avg as i64))
        ));
    }
    out.push_str(&format!("integrity:  {integrity}\n"));
    out
}

pub fn session_view(view: &SessionView) -> String {
    match view {
        SessionView::Full { session, messages } => {
            let mut out = session_header(session);
            for m in messages {
                let ts = m
                    .ts
                    .map(|t| format!(" ({})", t.format("%H:%M:%S")))
                    .unwrap_or_default();
                out.push_str(&format!("\n## {}{}\n", m.role, ts));
                out.push_str(m.content.as_deref().unwrap_or("(no text)"));
                out.push('\n');
            }
            out
        }
        SessionView::Summary {
            session,
            first_prompt,
        } => {
            let mut out = session_header(session);
            out.push_str("\nfirst prompt: ");
            out.push_str(first_prompt.as_deref().unwrap_or("(none)"));
            out.push('\n');
            out
        }
    }
}

fn session_header(s: &SessionRecord) -> String {
    let mut out = format!("# {}\n", s.file_path);
    out.push_str(&format!("source:   {}\n", s.source));
    if let Some(id) = &s.session_id {
        out.push_str(&format!("session:  {id}\n"));
    }
    if let Some(started) = s.started_at {
        out.push_str(&format!("started:  {}\n", started.format("%Y-%m-%d %H:%M")));
    }
    out.push_str(&format!(
        "duration: {}\n",
        format_duration(s.duration_seconds)
    ));
    if let Some(model) = &s.model {
        out.push_str(&format!("model:    {model}\n"));
    }
    if let Some(cwd) = &s.cwd {
        out.push_str(&format!("cwd:      {cwd}\n"));
    }
    if let Some(branch) = &s.git_branch {
        out.push_str(&format!("branch:   {branch}\n"));
    }
    out.push_str(&format!(
        "messages: {}  tools: {}\n",
        s.message_count, s.tool_count
    ));
    out
}

pub fn format_duration(seconds: Option<i64>) -> String {
    match seconds {
        Some(s) if s >= 3600 => format!("{}h{:02}m", s / 3600, (s % 3600) / 60),
        Some(s) if s >= 60 => format!("{}m{:02}s", s / 60, s % 60),
        Some(s) => format!("{s}s"),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use core_model::{Role, SourceKind};

    fn record() -> SessionRecord {
        SessionRecord {
            file_path: "/tmp/a.jsonl".to_string(),
            session_id: Some("s1".to_string()),
            source: SourceKind::Claude,
            started_at: Some(Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap()),
            ended_at: None,
            duration_seconds: Some(754),
            model: Some("claude-sonnet-4".to_string()),
            cwd: Some("/home/user/proj".to_string()),
            git_branch: Some("main".to_string()),
            git_repo: Some("proj".to_string()),
            message_count: 12,
            tool_count: 3,
            file_mtime: 1.0,
            file_size: 100,
            indexed_at: Utc::now(),
        }
    }

    #[test]
    fn duration_formats() {
        assert_eq!(format_duration(None), "-");
        assert_eq!(format_duration(Some(42)), "42s");
        assert_eq!(format_duration(Some(754)), "12m34s");
        assert_eq!(format_duration(Some(7200)), "2h00m");
    }

    #[test]
    fn session_row_shape() {
        let row = session_row(&record());
        assert!(row.starts_with("2025-01-15 10:30"));
        assert!(row.contains("12m34s"));
        assert!(row.contains("12 msgs"));
        assert!(row.contains("3 tools"));
        assert!(row.ends_with("/home/user/proj"));
    }

    #[test]
    fn session_row_handles_missing_fields() {
        let mut s = record();
        s.started_at = None;
        s.duration_seconds = None;
        s.cwd = None;
        let row = session_row(&s);
        assert!(row.starts_with("unknown"));
        assert!(row.ends_with("-"));
    }

    #[test]
    fn search_hit_includes_excerpt() {
        let hit = SearchHit {
            file_path: "/tmp/a.jsonl".to_string(),
            started_at: None,
            cwd: None,
            git_branch: None,
            role: Role::User,
            excerpt: "...fix the login bug...".to_string(),
        };
        let line = search_hit(&hit);
        assert!(line.contains("[user]"));
        assert!(line.contains("fix the login bug"));
    }

    #[test]
    fn summary_view_shows_first_prompt() {
        let view = SessionView::Summary {
            session: record(),
            first_prompt: Some("fix the login bug in auth.rs".to_string()),
        };
        let text = session_view(&view);
        assert!(text.contains("first prompt: fix the login bug"));
        assert!(text.contains("source:   claude"));
    }

    #[test]
    fn stats_report_lists_breakdowns() {
        let report = StatsReport {
            sessions: 3,
            messages: 40,
            tool_calls: 7,
            by_source: vec![("claude".to_string(), 2), ("codex".to_string(), 1)],
            by_model: vec![("claude-sonnet-4".to_string(), 2)],
            total_duration_seconds: 3600,
            avg_duration_seconds: Some(1200.0),
        };
        let text = stats_report(&report, "ok");
        assert!(text.contains("sessions:   3"));
        assert!(text.contains("claude: 2"));
        assert!(text.contains("integrity:  ok"));
    }
}
