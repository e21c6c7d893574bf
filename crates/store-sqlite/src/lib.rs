use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use core_model::{
    Fingerprint, MessageRecord, ParsedSession, Role, SessionRecord, SourceKind,
};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

const SCHEMA_VERSION: i64 = 1;

/// Single-file SQLite index over sessions, messages and tool calls.
/// `file_path` is the session identity; the change-detection fingerprint
/// lives inside the session row and is only ever written in the same
/// transaction that replaces the file's children.
pub struct IndexStore {
    conn: Connection,
}

#[derive(Debug, Clone)]
pub struct SearchRow {
    pub file_path: String,
    pub started_at: Option<DateTime<Utc>>,
    pub cwd: Option<String>,
    pub git_branch: Option<String>,
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct ToolUsage {
    pub tool_name: String,
    pub count: i64,
}

#[derive(Debug, Clone, Default)]
pub struct StatsReport {
    pub sessions: i64,
    pub messages: i64,
    pub tool_calls: i64,
    pub by_source: Vec<(String, i64)>,
    pub by_model: Vec<(String, i64)>,
    pub total_duration_seconds: i64,
    pub avg_duration_seconds: Option<f64>,
}

impl IndexStore {
    pub fn open_default() -> anyhow::Result<Self> {
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        let path = base.join("sift").join("index.db");
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating parent dir for {}", path.display()))?;
        }
        Self::open(path)
    }

    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("opening sqlite db {}", path.as_ref().display()))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL; PRAGMA foreign_keys = ON;",
        )?;
        Ok(Self { conn })
    }

    pub fn init_schema(&self) -> anyhow::Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
              file_path TEXT PRIMARY KEY,
              session_id TEXT,
              source TEXT NOT NULL,
              started_at TEXT,
              ended_at TEXT,
              duration_seconds INTEGER,
              model TEXT,
              cwd TEXT,
              git_branch TEXT,
              git_repo TEXT,
              message_count INTEGER NOT NULL,
              tool_count INTEGER NOT NULL,
              file_mtime REAL NOT NULL,
              file_size INTEGER NOT NULL,
              indexed_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS messages (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              file_path TEXT NOT NULL,
              message_idx INTEGER NOT NULL,
              role TEXT NOT NULL,
              content TEXT,
              ts TEXT,
              has_thinking INTEGER NOT NULL DEFAULT 0,
              UNIQUE(file_path, message_idx),
              FOREIGN KEY(file_path) REFERENCES sessions(file_path) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS tool_calls (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              file_path TEXT NOT NULL,
              message_idx INTEGER,
              tool_name TEXT NOT NULL,
              FOREIGN KEY(file_path) REFERENCES sessions(file_path) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_messages_file_path ON messages(file_path);
            CREATE INDEX IF NOT EXISTS idx_tool_calls_file_path ON tool_calls(file_path);
            CREATE INDEX IF NOT EXISTS idx_sessions_started_at ON sessions(started_at);
            "#,
        )?;
        let version: i64 = self
            .conn
            .query_row("PRAGMA user_version", [], |r| r.get(0))?;
        if version < SCHEMA_VERSION {
            self.conn
                .pragma_update(None, "user_version", SCHEMA_VERSION)?;
        }
        Ok(())
    }

    /// Atomic delete-then-insert for one file. Old rows for `file_path` are
    /// gone and all fresh rows are visible in a single transaction; the
    /// fingerprint is written alongside so it always describes the last
    /// completed index of this file.
    pub fn upsert_session(
        &mut self,
        file_path: &str,
        source: SourceKind,
        parsed: &ParsedSession,
        fingerprint: &Fingerprint,
    ) -> anyhow::Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM tool_calls WHERE file_path = ?1",
            params![file_path],
        )?;
        tx.execute(
            "DELETE FROM messages WHERE file_path = ?1",
            params![file_path],
        )?;
        tx.execute(
            "DELETE FROM sessions WHERE file_path = ?1",
            params![file_path],
        )?;
        tx.execute(
            r#"INSERT INTO sessions (
              file_path, session_id, source, started_at, ended_at,
              duration_seconds, model, cwd, git_branch, git_repo,
              message_count, tool_count, file_mtime, file_size, indexed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"#,
            params![
                file_path,
                parsed.meta.session_id,
                source.as_str(),
                parsed.meta.started_at.map(|t| t.to_rfc3339()),
                parsed.meta.ended_at.map(|t| t.to_rfc3339()),
                parsed.meta.duration_seconds(),
                parsed.meta.model,
                parsed.meta.cwd,
                parsed.meta.git_branch,
                parsed.meta.git_repo,
                parsed.messages.len() as i64,
                parsed.tool_calls.len() as i64,
                fingerprint.mtime,
                fingerprint.size as i64,
                Utc::now().to_rfc3339(),
            ],
        )?;
        {
            let mut stmt = tx.prepare_cached(
                r#"INSERT INTO messages (file_path, message_idx, role, content, ts, has_thinking)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            )?;
            for m in &parsed.messages {
                stmt.execute(params![
                    file_path,
                    m.message_idx,
                    m.role.as_str(),
                    m.content,
                    m.ts.map(|t| t.to_rfc3339()),
                    m.has_thinking as i64,
                ])?;
            }
        }
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO tool_calls (file_path, message_idx, tool_name) VALUES (?1, ?2, ?3)",
            )?;
            for t in &parsed.tool_calls {
                stmt.execute(params![file_path, t.message_idx, t.tool_name])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn delete_session(&mut self, file_path: &str) -> anyhow::Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM tool_calls WHERE file_path = ?1",
            params![file_path],
        )?;
        tx.execute(
            "DELETE FROM messages WHERE file_path = ?1",
            params![file_path],
        )?;
        tx.execute(
            "DELETE FROM sessions WHERE file_path = ?1",
            params![file_path],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Fingerprints for every indexed file, without loading full rows.
    pub fn list_file_fingerprints(&self) -> anyhow::Result<HashMap<String, Fingerprint>> {
        let mut stmt = self
            .conn
            .prepare("SELECT file_path, file_mtime, file_size FROM sessions")?;
        let rows = stmt.query_map([], |r| {
            let size: i64 = r.get(2)?;
            Ok((
                r.get::<_, String>(0)?,
                Fingerprint {
                    mtime: r.get(1)?,
                    size: size as u64,
                },
            ))
        })?;
        let mut out = HashMap::new();
        for row in rows {
            let (path, fp) = row?;
            out.insert(path, fp);
        }
        Ok(out)
    }

    pub fn recent_sessions(
        &self,
        project: Option<&str>,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> anyhow::Result<Vec<SessionRecord>> {
        let mut sql = format!("SELECT {SESSION_COLUMNS} FROM sessions");
        let mut conds: Vec<&str> = Vec::new();
        let mut values: Vec<rusqlite::types::Value> = Vec::new();
        if let Some(p) = project {
            conds.push("lower(cwd) LIKE ?");
            values.push(format!("%{}%", p.to_lowercase()).into());
        }
        if let Some(cutoff) = since {
            conds.push("started_at >= ?");
            values.push(cutoff.to_rfc3339().into());
        }
        if !conds.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conds.join(" AND "));
        }
        sql.push_str(" ORDER BY started_at DESC LIMIT ?");
        values.push(limit.into());
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), session_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Into::into)
    }

    /// Case-insensitive containment over message content. Substring match,
    /// not ranked relevance.
    pub fn search_messages(
        &self,
        term: &str,
        cwd: Option<&str>,
        limit: i64,
    ) -> anyhow::Result<Vec<SearchRow>> {
        let mut sql = String::from(
            r#"SELECT m.file_path, s.started_at, s.cwd, s.git_branch, m.role, m.content
            FROM messages m JOIN sessions s ON m.file_path = s.file_path
            WHERE m.content IS NOT NULL AND lower(m.content) LIKE ?"#,
        );
        let mut values: Vec<rusqlite::types::Value> =
            vec![format!("%{}%", term.to_lowercase()).into()];
        if let Some(c) = cwd {
            sql.push_str(" AND lower(s.cwd) LIKE ?");
            values.push(format!("%{}%", c.to_lowercase()).into());
        }
        sql.push_str(" ORDER BY s.started_at DESC, m.file_path, m.message_idx LIMIT ?");
        values.push(limit.into());
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), |r| {
            Ok(SearchRow {
                file_path: r.get(0)?,
                started_at: parse_ts_opt(r.get(1)?),
                cwd: r.get(2)?,
                git_branch: r.get(3)?,
                role: parse_role(&r.get::<_, String>(4)?),
                content: r.get(5)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Into::into)
    }

    pub fn tool_usage(&self, top: i64) -> anyhow::Result<Vec<ToolUsage>> {
        let mut stmt = self.conn.prepare(
            "SELECT tool_name, COUNT(*) AS n FROM tool_calls GROUP BY tool_name ORDER BY n DESC, tool_name LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![top], |r| {
            Ok(ToolUsage {
                tool_name: r.get(0)?,
                count: r.get(1)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Into::into)
    }

    pub fn stats(&self) -> anyhow::Result<StatsReport> {
        let sessions: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |r| r.get(0))?;
        let messages: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))?;
        let tool_calls: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM tool_calls", [], |r| r.get(0))?;
        let by_source = self.grouped_counts("source")?;
        let by_model = self.grouped_counts("model")?;
        let (total_duration_seconds, avg_duration_seconds) = self.conn.query_row(
            "SELECT COALESCE(SUM(duration_seconds), 0), AVG(duration_seconds) FROM sessions",
            [],
            |r| Ok((r.get::<_, i64>(0)?, r.get::<_, Option<f64>>(1)?)),
        )?;
        Ok(StatsReport {
            sessions,
            messages,
            tool_calls,
            by_source,
            by_model,
            total_duration_seconds,
            avg_duration_seconds,
        })
    }

    fn grouped_counts(&self, column: &str) -> anyhow::Result<Vec<(String, i64)>> {
        // column names come from stats() only, never from user input
        let sql = format!(
            "SELECT {column}, COUNT(*) AS n FROM sessions WHERE {column} IS NOT NULL GROUP BY {column} ORDER BY n DESC, {column}"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Into::into)
    }

    pub fn get_session(&self, file_path: &str) -> anyhow::Result<Option<SessionRecord>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE file_path = ?1");
        self.conn
            .query_row(&sql, params![file_path], session_from_row)
            .optional()
            .map_err(Into::into)
    }

    pub fn get_session_messages(&self, file_path: &str) -> anyhow::Result<Vec<MessageRecord>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT file_path, message_idx, role, content, ts, has_thinking
            FROM messages WHERE file_path = ?1 ORDER BY message_idx"#,
        )?;
        let rows = stmt.query_map(params![file_path], |r| {
            Ok(MessageRecord {
                file_path: r.get(0)?,
                message_idx: r.get(1)?,
                role: parse_role(&r.get::<_, String>(2)?),
                content: r.get(3)?,
                ts: parse_ts_opt(r.get(4)?),
                has_thinking: r.get::<_, i64>(5)? != 0,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Into::into)
    }

    /// First user message long enough to be a real prompt, for summaries.
    pub fn first_user_prompt(
        &self,
        file_path: &str,
        min_chars: i64,
    ) -> anyhow::Result<Option<String>> {
        self.conn
            .query_row(
                r#"SELECT content FROM messages
                WHERE file_path = ?1 AND role = 'user' AND LENGTH(content) > ?2
                ORDER BY message_idx LIMIT 1"#,
                params![file_path, min_chars],
                |r| r.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn integrity_check(&self) -> anyhow::Result<String> {
        self.conn
            .query_row("PRAGMA integrity_check;", [], |r| r.get(0))
            .map_err(Into::into)
    }
}

const SESSION_COLUMNS: &str = "file_path, session_id, source, started_at, ended_at, \
    duration_seconds, model, cwd, git_branch, git_repo, message_count, tool_count, \
    file_mtime, file_size, indexed_at";

fn session_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRecord> {
    let source_str: String = r.get(2)?;
    let source = source_str.parse::<SourceKind>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
    })?;
    Ok(SessionRecord {
        file_path: r.get(0)?,
        session_id: r.get(1)?,
        source,
        started_at: parse_ts_opt(r.get(3)?),
        ended_at: parse_ts_opt(r.get(4)?),
        duration_seconds: r.get(5)?,
        model: r.get(6)?,
        cwd: r.get(7)?,
        git_branch: r.get(8)?,
        git_repo: r.get(9)?,
        message_count: r.get(10)?,
        tool_count: r.get(11)?,
        file_mtime: r.get(12)?,
        file_size: r.get(13)?,
        indexed_at: parse_ts_opt(r.get(14)?).unwrap_or_else(Utc::now),
    })
}

fn parse_ts_opt(ts: Option<String>) -> Option<DateTime<Utc>> {
    ts.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|v| v.with_timezone(&Utc))
    })
}

fn parse_role(s: &str) -> Role {
    match s {
        "assistant" => Role::Assistant,
        _ => Role::User,
    }
}
