use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use core_model::SourceAdapter;
use store_sqlite::IndexStore;
use tracing::info;

mod config;
mod render;

#[derive(Parser)]
#[command(name = "sift")]
#[command(about = "Incremental index over coding-agent session transcripts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the index against the transcript files on disk
    Index {
        #[arg(long, default_value_t = false)]
        full: bool,
        /// Scan these directories instead of the sources' default locations
        #[arg(long = "path", value_name = "DIR")]
        paths: Vec<PathBuf>,
    },
    /// Find sessions whose messages contain a term
    Search {
        #[arg(value_name = "QUERY")]
        term: String,
        #[arg(long, value_name = "PATTERN")]
        cwd: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// List recently started sessions
    Recent {
        #[arg(long)]
        project: Option<String>,
        /// Only sessions newer than this, e.g. "7d" or "12h"
        #[arg(long, value_name = "DURATION")]
        since: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Most frequently used tools across all sessions
    Tools {
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    Stats,
    /// Print one indexed session
    Show {
        file_path: String,
        #[arg(long, default_value_t = false)]
        summary: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let config = config::Config::load()?;
    let t = Instant::now();

    info!("opening database");
    let mut store = match &config.db_path {
        Some(path) => IndexStore::open(path)?,
        None => IndexStore::open_default()?,
    };
    store.init_schema()?;

    match cli.command {
        Commands::Index { full, paths } => {
            let claude = claude::ClaudeAdapter;
            let codex = codex::CodexAdapter;
            let adapters: Vec<&dyn SourceAdapter> = vec![&claude, &codex];
            let roots = if paths.is_empty() {
                config.roots.clone()
            } else {
                Some(paths)
            };
            let summary = reconcile::reconcile(&mut store, &adapters, roots.as_deref(), full)?;
            info!(elapsed = ?t.elapsed(), "index done");
            println!(
                "indexed {} | skipped {} | removed {} | errors {}",
                summary.indexed,
                summary.skipped,
                summary.removed,
                summary.errors.len()
            );
            for err in &summary.errors {
                eprintln!("  {}: {}", err.path, err.reason);
            }
        }
        Commands::Search { term, cwd, limit } => {
            info!(term = %term, "searching");
            let hits = query::search(&store, &term, cwd.as_deref(), limit)?;
            info!(hits = hits.len(), elapsed = ?t.elapsed(), "search done");
            if hits.is_empty() {
                println!("no matches");
            }
            for hit in &hits {
                println!("{}", render::search_hit(hit));
            }
        }
        Commands::Recent {
            project,
            since,
            limit,
        } => {
            let since = since
                .map(|s| {
                    humantime::parse_duration(&s)
                        .with_context(|| format!("invalid --since value: {s}"))
                        .and_then(|d| chrono::Duration::from_std(d).map_err(Into::into))
                })
                .transpose()?;
            let sessions = query::recent(&store, project.as_deref(), since, limit)?;
            info!(sessions = sessions.len(), elapsed = ?t.elapsed(), "recent done");
            for s in &sessions {
                println!("{}", render::session_row(s));
            }
        }
        Commands::Tools { top } => {
            let rows = query::tool_usage(&store, top)?;
            print!("{}", render::tool_usage_rows(&rows));
        }
        Commands::Stats => {
            let report = query::stats(&store)?;
            let integrity = store.integrity_check()?;
            info!(elapsed = ?t.elapsed(), "stats done");
            print!("{}", render::stats_report(&report, &integrity));
        }
        Commands::Show { file_path, summary } => match query::show(&store, &file_path, summary)? {
            Some(view) => print!("{}", render::session_view(&view)),
            None => println!("not indexed: {file_path}"),
        },
    }

    Ok(())
}
