use std::collections::HashSet;
use std::path::{Path, PathBuf};

use core_model::{Fingerprint, SourceAdapter};
use rayon::prelude::*;
use store_sqlite::IndexStore;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    New,
    Modified,
    Unchanged,
    MissingFromDisk,
}

/// Pure classification from the two fingerprints. `current` is what the
/// filesystem says right now, `stored` what the index recorded at the last
/// successful write.
pub fn classify(current: Option<&Fingerprint>, stored: Option<&Fingerprint>) -> FileStatus {
    match (current, stored) {
        (Some(_), None) => FileStatus::New,
        (Some(cur), Some(old)) if cur.matches(old) => FileStatus::Unchanged,
        (Some(_), Some(_)) => FileStatus::Modified,
        (None, _) => FileStatus::MissingFromDisk,
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileError {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct ReconcileSummary {
    pub indexed: usize,
    pub skipped: usize,
    pub removed: usize,
    pub errors: Vec<ReconcileError>,
}

/// Discover candidate session files and the adapter responsible for each.
///
/// With explicit roots, every `.jsonl` file under them is offered to the
/// adapters in order and the first claim wins. Without roots, each adapter
/// scans its own default directories. An unreadable explicit root is
/// recorded as an error; the remaining roots still get scanned.
pub fn enumerate_session_files<'a>(
    adapters: &[&'a dyn SourceAdapter],
    roots: Option<&[PathBuf]>,
    errors: &mut Vec<ReconcileError>,
) -> Vec<(PathBuf, &'a dyn SourceAdapter)> {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut out = Vec::new();
    match roots {
        Some(roots) => {
            for root in roots {
                let paths = match collect_jsonl_files(root) {
                    Ok(paths) => paths,
                    Err(err) => {
                        errors.push(ReconcileError {
                            path: root.display().to_string(),
                            reason: format!("reading root directory: {err}"),
                        });
                        continue;
                    }
                };
                for path in paths {
                    if !seen.insert(path.clone()) {
                        continue;
                    }
                    match adapters.iter().find(|a| a.claims(&path)) {
                        Some(adapter) => out.push((path, *adapter)),
                        None => debug!(path = %path.display(), "no adapter claims file"),
                    }
                }
            }
        }
        None => {
            for adapter in adapters {
                for root in adapter.default_roots() {
                    // absent or unreadable default locations are normal
                    let Ok(paths) = collect_jsonl_files(&root) else {
                        continue;
                    };
                    for path in paths {
                        if seen.insert(path.clone()) {
                            out.push((path, *adapter));
                        }
                    }
                }
            }
        }
    }
    out
}

/// The root itself must be readable; subdirectories vanishing or denying
/// access mid-walk are skipped without failing the root.
fn collect_jsonl_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut stack = vec![std::fs::read_dir(root)?];
    while let Some(entries) = stack.pop() {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if let Ok(sub) = std::fs::read_dir(&path) {
                    stack.push(sub);
                }
            } else if path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
                out.push(path);
            }
        }
    }
    out.sort();
    Ok(out)
}

/// One batch reconciliation of the index against the filesystem.
///
/// Parsing of changed files runs on the rayon pool; all store writes happen
/// afterwards on this thread, one transaction per file. A parse failure
/// leaves the file's previous index entry untouched and never aborts the
/// batch; only store-level failures propagate.
pub fn reconcile(
    store: &mut IndexStore,
    adapters: &[&dyn SourceAdapter],
    roots: Option<&[PathBuf]>,
    full: bool,
) -> anyhow::Result<ReconcileSummary> {
    let mut summary = ReconcileSummary::default();

    let candidates = enumerate_session_files(adapters, roots, &mut summary.errors);
    let stored = store.list_file_fingerprints()?;
    info!(
        candidates = candidates.len(),
        indexed = stored.len(),
        "reconcile start"
    );

    let mut to_index: Vec<(PathBuf, &dyn SourceAdapter, Fingerprint)> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for (path, adapter) in candidates {
        // A file can vanish between enumeration and stat; the cleanup pass
        // picks it up if it was ever indexed.
        let Ok(current) = Fingerprint::of(&path) else {
            continue;
        };
        // Same lossy conversion as the row keys written by upsert, so
        // non-UTF-8 paths resolve to their stored fingerprint.
        let path_str = path.display().to_string();
        seen.insert(path_str.clone());
        let stored_fp = stored.get(&path_str);
        let status = if full {
            FileStatus::Modified
        } else {
            classify(Some(&current), stored_fp)
        };
        match status {
            FileStatus::Unchanged => summary.skipped += 1,
            FileStatus::New | FileStatus::Modified => to_index.push((path, adapter, current)),
            FileStatus::MissingFromDisk => {}
        }
    }

    let parsed: Vec<_> = to_index
        .into_par_iter()
        .map(|(path, adapter, fp)| {
            let result = adapter.parse(&path);
            (path, adapter.kind(), fp, result)
        })
        .collect();

    for (path, kind, fp, result) in parsed {
        let path_str = path.display().to_string();
        match result {
            Ok(session) => {
                store.upsert_session(&path_str, kind, &session, &fp)?;
                summary.indexed += 1;
                debug!(path = %path_str, source = %kind, "indexed");
            }
            Err(err) => {
                warn!(path = %path_str, error = %err, "parse failed, keeping prior entry");
                summary.errors.push(ReconcileError {
                    path: path_str,
                    reason: err.to_string(),
                });
            }
        }
    }

    for path in stored.keys() {
        if seen.contains(path) {
            continue;
        }
        if !Path::new(path).exists() {
            store.delete_session(path)?;
            summary.removed += 1;
            debug!(path = %path, "removed vanished file");
        }
    }

    info!(
        indexed = summary.indexed,
        skipped = summary.skipped,
        removed = summary.removed,
        errors = summary.errors.len(),
        "reconcile done"
    );
    Ok(summary)
}
