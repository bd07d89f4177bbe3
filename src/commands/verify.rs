/// `actorcache verify` command implementation
///
/// Walks the cache root and checks every entry directory: a committed entry
/// holds one `_SUCCESS` marker and at most one `data*` payload (none for a
/// folder entry). Payloads without a marker are pending writes and only
/// reported.
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

use crate::cli_utils::actorcache_prefix;
use actorcache::storage::{inspect_entry, kv::KV_DIR, EntryShape};

#[derive(Debug, Default)]
struct VerifyReport {
    entries: usize,
    uncommitted: Vec<PathBuf>,
    malformed: Vec<(PathBuf, EntryShape)>,
}

pub fn run(root: &Path) -> Result<()> {
    if !root.exists() {
        println!(
            "{} Cache root {} does not exist, nothing to verify",
            actorcache_prefix(),
            root.display()
        );
        return Ok(());
    }

    let report = scan(root)?;

    for path in &report.uncommitted {
        println!("  pending   {}", path.display());
    }
    for (path, shape) in &report.malformed {
        println!(
            "  malformed {} ({} marker(s), {} payload(s))",
            path.display(),
            shape.markers,
            shape.payloads
        );
    }

    println!(
        "{} Checked {} entries: {} malformed, {} pending",
        actorcache_prefix(),
        report.entries,
        report.malformed.len(),
        report.uncommitted.len()
    );

    if !report.malformed.is_empty() {
        anyhow::bail!("{} malformed cache entries", report.malformed.len());
    }
    Ok(())
}

fn scan(root: &Path) -> Result<VerifyReport> {
    let mut report = VerifyReport::default();

    let walker = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.file_name() != KV_DIR);

    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_dir() {
            continue;
        }

        let shape = inspect_entry(entry.path())?;
        match (shape.markers, shape.payloads) {
            (0, 0) => {}
            (0, _) => {
                report.entries += 1;
                report.uncommitted.push(entry.path().to_path_buf());
            }
            (1, 0 | 1) => report.entries += 1,
            _ => {
                warn!(dir = %entry.path().display(), "Malformed cache entry");
                report.entries += 1;
                report.malformed.push((entry.path().to_path_buf(), shape));
            }
        }
    }

    Ok(report)
}
