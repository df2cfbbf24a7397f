//! Database file backups and retention.
//!
//! Two kinds of copies are taken: periodic/startup backups under the
//! configured backup directory, pruned by the retention policy, and one-off
//! pre-migration snapshots next to the database file, which retention never
//! touches.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Copy the database into `backup_dir` as `knowledge_graph_<unix-ts>.db`.
///
/// The WAL is checkpointed by the caller's normal write path, so a plain
/// file copy of the main database is a consistent snapshot for our
/// single-writer usage.
pub fn backup_database(db_path: &Path, backup_dir: &Path) -> Result<PathBuf> {
    anyhow::ensure!(
        db_path.exists(),
        "database file does not exist: {}",
        db_path.display()
    );
    std::fs::create_dir_all(backup_dir)
        .with_context(|| format!("failed to create backup dir {}", backup_dir.display()))?;

    let ts = chrono::Utc::now().timestamp();
    let dest = backup_dir.join(format!("knowledge_graph_{ts}.db"));
    std::fs::copy(db_path, &dest)
        .with_context(|| format!("failed to copy database to {}", dest.display()))?;

    tracing::info!(backup = %dest.display(), "database backup written");
    Ok(dest)
}

/// One-off snapshot taken immediately before a schema migration, written
/// next to the database file and exempt from retention.
pub fn migration_snapshot(db_path: &Path) -> Result<PathBuf> {
    let ts = chrono::Utc::now().timestamp();
    let stem = db_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("knowledge_graph");
    let dest = db_path.with_file_name(format!("{stem}_pre_migration_{ts}.db"));
    std::fs::copy(db_path, &dest)
        .with_context(|| format!("failed to snapshot database to {}", dest.display()))?;
    Ok(dest)
}

/// Delete old backups, keeping the newest `min_backups` and never touching
/// a backup younger than `min_age_days`.
pub fn prune_backups(backup_dir: &Path, min_backups: usize, min_age_days: u64) -> Result<usize> {
    if !backup_dir.exists() {
        return Ok(0);
    }

    let mut backups: Vec<(PathBuf, SystemTime)> = Vec::new();
    for entry in std::fs::read_dir(backup_dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => continue,
        };
        if !name.starts_with("knowledge_graph_") || !name.ends_with(".db") {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        backups.push((path, modified));
    }

    // Newest first; everything past the keep count is a candidate.
    backups.sort_by(|a, b| b.1.cmp(&a.1));

    let min_age = Duration::from_secs(min_age_days * 24 * 60 * 60);
    let now = SystemTime::now();
    let mut removed = 0;
    for (path, modified) in backups.into_iter().skip(min_backups) {
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age < min_age {
            continue;
        }
        std::fs::remove_file(&path)
            .with_context(|| format!("failed to remove old backup {}", path.display()))?;
        tracing::debug!(backup = %path.display(), "pruned old backup");
        removed += 1;
    }
    Ok(removed)
}
