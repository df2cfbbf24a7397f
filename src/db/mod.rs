pub mod backup;
pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

/// Open (or create) the engram database at the given path, with pragmas
/// applied, schema initialized, and migrations run.
///
/// Three pragmas are applied on every open and the concurrency model depends
/// on all of them: WAL journaling (readers never block behind a writer), a
/// 5-second busy timeout (writer contention surfaces as a wait, not an
/// error), and foreign-key enforcement (cascade deletes).
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let conn = Connection::open(path).with_context(|| {
        format!(
            "failed to open database at {}. If the file is corrupt, \
             restore a copy from the backup directory.",
            path.display()
        )
    })?;

    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "busy_timeout", "5000")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    migrations::run_migrations(&conn, Some(path)).context("failed to run migrations")?;

    let integrity: String = conn.pragma_query_value(None, "quick_check", |row| row.get(0))?;
    if integrity != "ok" {
        anyhow::bail!(
            "database integrity check failed: {integrity}. \
             Restore a copy from the backup directory and restart."
        );
    }

    tracing::info!(path = %path.display(), "database initialized");
    Ok(conn)
}

/// Fold WAL contents back into the main database file.
///
/// Called after every mutating tool call, before the response is written.
/// A reader opening the file fresh (another process, or a fast-following
/// call in this one) would otherwise miss committed-but-unmerged writes.
pub fn checkpoint(conn: &Connection) -> rusqlite::Result<()> {
    conn.query_row("PRAGMA wal_checkpoint(FULL)", [], |_row| Ok(()))?;
    Ok(())
}

/// Result of a full database health check.
#[derive(Debug)]
pub struct HealthReport {
    pub schema_version: u32,
    pub integrity_ok: bool,
    pub integrity_details: String,
    pub entity_count: i64,
    pub relation_count: i64,
    pub observation_count: i64,
    pub embedding_count: i64,
}

/// Run a comprehensive health check on the database.
pub fn check_database_health(conn: &Connection) -> Result<HealthReport> {
    let schema_version =
        migrations::get_schema_version(conn).context("failed to read schema version")?;

    let integrity_details: String = conn
        .pragma_query_value(None, "integrity_check", |row| row.get(0))
        .context("failed to run integrity check")?;
    let integrity_ok = integrity_details == "ok";

    let count = |table: &str| -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })
        .unwrap_or(0)
    };

    Ok(HealthReport {
        schema_version,
        integrity_ok,
        integrity_details,
        entity_count: count("entities"),
        relation_count: count("relations"),
        observation_count: count("observations"),
        embedding_count: count("embeddings"),
    })
}

/// Open an in-memory database with schema and migrations applied, for tests.
pub fn open_memory_database() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    migrations::run_migrations(&conn, None).context("failed to run migrations")?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_parent_dirs_and_initializes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("kg.db");
        let conn = open_database(&path).unwrap();
        assert!(path.exists());

        let mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");

        let fk: i64 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn checkpoint_succeeds_on_fresh_db() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_database(dir.path().join("kg.db")).unwrap();
        checkpoint(&conn).unwrap();
    }

    #[test]
    fn health_report_on_empty_db() {
        let conn = open_memory_database().unwrap();
        let report = check_database_health(&conn).unwrap();
        assert!(report.integrity_ok);
        assert_eq!(report.schema_version, migrations::CURRENT_SCHEMA_VERSION);
        assert_eq!(report.entity_count, 0);
        assert_eq!(report.relation_count, 0);
    }
}
