//! Schema versioning and the legacy v1 → v2 migration.
//!
//! v1 is the original layout: entities carry their observations inline as a
//! JSON-array column, and relations reference entity names. v2 moves
//! observations into their own table, rekeys relations to entity ids, and
//! adds the embeddings and schema_metadata tables.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use super::schema;

/// The schema version the current binary expects.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Read the stored schema version. 0 means the metadata table is absent
/// (a fresh file, or a legacy v1 file).
pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let has_meta: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_metadata'",
        [],
        |row| row.get(0),
    )?;
    if !has_meta {
        return Ok(0);
    }
    let version: Option<u32> = conn
        .query_row("SELECT version FROM schema_metadata", [], |row| row.get(0))
        .optional()?;
    Ok(version.unwrap_or(0))
}

/// Bring the database up to [`CURRENT_SCHEMA_VERSION`].
///
/// Fresh files get the v2 schema directly. Legacy v1 files are migrated in a
/// single transaction, after a timestamped snapshot of the database file is
/// taken (when a file path is known). Idempotent at version >= 2.
pub fn run_migrations(conn: &Connection, db_path: Option<&Path>) -> Result<()> {
    let version = get_schema_version(conn)?;
    if version >= CURRENT_SCHEMA_VERSION {
        // Re-assert DDL so a new binary can add IF NOT EXISTS objects.
        schema::init_schema(conn)?;
        return Ok(());
    }

    if is_legacy_v1(conn)? {
        if let Some(path) = db_path {
            let snapshot = super::backup::migration_snapshot(path)
                .context("failed to snapshot database before migration")?;
            tracing::info!(snapshot = %snapshot.display(), "pre-migration snapshot written");
        }
        tracing::info!("migrating legacy v1 database to schema v2");
        migrate_v1_to_v2(conn).context("v1 to v2 migration failed")?;
    } else {
        schema::init_schema(conn)?;
        record_version(conn, CURRENT_SCHEMA_VERSION, "initial schema")?;
    }

    Ok(())
}

/// A v1 file has an `entities` table with an inline `observations` column.
fn is_legacy_v1(conn: &Connection) -> rusqlite::Result<bool> {
    let has_entities: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='entities'",
        [],
        |row| row.get(0),
    )?;
    if !has_entities {
        return Ok(false);
    }
    let mut stmt = conn.prepare("PRAGMA table_info(entities)")?;
    let columns: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns.iter().any(|c| c == "observations"))
}

struct LegacyEntity {
    id: i64,
    name: String,
    entity_type: String,
    observations: String,
    created_at: String,
    updated_at: String,
}

struct LegacyRelation {
    from_name: String,
    to_name: String,
    relation_type: String,
    created_at: String,
    updated_at: String,
}

/// Rebuild the whole database in the v2 shape inside one transaction:
/// read everything out, drop the legacy objects, recreate, reinsert.
fn migrate_v1_to_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch("BEGIN IMMEDIATE")?;
    let result = migrate_v1_to_v2_inner(conn);
    match result {
        Ok(()) => {
            conn.execute_batch("COMMIT")?;
            Ok(())
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}

fn migrate_v1_to_v2_inner(conn: &Connection) -> Result<()> {
    let entities: Vec<LegacyEntity> = conn
        .prepare("SELECT id, name, entity_type, observations, created_at, updated_at FROM entities")?
        .query_map([], |row| {
            Ok(LegacyEntity {
                id: row.get(0)?,
                name: row.get(1)?,
                entity_type: row.get(2)?,
                observations: row.get(3)?,
                created_at: row.get(4)?,
                updated_at: row.get(5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let has_relations: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='relations'",
        [],
        |row| row.get(0),
    )?;
    let relations: Vec<LegacyRelation> = if has_relations {
        conn.prepare(
            "SELECT from_entity, to_entity, relation_type, created_at, updated_at FROM relations",
        )?
        .query_map([], |row| {
            Ok(LegacyRelation {
                from_name: row.get(0)?,
                to_name: row.get(1)?,
                relation_type: row.get(2)?,
                created_at: row.get(3)?,
                updated_at: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?
    } else {
        Vec::new()
    };

    // The legacy FTS table has a different column set and content= binding,
    // with sync triggers. Everything is rebuilt from scratch.
    conn.execute_batch(
        "DROP TRIGGER IF EXISTS entities_fts_insert;
         DROP TRIGGER IF EXISTS entities_fts_delete;
         DROP TRIGGER IF EXISTS entities_fts_update;
         DROP TABLE IF EXISTS entities_fts;
         DROP TABLE IF EXISTS relations;
         DROP TABLE IF EXISTS entities;",
    )?;

    schema::init_schema(conn)?;

    let mut insert_entity = conn.prepare(
        "INSERT INTO entities (id, name, entity_type, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    let mut insert_entity_fts = conn
        .prepare("INSERT INTO entities_fts (rowid, name, entity_type) VALUES (?1, ?2, ?3)")?;
    let mut insert_obs = conn.prepare(
        "INSERT INTO observations (entity_id, content, created_at) VALUES (?1, ?2, ?3)",
    )?;
    let mut insert_obs_fts =
        conn.prepare("INSERT INTO observations_fts (rowid, content) VALUES (?1, ?2)")?;

    for entity in &entities {
        insert_entity.execute(params![
            entity.id,
            entity.name,
            entity.entity_type,
            entity.created_at,
            entity.updated_at,
        ])?;
        insert_entity_fts.execute(params![entity.id, entity.name, entity.entity_type])?;

        let contents: Vec<String> = serde_json::from_str(&entity.observations)
            .with_context(|| format!("bad observations JSON for entity {}", entity.name))?;
        // Array order is the observation order; created_at is inherited from
        // the entity because v1 never recorded per-observation timestamps.
        for content in contents {
            insert_obs.execute(params![entity.id, content, entity.created_at])?;
            let obs_id = conn.last_insert_rowid();
            insert_obs_fts.execute(params![obs_id, content])?;
        }
    }

    let mut insert_relation = conn.prepare(
        "INSERT OR IGNORE INTO relations \
         (from_entity, to_entity, relation_type, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    let mut dropped = 0usize;
    for relation in &relations {
        let from_id = entity_id_by_name(conn, &relation.from_name)?;
        let to_id = entity_id_by_name(conn, &relation.to_name)?;
        match (from_id, to_id) {
            (Some(f), Some(t)) => {
                insert_relation.execute(params![
                    f,
                    t,
                    relation.relation_type,
                    relation.created_at,
                    relation.updated_at,
                ])?;
            }
            _ => dropped += 1,
        }
    }
    if dropped > 0 {
        tracing::warn!(dropped, "dropped legacy relations with dangling endpoints");
    }

    record_version(conn, CURRENT_SCHEMA_VERSION, "migrated v1 to v2")?;
    Ok(())
}

fn entity_id_by_name(conn: &Connection, name: &str) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM entities WHERE name = ?1",
        params![name],
        |row| row.get(0),
    )
    .optional()
}

fn record_version(conn: &Connection, version: u32, description: &str) -> rusqlite::Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute("DELETE FROM schema_metadata", [])?;
    conn.execute(
        "INSERT INTO schema_metadata (version, description, applied_at, updated_at) \
         VALUES (?1, ?2, ?3, ?3)",
        params![version, description, now],
    )?;
    Ok(())
}
