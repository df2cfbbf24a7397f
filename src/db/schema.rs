//! SQL DDL for the knowledge-graph tables.
//!
//! Defines `entities`, `observations`, `relations`, `embeddings`,
//! `schema_metadata`, and the two FTS5 tables (`entities_fts`,
//! `observations_fts`). All DDL uses `IF NOT EXISTS` for idempotent
//! initialization.

use rusqlite::Connection;

/// Schema DDL for all core tables, version 2.
const SCHEMA_SQL: &str = r#"
-- Graph nodes. The name is the external key in all tool calls; the integer
-- id is internal and never crosses the protocol boundary.
CREATE TABLE IF NOT EXISTS entities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    entity_type TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(entity_type);

-- Append-only text statements about an entity.
CREATE TABLE IF NOT EXISTS observations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Serves both the per-entity lookup and the ordered read in one pass.
CREATE INDEX IF NOT EXISTS idx_observations_entity ON observations(entity_id, created_at);

-- Directed, typed edges. Identity is the full triple.
CREATE TABLE IF NOT EXISTS relations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    from_entity INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    to_entity INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    relation_type TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(from_entity, to_entity, relation_type)
);

CREATE INDEX IF NOT EXISTS idx_relations_from ON relations(from_entity);
CREATE INDEX IF NOT EXISTS idx_relations_to ON relations(to_entity);
CREATE INDEX IF NOT EXISTS idx_relations_type ON relations(relation_type);

-- One vector per (entity, model). Never mutated in place.
CREATE TABLE IF NOT EXISTS embeddings (
    entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    model_name TEXT NOT NULL,
    dimensions INTEGER NOT NULL,
    embedding BLOB NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (entity_id, model_name)
);

CREATE INDEX IF NOT EXISTS idx_embeddings_model ON embeddings(model_name);

-- Single-row schema version record, written only by the migration runner.
CREATE TABLE IF NOT EXISTS schema_metadata (
    version INTEGER NOT NULL,
    description TEXT NOT NULL,
    applied_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Full-text search. rowid is bound to entities.id / observations.id and the
-- write/delete paths in graph::store keep both in sync.
CREATE VIRTUAL TABLE IF NOT EXISTS entities_fts USING fts5(name, entity_type);

CREATE VIRTUAL TABLE IF NOT EXISTS observations_fts USING fts5(content);
"#;

/// Initialize all schema tables. Idempotent.
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        for expected in [
            "entities",
            "observations",
            "relations",
            "embeddings",
            "schema_metadata",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing {expected}");
        }

        // FTS virtual tables accept MATCH queries
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM entities_fts WHERE entities_fts MATCH 'anything'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
    }

    #[test]
    fn entity_names_are_unique() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        conn.execute(
            "INSERT INTO entities (name, entity_type, created_at, updated_at) \
             VALUES ('Ada', 'person', '2026-01-01', '2026-01-01')",
            [],
        )
        .unwrap();

        let dup = conn.execute(
            "INSERT INTO entities (name, entity_type, created_at, updated_at) \
             VALUES ('Ada', 'person', '2026-01-01', '2026-01-01')",
            [],
        );
        assert!(dup.is_err());
    }

    #[test]
    fn relation_triples_are_unique() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        conn.execute_batch(
            "INSERT INTO entities (name, entity_type, created_at, updated_at)
             VALUES ('a', 't', '2026-01-01', '2026-01-01'),
                    ('b', 't', '2026-01-01', '2026-01-01');
             INSERT INTO relations (from_entity, to_entity, relation_type, created_at, updated_at)
             VALUES (1, 2, 'rel', '2026-01-01', '2026-01-01');",
        )
        .unwrap();

        let dup = conn.execute(
            "INSERT INTO relations (from_entity, to_entity, relation_type, created_at, updated_at) \
             VALUES (1, 2, 'rel', '2026-01-01', '2026-01-01')",
            [],
        );
        assert!(dup.is_err());
    }
}
