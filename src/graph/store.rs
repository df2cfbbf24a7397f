//! CRUD contracts for entities, observations, and relations.
//!
//! Functions here take a borrowed connection (a [`rusqlite::Transaction`]
//! derefs to one), so the tool layer can compose several calls into a single
//! transaction. Both FTS tables are kept in sync manually on every write and
//! delete; cascade deletes never touch FTS, so the delete paths clean index
//! rows explicitly before removing the owning row.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::graph::types::{EntityDump, GraphDump, GraphStats, RelationDump};

/// Typed failures from the storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("entity already exists: {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0} must not be empty")]
    EmptyField(String),

    #[error("stored data is corrupt: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Resolve an entity name to its internal id.
pub fn entity_id_by_name(conn: &Connection, name: &str) -> Result<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT id FROM entities WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// Create a new entity. Fails with [`StoreError::AlreadyExists`] on a name
/// collision. Returns the internal id.
pub fn create_entity(conn: &Connection, name: &str, entity_type: &str) -> Result<i64> {
    if name.is_empty() {
        return Err(StoreError::EmptyField("name".into()));
    }
    if entity_type.is_empty() {
        return Err(StoreError::EmptyField("entity_type".into()));
    }
    if entity_id_by_name(conn, name)?.is_some() {
        return Err(StoreError::AlreadyExists(name.into()));
    }

    let ts = now();
    conn.execute(
        "INSERT INTO entities (name, entity_type, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?3)",
        params![name, entity_type, ts],
    )?;
    let id = conn.last_insert_rowid();
    conn.execute(
        "INSERT INTO entities_fts (rowid, name, entity_type) VALUES (?1, ?2, ?3)",
        params![id, name, entity_type],
    )?;
    Ok(id)
}

/// Append an observation to an entity, by name.
pub fn add_observation(conn: &Connection, entity_name: &str, content: &str) -> Result<i64> {
    let entity_id = entity_id_by_name(conn, entity_name)?
        .ok_or_else(|| StoreError::NotFound(entity_name.into()))?;
    add_observation_by_id(conn, entity_id, content)
}

/// Append an observation to an entity, by internal id.
pub fn add_observation_by_id(conn: &Connection, entity_id: i64, content: &str) -> Result<i64> {
    if content.is_empty() {
        return Err(StoreError::EmptyField("content".into()));
    }
    let ts = now();
    conn.execute(
        "INSERT INTO observations (entity_id, content, created_at) VALUES (?1, ?2, ?3)",
        params![entity_id, content, ts],
    )?;
    let id = conn.last_insert_rowid();
    conn.execute(
        "INSERT INTO observations_fts (rowid, content) VALUES (?1, ?2)",
        params![id, content],
    )?;
    conn.execute(
        "UPDATE entities SET updated_at = ?1 WHERE id = ?2",
        params![ts, entity_id],
    )?;
    Ok(id)
}

/// Create a directed relation between two named entities.
///
/// The (from, to, type) triple is the relation's identity: creating one that
/// already exists refreshes its `updated_at` and returns the existing id.
/// Returns `(id, created)`.
pub fn create_relation(
    conn: &Connection,
    from_name: &str,
    to_name: &str,
    relation_type: &str,
) -> Result<(i64, bool)> {
    if relation_type.is_empty() {
        return Err(StoreError::EmptyField("relation_type".into()));
    }
    let from_id = entity_id_by_name(conn, from_name)?
        .ok_or_else(|| StoreError::NotFound(from_name.into()))?;
    let to_id =
        entity_id_by_name(conn, to_name)?.ok_or_else(|| StoreError::NotFound(to_name.into()))?;

    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM relations \
             WHERE from_entity = ?1 AND to_entity = ?2 AND relation_type = ?3",
            params![from_id, to_id, relation_type],
            |row| row.get(0),
        )
        .optional()?;

    let ts = now();
    if let Some(id) = existing {
        conn.execute(
            "UPDATE relations SET updated_at = ?1 WHERE id = ?2",
            params![ts, id],
        )?;
        return Ok((id, false));
    }

    conn.execute(
        "INSERT INTO relations (from_entity, to_entity, relation_type, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![from_id, to_id, relation_type, ts],
    )?;
    Ok((conn.last_insert_rowid(), true))
}

/// Delete an entity by name, cascading to its observations, relations, and
/// embeddings. Idempotent: returns false when the name does not resolve.
pub fn delete_entity(conn: &Connection, name: &str) -> Result<bool> {
    let entity_id = match entity_id_by_name(conn, name)? {
        Some(id) => id,
        None => return Ok(false),
    };

    // FTS rows first: the FK cascade removes observation rows without
    // touching their index entries.
    conn.execute(
        "DELETE FROM observations_fts WHERE rowid IN \
         (SELECT id FROM observations WHERE entity_id = ?1)",
        params![entity_id],
    )?;
    conn.execute(
        "DELETE FROM entities_fts WHERE rowid = ?1",
        params![entity_id],
    )?;
    conn.execute("DELETE FROM entities WHERE id = ?1", params![entity_id])?;
    Ok(true)
}

/// Delete a relation by its identity triple. Idempotent: returns false when
/// either endpoint or the triple itself does not exist.
pub fn delete_relation(
    conn: &Connection,
    from_name: &str,
    to_name: &str,
    relation_type: &str,
) -> Result<bool> {
    let from_id = match entity_id_by_name(conn, from_name)? {
        Some(id) => id,
        None => return Ok(false),
    };
    let to_id = match entity_id_by_name(conn, to_name)? {
        Some(id) => id,
        None => return Ok(false),
    };
    let rows = conn.execute(
        "DELETE FROM relations \
         WHERE from_entity = ?1 AND to_entity = ?2 AND relation_type = ?3",
        params![from_id, to_id, relation_type],
    )?;
    Ok(rows > 0)
}

/// Full dump: entities ordered by name, each with its observations in
/// creation order; relations carry endpoint names.
pub fn read_graph(conn: &Connection) -> Result<GraphDump> {
    let mut entities_by_id: BTreeMap<i64, EntityDump> = BTreeMap::new();
    let mut order: Vec<i64> = Vec::new();

    let mut stmt =
        conn.prepare("SELECT id, name, entity_type FROM entities ORDER BY name")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;
    for row in rows {
        let (id, name, entity_type) = row?;
        order.push(id);
        entities_by_id.insert(
            id,
            EntityDump {
                name,
                entity_type,
                observations: Vec::new(),
            },
        );
    }

    let mut stmt = conn.prepare(
        "SELECT entity_id, content FROM observations ORDER BY entity_id, created_at, id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (entity_id, content) = row?;
        if let Some(entity) = entities_by_id.get_mut(&entity_id) {
            entity.observations.push(content);
        }
    }

    let mut stmt = conn.prepare(
        "SELECT ef.name, et.name, r.relation_type FROM relations r \
         JOIN entities ef ON ef.id = r.from_entity \
         JOIN entities et ON et.id = r.to_entity \
         ORDER BY ef.name, et.name, r.relation_type",
    )?;
    let relations = stmt
        .query_map([], |row| {
            Ok(RelationDump {
                from_entity: row.get(0)?,
                to_entity: row.get(1)?,
                relation_type: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let entities = order
        .into_iter()
        .filter_map(|id| entities_by_id.remove(&id))
        .collect();

    Ok(GraphDump {
        entities,
        relations,
    })
}

/// Store-wide counts.
pub fn get_stats(conn: &Connection) -> Result<GraphStats> {
    let row = conn.query_row(
        "SELECT \
            (SELECT COUNT(*) FROM entities), \
            (SELECT COUNT(*) FROM relations), \
            (SELECT COUNT(*) FROM observations), \
            (SELECT COUNT(DISTINCT entity_type) FROM entities), \
            (SELECT COUNT(DISTINCT relation_type) FROM relations), \
            (SELECT COUNT(*) FROM embeddings)",
        [],
        |row| {
            Ok(GraphStats {
                entity_count: row.get::<_, i64>(0)? as u64,
                relation_count: row.get::<_, i64>(1)? as u64,
                observation_count: row.get::<_, i64>(2)? as u64,
                entity_types: row.get::<_, i64>(3)? as u64,
                relation_types: row.get::<_, i64>(4)? as u64,
                embedding_count: row.get::<_, i64>(5)? as u64,
            })
        },
    )?;
    Ok(row)
}

/// The text an entity's embedding is computed from: its name joined with
/// its observations, in creation order.
pub fn entity_source_text(conn: &Connection, entity_id: i64) -> Result<String> {
    let name: String = conn.query_row(
        "SELECT name FROM entities WHERE id = ?1",
        params![entity_id],
        |row| row.get(0),
    )?;
    let mut stmt = conn.prepare(
        "SELECT content FROM observations WHERE entity_id = ?1 ORDER BY created_at, id",
    )?;
    let mut parts = vec![name];
    let rows = stmt.query_map(params![entity_id], |row| row.get::<_, String>(0))?;
    for row in rows {
        parts.push(row?);
    }
    Ok(parts.join("\n"))
}

/// All entity ids, ordered.
pub fn all_entity_ids(conn: &Connection) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT id FROM entities ORDER BY id")?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn test_db() -> Connection {
        db::open_memory_database().unwrap()
    }

    #[test]
    fn create_and_read_entity() {
        let conn = test_db();
        create_entity(&conn, "Ada", "person").unwrap();
        add_observation(&conn, "Ada", "wrote first program").unwrap();

        let dump = read_graph(&conn).unwrap();
        assert_eq!(dump.entities.len(), 1);
        assert_eq!(dump.entities[0].name, "Ada");
        assert_eq!(dump.entities[0].entity_type, "person");
        assert_eq!(dump.entities[0].observations, vec!["wrote first program"]);
        assert!(dump.relations.is_empty());
    }

    #[test]
    fn duplicate_entity_name_fails() {
        let conn = test_db();
        create_entity(&conn, "Ada", "person").unwrap();
        let err = create_entity(&conn, "Ada", "person").unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(n) if n == "Ada"));
    }

    #[test]
    fn empty_name_or_type_rejected() {
        let conn = test_db();
        assert!(matches!(
            create_entity(&conn, "", "t"),
            Err(StoreError::EmptyField(f)) if f == "name"
        ));
        assert!(matches!(
            create_entity(&conn, "x", ""),
            Err(StoreError::EmptyField(f)) if f == "entity_type"
        ));
    }

    #[test]
    fn observation_requires_entity_and_content() {
        let conn = test_db();
        assert!(matches!(
            add_observation(&conn, "ghost", "o"),
            Err(StoreError::NotFound(n)) if n == "ghost"
        ));

        create_entity(&conn, "X", "t").unwrap();
        assert!(matches!(
            add_observation(&conn, "X", ""),
            Err(StoreError::EmptyField(f)) if f == "content"
        ));
    }

    #[test]
    fn observations_keep_insertion_order() {
        let conn = test_db();
        create_entity(&conn, "X", "t").unwrap();
        for i in 0..5 {
            add_observation(&conn, "X", &format!("obs {i}")).unwrap();
        }
        let dump = read_graph(&conn).unwrap();
        let expected: Vec<String> = (0..5).map(|i| format!("obs {i}")).collect();
        assert_eq!(dump.entities[0].observations, expected);
    }

    #[test]
    fn relation_dedup_on_triple() {
        let conn = test_db();
        create_entity(&conn, "a", "t").unwrap();
        create_entity(&conn, "b", "t").unwrap();

        let (id1, created1) = create_relation(&conn, "a", "b", "knows").unwrap();
        assert!(created1);
        let (id2, created2) = create_relation(&conn, "a", "b", "knows").unwrap();
        assert!(!created2);
        assert_eq!(id1, id2);

        let stats = get_stats(&conn).unwrap();
        assert_eq!(stats.relation_count, 1);

        // A different type is a different relation
        let (_, created3) = create_relation(&conn, "a", "b", "likes").unwrap();
        assert!(created3);
    }

    #[test]
    fn relation_requires_both_endpoints() {
        let conn = test_db();
        create_entity(&conn, "a", "t").unwrap();
        assert!(matches!(
            create_relation(&conn, "a", "missing", "knows"),
            Err(StoreError::NotFound(n)) if n == "missing"
        ));
        assert!(matches!(
            create_relation(&conn, "missing", "a", "knows"),
            Err(StoreError::NotFound(n)) if n == "missing"
        ));
    }

    #[test]
    fn self_loops_are_permitted() {
        let conn = test_db();
        create_entity(&conn, "a", "t").unwrap();
        let (_, created) = create_relation(&conn, "a", "a", "references").unwrap();
        assert!(created);
    }

    #[test]
    fn delete_entity_cascades_everywhere() {
        let conn = test_db();
        create_entity(&conn, "a", "t").unwrap();
        create_entity(&conn, "b", "t").unwrap();
        add_observation(&conn, "a", "about alpha").unwrap();
        create_relation(&conn, "a", "b", "knows").unwrap();
        create_relation(&conn, "b", "a", "knows").unwrap();
        let a_id = entity_id_by_name(&conn, "a").unwrap().unwrap();
        crate::vector::put(&conn, a_id, "test-model", &[1.0, 0.0]).unwrap();

        assert!(delete_entity(&conn, "a").unwrap());

        let dump = read_graph(&conn).unwrap();
        assert_eq!(dump.entities.len(), 1);
        assert_eq!(dump.entities[0].name, "b");
        assert!(dump.relations.is_empty());

        let stats = get_stats(&conn).unwrap();
        assert_eq!(stats.observation_count, 0);
        assert_eq!(stats.embedding_count, 0);

        // FTS rows are gone too
        let hits: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM observations_fts WHERE observations_fts MATCH 'alpha'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(hits, 0);
    }

    #[test]
    fn delete_entity_is_idempotent() {
        let conn = test_db();
        create_entity(&conn, "a", "t").unwrap();
        assert!(delete_entity(&conn, "a").unwrap());
        assert!(!delete_entity(&conn, "a").unwrap());
        assert!(!delete_entity(&conn, "never-existed").unwrap());
    }

    #[test]
    fn delete_relation_is_idempotent() {
        let conn = test_db();
        create_entity(&conn, "a", "t").unwrap();
        create_entity(&conn, "b", "t").unwrap();
        create_relation(&conn, "a", "b", "knows").unwrap();

        assert!(delete_relation(&conn, "a", "b", "knows").unwrap());
        assert!(!delete_relation(&conn, "a", "b", "knows").unwrap());
        assert!(!delete_relation(&conn, "a", "ghost", "knows").unwrap());
    }

    #[test]
    fn stats_count_distinct_types() {
        let conn = test_db();
        create_entity(&conn, "a", "person").unwrap();
        create_entity(&conn, "b", "person").unwrap();
        create_entity(&conn, "c", "project").unwrap();
        add_observation(&conn, "a", "o1").unwrap();
        create_relation(&conn, "a", "b", "knows").unwrap();
        create_relation(&conn, "a", "c", "works_on").unwrap();

        let stats = get_stats(&conn).unwrap();
        assert_eq!(stats.entity_count, 3);
        assert_eq!(stats.relation_count, 2);
        assert_eq!(stats.observation_count, 1);
        assert_eq!(stats.entity_types, 2);
        assert_eq!(stats.relation_types, 2);
    }

    #[test]
    fn source_text_joins_name_and_observations() {
        let conn = test_db();
        let id = create_entity(&conn, "Ada", "person").unwrap();
        add_observation(&conn, "Ada", "first").unwrap();
        add_observation(&conn, "Ada", "second").unwrap();

        let text = entity_source_text(&conn, id).unwrap();
        assert_eq!(text, "Ada\nfirst\nsecond");
    }
}
