//! Per-(entity, model) embedding rows and cosine k-NN retrieval.
//!
//! Vectors are stored as little-endian f32 blobs in the `embeddings` table
//! and scanned linearly at query time. A linear scan is fine to around 10^4
//! entities; the interface matches an approximate-nearest-neighbor backend
//! so the implementation can be swapped without touching callers.

use rusqlite::{params, Connection, OptionalExtension};

use crate::graph::store::{Result, StoreError};

/// Serialize a vector as little-endian f32 bytes.
pub fn vec_to_bytes(v: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(v.len() * 4);
    for x in v {
        bytes.extend_from_slice(&x.to_le_bytes());
    }
    bytes
}

/// Deserialize little-endian f32 bytes back into a vector.
pub fn bytes_to_vec(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(StoreError::Corrupt(format!(
            "embedding blob length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Cosine similarity in [-1, 1]. Returns 0 when either operand has zero
/// norm or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64) * (*x as f64);
        norm_b += (*y as f64) * (*y as f64);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Upsert the embedding for (entity_id, model_name). Dimensions are derived
/// from the vector length; regeneration replaces the row wholesale.
pub fn put(conn: &Connection, entity_id: i64, model_name: &str, vector: &[f32]) -> Result<()> {
    if vector.is_empty() {
        return Err(StoreError::EmptyField("embedding".into()));
    }
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT OR REPLACE INTO embeddings \
         (entity_id, model_name, dimensions, embedding, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            entity_id,
            model_name,
            vector.len() as i64,
            vec_to_bytes(vector),
            now
        ],
    )?;
    Ok(())
}

/// Upsert a batch of embeddings in one transaction.
pub fn batch_put(
    conn: &mut Connection,
    model_name: &str,
    rows: &[(i64, Vec<f32>)],
) -> Result<()> {
    let tx = conn.transaction()?;
    for (entity_id, vector) in rows {
        put(&tx, *entity_id, model_name, vector)?;
    }
    tx.commit()?;
    Ok(())
}

/// Fetch an entity's embedding. With no model given, returns whichever
/// embedding is found first, for single-model callers.
pub fn get(conn: &Connection, entity_id: i64, model_name: Option<&str>) -> Result<Option<Vec<f32>>> {
    let blob: Option<Vec<u8>> = match model_name {
        Some(model) => conn
            .query_row(
                "SELECT embedding FROM embeddings WHERE entity_id = ?1 AND model_name = ?2",
                params![entity_id, model],
                |row| row.get(0),
            )
            .optional()?,
        None => conn
            .query_row(
                "SELECT embedding FROM embeddings WHERE entity_id = ?1 LIMIT 1",
                params![entity_id],
                |row| row.get(0),
            )
            .optional()?,
    };
    blob.map(|b| bytes_to_vec(&b)).transpose()
}

/// Whether an embedding exists for the entity (under the given model, when
/// specified). Used to skip entities already embedded for the current model.
pub fn exists(conn: &Connection, entity_id: i64, model_name: Option<&str>) -> Result<bool> {
    let count: i64 = match model_name {
        Some(model) => conn.query_row(
            "SELECT COUNT(*) FROM embeddings WHERE entity_id = ?1 AND model_name = ?2",
            params![entity_id, model],
            |row| row.get(0),
        )?,
        None => conn.query_row(
            "SELECT COUNT(*) FROM embeddings WHERE entity_id = ?1",
            params![entity_id],
            |row| row.get(0),
        )?,
    };
    Ok(count > 0)
}

/// Delete embeddings for an entity. With no model given, all models are
/// removed. Returns the number of rows deleted.
pub fn delete(conn: &Connection, entity_id: i64, model_name: Option<&str>) -> Result<usize> {
    let rows = match model_name {
        Some(model) => conn.execute(
            "DELETE FROM embeddings WHERE entity_id = ?1 AND model_name = ?2",
            params![entity_id, model],
        )?,
        None => conn.execute(
            "DELETE FROM embeddings WHERE entity_id = ?1",
            params![entity_id],
        )?,
    };
    Ok(rows)
}

/// Cosine k-NN: full scan filtered by model, keep hits with similarity at or
/// above `threshold`, return the top `k` by descending similarity.
pub fn search(
    conn: &Connection,
    query: &[f32],
    k: usize,
    threshold: f64,
    model_name: Option<&str>,
) -> Result<Vec<(i64, f64)>> {
    let mut hits: Vec<(i64, f64)> = Vec::new();

    let mut scan = |stmt: &mut rusqlite::Statement<'_>,
                    bind: &[&dyn rusqlite::types::ToSql]|
     -> Result<()> {
        let rows = stmt.query_map(bind, |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;
        for row in rows {
            let (entity_id, blob) = row?;
            let vector = bytes_to_vec(&blob)?;
            let similarity = cosine_similarity(query, &vector);
            if similarity >= threshold {
                hits.push((entity_id, similarity));
            }
        }
        Ok(())
    };

    match model_name {
        Some(model) => {
            let mut stmt = conn
                .prepare("SELECT entity_id, embedding FROM embeddings WHERE model_name = ?1")?;
            scan(&mut stmt, &[&model])?;
        }
        None => {
            let mut stmt = conn.prepare("SELECT entity_id, embedding FROM embeddings")?;
            scan(&mut stmt, &[])?;
        }
    }

    hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(k);
    Ok(hits)
}

/// Entity ids with no embedding under the given model.
pub fn entities_missing_embedding(conn: &Connection, model_name: &str) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT e.id FROM entities e \
         WHERE NOT EXISTS (SELECT 1 FROM embeddings m \
                           WHERE m.entity_id = e.id AND m.model_name = ?1) \
         ORDER BY e.id",
    )?;
    let ids = stmt
        .query_map(params![model_name], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::graph::store;

    fn test_db() -> Connection {
        db::open_memory_database().unwrap()
    }

    fn entity(conn: &Connection, name: &str) -> i64 {
        store::create_entity(conn, name, "t").unwrap()
    }

    fn axis(dim: usize, total: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; total];
        v[dim] = 1.0;
        v
    }

    #[test]
    fn bytes_round_trip() {
        let v = vec![0.25f32, -1.5, 3.75, 0.0];
        assert_eq!(bytes_to_vec(&vec_to_bytes(&v)).unwrap(), v);
    }

    #[test]
    fn bad_blob_length_is_corrupt() {
        assert!(matches!(
            bytes_to_vec(&[1, 2, 3]),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn cosine_basics() {
        let a = [1.0f32, 0.0];
        let b = [0.0f32, 1.0];
        let c = [-1.0f32, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&a, &b).abs() < 1e-9);
        assert!((cosine_similarity(&a, &c) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_zero_norm_guard() {
        let zero = [0.0f32, 0.0];
        let a = [1.0f32, 0.0];
        assert_eq!(cosine_similarity(&zero, &a), 0.0);
        assert_eq!(cosine_similarity(&a, &zero), 0.0);
    }

    #[test]
    fn put_get_round_trip() {
        let conn = test_db();
        let id = entity(&conn, "a");
        let v = axis(0, 8);

        put(&conn, id, "model-x", &v).unwrap();
        assert_eq!(get(&conn, id, Some("model-x")).unwrap().unwrap(), v);
        assert_eq!(get(&conn, id, None).unwrap().unwrap(), v);
        assert!(get(&conn, id, Some("other-model")).unwrap().is_none());
    }

    #[test]
    fn put_replaces_per_model() {
        let conn = test_db();
        let id = entity(&conn, "a");

        put(&conn, id, "model-x", &axis(0, 4)).unwrap();
        put(&conn, id, "model-x", &axis(1, 4)).unwrap();
        put(&conn, id, "model-y", &axis(2, 4)).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2, "one row per model, replacement not accumulation");
        assert_eq!(get(&conn, id, Some("model-x")).unwrap().unwrap(), axis(1, 4));
    }

    #[test]
    fn dimensions_column_tracks_vector_length() {
        let conn = test_db();
        let id = entity(&conn, "a");
        put(&conn, id, "model-x", &axis(0, 12)).unwrap();

        let dims: i64 = conn
            .query_row(
                "SELECT dimensions FROM embeddings WHERE entity_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(dims, 12);
    }

    #[test]
    fn exists_is_model_aware() {
        let conn = test_db();
        let id = entity(&conn, "a");
        put(&conn, id, "model-x", &axis(0, 4)).unwrap();

        assert!(exists(&conn, id, Some("model-x")).unwrap());
        assert!(!exists(&conn, id, Some("model-y")).unwrap());
        assert!(exists(&conn, id, None).unwrap());
    }

    #[test]
    fn delete_all_models_when_unspecified() {
        let conn = test_db();
        let id = entity(&conn, "a");
        put(&conn, id, "model-x", &axis(0, 4)).unwrap();
        put(&conn, id, "model-y", &axis(1, 4)).unwrap();

        assert_eq!(delete(&conn, id, Some("model-x")).unwrap(), 1);
        assert!(exists(&conn, id, Some("model-y")).unwrap());
        assert_eq!(delete(&conn, id, None).unwrap(), 1);
        assert!(!exists(&conn, id, None).unwrap());
    }

    #[test]
    fn search_ranks_by_similarity_and_filters_by_model() {
        let conn = test_db();
        let a = entity(&conn, "a");
        let b = entity(&conn, "b");
        let c = entity(&conn, "c");

        put(&conn, a, "model-x", &[1.0, 0.0, 0.0]).unwrap();
        put(&conn, b, "model-x", &[0.8, 0.6, 0.0]).unwrap();
        put(&conn, c, "model-y", &[1.0, 0.0, 0.0]).unwrap();

        let hits = search(&conn, &[1.0, 0.0, 0.0], 10, 0.0, Some("model-x")).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, a);
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
        assert_eq!(hits[1].0, b);
        assert!((hits[1].1 - 0.8).abs() < 1e-6);
    }

    #[test]
    fn search_applies_threshold_and_k() {
        let conn = test_db();
        for i in 0..5 {
            let id = entity(&conn, &format!("e{i}"));
            put(&conn, id, "m", &axis(i, 5)).unwrap();
        }

        let query = axis(0, 5);
        let hits = search(&conn, &query, 10, 0.5, Some("m")).unwrap();
        assert_eq!(hits.len(), 1, "orthogonal vectors fall below threshold");

        let hits = search(&conn, &query, 2, -1.0, Some("m")).unwrap();
        assert_eq!(hits.len(), 2, "k truncates");
    }

    #[test]
    fn batch_put_writes_all_rows() {
        let mut conn = test_db();
        let a = entity(&conn, "a");
        let b = entity(&conn, "b");

        batch_put(
            &mut conn,
            "m",
            &[(a, axis(0, 4)), (b, axis(1, 4))],
        )
        .unwrap();

        assert!(exists(&conn, a, Some("m")).unwrap());
        assert!(exists(&conn, b, Some("m")).unwrap());
    }

    #[test]
    fn missing_embedding_listing() {
        let conn = test_db();
        let a = entity(&conn, "a");
        let b = entity(&conn, "b");
        put(&conn, a, "m", &axis(0, 4)).unwrap();

        assert_eq!(entities_missing_embedding(&conn, "m").unwrap(), vec![b]);
        assert_eq!(
            entities_missing_embedding(&conn, "other").unwrap(),
            vec![a, b]
        );
    }
}
