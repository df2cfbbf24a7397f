//! Keyword, semantic, and hybrid ranking.
//!
//! Lexical search runs the query against both FTS streams (entity names and
//! types, observation content) with OR semantics across whitespace tokens.
//! An AND default returns nothing for natural multi-word queries, and callers
//! respond by creating duplicate entities; OR keeps recall high and BM25
//! keeps precision acceptable.
//!
//! The BM25 auxiliary function requires the real FTS table name and breaks
//! under an outer join, so matches are collected from the FTS tables directly
//! and joined to their owning rows afterwards.

use rusqlite::{params, Connection};
use std::collections::{HashMap, HashSet};

use crate::graph::store::{Result, StoreError};
use crate::graph::types::{ComponentScores, SearchEntity};

/// Weight applied to a name/type match relative to an observation match.
/// Keeps an exact-name hit ranked above entities that only mention the term.
const NAME_WEIGHT: f64 = 2.0;

/// Per-entity lexical evidence accumulated across both FTS streams.
#[derive(Default)]
struct LexicalEvidence {
    name_score: f64,
    observation_score: f64,
    matched_observations: HashSet<i64>,
}

/// Quote each whitespace token and join with OR. Returns `None` for a query
/// with no usable tokens.
fn build_fts_query(query: &str) -> Option<String> {
    let tokens: Vec<String> = query
        .split_whitespace()
        .map(|word| format!("\"{}\"", word.replace('"', "")))
        .filter(|w| w != "\"\"")
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" OR "))
    }
}

/// BM25 from FTS5 is negative with better matches more negative; negating
/// gives a positive relevance where bigger is better.
fn relevance(raw_bm25: f64) -> f64 {
    -raw_bm25
}

/// Keyword search over entity names/types and observation content.
///
/// Results are deduplicated by entity and scored
/// `2 x best name match + sum of observation matches`, with each entity's
/// observations reordered matches-first.
pub fn search_lexical(conn: &Connection, query: &str, k: usize) -> Result<Vec<SearchEntity>> {
    let fts_query = match build_fts_query(query) {
        Some(q) => q,
        None => return Ok(Vec::new()),
    };

    let mut evidence: HashMap<i64, LexicalEvidence> = HashMap::new();

    let mut stmt = conn.prepare(
        "SELECT rowid, bm25(entities_fts) FROM entities_fts WHERE entities_fts MATCH ?1",
    )?;
    let rows = stmt.query_map(params![fts_query], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?))
    })?;
    for row in rows {
        let (entity_id, raw) = row?;
        let entry = evidence.entry(entity_id).or_default();
        let score = relevance(raw);
        if score > entry.name_score {
            entry.name_score = score;
        }
    }

    let mut stmt = conn.prepare(
        "SELECT rowid, bm25(observations_fts) FROM observations_fts \
         WHERE observations_fts MATCH ?1",
    )?;
    let obs_hits: Vec<(i64, f64)> = stmt
        .query_map(params![fts_query], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    if !obs_hits.is_empty() {
        let mut owner_stmt =
            conn.prepare("SELECT entity_id FROM observations WHERE id = ?1")?;
        for (obs_id, raw) in obs_hits {
            // An FTS row can outlive its observation only through a bug in
            // the delete path; skip rather than surface ghosts.
            let entity_id: Option<i64> = owner_stmt
                .query_row(params![obs_id], |row| row.get(0))
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })?;
            if let Some(entity_id) = entity_id {
                let entry = evidence.entry(entity_id).or_default();
                entry.observation_score += relevance(raw);
                entry.matched_observations.insert(obs_id);
            }
        }
    }

    let mut results = Vec::with_capacity(evidence.len());
    for (entity_id, ev) in evidence {
        let hit = hydrate_hit(conn, entity_id, &ev)?;
        results.push(hit);
    }

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
    results.truncate(k);
    Ok(results)
}

/// Build the result record for one matched entity: payload plus observations
/// reordered matches-first, creation order preserved within each group.
fn hydrate_hit(conn: &Connection, entity_id: i64, ev: &LexicalEvidence) -> Result<SearchEntity> {
    let (name, entity_type): (String, String) = conn.query_row(
        "SELECT name, entity_type FROM entities WHERE id = ?1",
        params![entity_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let mut stmt = conn.prepare(
        "SELECT id, content FROM observations WHERE entity_id = ?1 ORDER BY created_at, id",
    )?;
    let all: Vec<(i64, String)> = stmt
        .query_map(params![entity_id], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut observations = Vec::with_capacity(all.len());
    for (id, content) in &all {
        if ev.matched_observations.contains(id) {
            observations.push(content.clone());
        }
    }
    for (id, content) in &all {
        if !ev.matched_observations.contains(id) {
            observations.push(content.clone());
        }
    }

    Ok(SearchEntity {
        name,
        entity_type,
        observations,
        observation_matches: ev.matched_observations.len(),
        score: NAME_WEIGHT * ev.name_score + ev.observation_score,
        component_scores: None,
    })
}

/// Hydrate vector-store hits into full search records, preserving hit order.
pub fn hydrate_semantic_hits(
    conn: &Connection,
    hits: &[(i64, f64)],
) -> Result<Vec<SearchEntity>> {
    let mut results = Vec::with_capacity(hits.len());
    for &(entity_id, similarity) in hits {
        let row: Option<(String, String)> = match conn.query_row(
            "SELECT name, entity_type FROM entities WHERE id = ?1",
            params![entity_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        ) {
            Ok(r) => Some(r),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(StoreError::Sqlite(e)),
        };
        let (name, entity_type) = match row {
            Some(r) => r,
            None => continue,
        };

        let mut stmt = conn.prepare(
            "SELECT content FROM observations WHERE entity_id = ?1 ORDER BY created_at, id",
        )?;
        let observations = stmt
            .query_map(params![entity_id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        results.push(SearchEntity {
            name,
            entity_type,
            observations,
            observation_matches: 0,
            score: similarity,
            component_scores: None,
        });
    }
    Ok(results)
}

/// Fuse lexical and semantic result sets into a single top-k ranking.
///
/// Each side's scores are normalized to [0, 1] by dividing by the side's max
/// (skipped when the max is not positive), then combined as
/// `weight x semantic + (1 - weight) x lexical`. An entity absent from one
/// side contributes 0 for that side; no penalty is applied.
pub fn fuse_hybrid(
    lexical: Vec<SearchEntity>,
    semantic: Vec<SearchEntity>,
    k: usize,
    vector_weight: f64,
) -> Vec<SearchEntity> {
    let max_lex = lexical.iter().map(|e| e.score).fold(0.0_f64, f64::max);
    let max_sem = semantic.iter().map(|e| e.score).fold(0.0_f64, f64::max);

    struct Fused {
        entity: SearchEntity,
        lexical: f64,
        semantic: f64,
    }
    let mut by_name: HashMap<String, Fused> = HashMap::new();

    for entity in lexical {
        let norm = if max_lex > 0.0 { entity.score / max_lex } else { 0.0 };
        by_name.insert(
            entity.name.clone(),
            Fused {
                entity,
                lexical: norm,
                semantic: 0.0,
            },
        );
    }
    for entity in semantic {
        let norm = if max_sem > 0.0 { entity.score / max_sem } else { 0.0 };
        match by_name.get_mut(&entity.name) {
            Some(fused) => fused.semantic = norm,
            None => {
                by_name.insert(
                    entity.name.clone(),
                    Fused {
                        entity,
                        lexical: 0.0,
                        semantic: norm,
                    },
                );
            }
        }
    }

    let mut results: Vec<SearchEntity> = by_name
        .into_values()
        .map(|fused| {
            let mut entity = fused.entity;
            entity.score = vector_weight * fused.semantic + (1.0 - vector_weight) * fused.lexical;
            entity.component_scores = Some(ComponentScores {
                lexical: fused.lexical,
                semantic: fused.semantic,
            });
            entity
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
    results.truncate(k);
    results
}
