//! Wire-facing record shapes for graph dumps, stats, and search results.

use serde::{Deserialize, Serialize};

/// An entity with its ordered observation list, as returned by `read_graph`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityDump {
    pub name: String,
    pub entity_type: String,
    pub observations: Vec<String>,
}

/// A relation with endpoint names, as returned by `read_graph`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelationDump {
    pub from_entity: String,
    pub to_entity: String,
    pub relation_type: String,
}

/// Full graph dump.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphDump {
    pub entities: Vec<EntityDump>,
    pub relations: Vec<RelationDump>,
}

/// Store-wide counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphStats {
    pub entity_count: u64,
    pub relation_count: u64,
    pub observation_count: u64,
    pub entity_types: u64,
    pub relation_types: u64,
    pub embedding_count: u64,
}

/// Per-side contributions to a hybrid score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ComponentScores {
    pub lexical: f64,
    pub semantic: f64,
}

/// A single ranked search hit.
///
/// Observations are reordered so that matching observations come first,
/// preserving creation order within each group. For entities with long
/// observation lists this ordering is what keeps results readable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchEntity {
    pub name: String,
    pub entity_type: String,
    pub observations: Vec<String>,
    pub observation_matches: usize,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component_scores: Option<ComponentScores>,
}

/// Response from any of the search tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub entities: Vec<SearchEntity>,
    /// Set when the semantic side of a hybrid search was unavailable and
    /// the result degraded to lexical-only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}
