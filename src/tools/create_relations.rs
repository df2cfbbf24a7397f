//! MCP `create_relations` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One directed edge between two named entities.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RelationSpec {
    /// Source entity name.
    #[schemars(description = "Source entity name")]
    pub from: String,

    /// Target entity name.
    #[schemars(description = "Target entity name")]
    pub to: String,

    /// Edge label, e.g. `"works_on"`, `"depends_on"`.
    #[schemars(description = "Edge label, e.g. 'works_on', 'depends_on'")]
    pub relation_type: String,
}

/// Parameters for the `create_relations` MCP tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreateRelationsParams {
    /// Relations to create. Duplicate triples are no-ops.
    #[schemars(description = "Relations to create. A triple that already exists is a no-op, not an error.")]
    pub relations: Vec<RelationSpec>,

    /// Every entity name this batch depends on. All names must resolve to
    /// existing entities or the whole call fails with MissingEntities.
    #[schemars(
        description = "Declaration of every entity name used by this batch. All must resolve to existing entities, or the whole call fails with MissingEntities and nothing is written. This tool never creates entities; use create_subgraph for that."
    )]
    pub external_refs: Vec<String>,
}
