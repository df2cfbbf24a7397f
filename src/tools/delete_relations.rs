//! MCP `delete_relations` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::create_relations::RelationSpec;

/// Parameters for the `delete_relations` MCP tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeleteRelationsParams {
    /// Relation triples to delete. Missing triples are not errors.
    #[schemars(description = "Relation triples to delete. Idempotent: missing triples are not errors.")]
    pub relations: Vec<RelationSpec>,
}
