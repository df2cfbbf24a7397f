//! MCP `delete_entities` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `delete_entities` MCP tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeleteEntitiesParams {
    /// Entity names to delete. Missing names are counted as already gone.
    #[schemars(
        description = "Entity names to delete. Deletion cascades to observations, relations, and embeddings. Idempotent: missing names are not errors."
    )]
    pub names: Vec<String>,
}
