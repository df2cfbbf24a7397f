//! MCP `add_observations` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `add_observations` MCP tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AddObservationsParams {
    /// Entity to append to.
    #[schemars(description = "Name of the entity to append observations to")]
    pub entity_name: String,

    /// Observation statements, appended in order.
    #[schemars(description = "Observation statements, appended in the given order")]
    pub observations: Vec<String>,

    /// Must include `entity_name`; every listed name must resolve.
    #[schemars(
        description = "Declaration of entity names this call depends on. Must include entity_name; every name must resolve to an existing entity."
    )]
    pub external_refs: Vec<String>,
}
