//! MCP `create_entities` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One entity to create, with its initial observations.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EntitySpec {
    /// Unique entity name; the external key for all later calls.
    #[schemars(description = "Unique entity name. Case-sensitive; the external key for all later calls.")]
    pub name: String,

    /// Free-form type tag, e.g. `"person"`, `"project"`.
    #[schemars(description = "Free-form type tag, e.g. 'person', 'project', 'decision'")]
    pub entity_type: String,

    /// Observations to attach, in order.
    #[serde(default)]
    #[schemars(description = "Observation statements to attach, stored in the given order")]
    pub observations: Vec<String>,
}

/// Parameters for the `create_entities` MCP tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreateEntitiesParams {
    /// Entities to create. Names that already exist are skipped and reported.
    #[schemars(description = "Entities to create. Existing names are skipped, not updated, and reported in skipped[].")]
    pub entities: Vec<EntitySpec>,
}
