//! MCP `create_subgraph` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::create_entities::EntitySpec;
use super::create_relations::RelationSpec;

/// Observations to append to an entity that already exists.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExistingObservations {
    /// Name of the pre-existing entity.
    #[schemars(description = "Name of the pre-existing entity")]
    pub entity_name: String,

    /// Observation statements, appended in order.
    #[schemars(description = "Observation statements, appended in the given order")]
    pub observations: Vec<String>,
}

/// Parameters for the `create_subgraph` MCP tool.
///
/// The one primitive that combines entity creation with relation creation,
/// atomically: entities first, then relations (endpoints may be new or
/// pre-existing), then observations on pre-existing entities. Any failure
/// rolls back the whole call.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreateSubgraphParams {
    /// Entities to create. A name collision fails the whole call.
    #[serde(default)]
    #[schemars(description = "Entities to create. A name that already exists fails and rolls back the whole call.")]
    pub entities: Vec<EntitySpec>,

    /// Relations to create; endpoints may be newly created or pre-existing.
    #[serde(default)]
    #[schemars(description = "Relations to create. Endpoints may be entities created by this call or pre-existing ones.")]
    pub relations: Vec<RelationSpec>,

    /// Observations to append to pre-existing entities.
    #[serde(default)]
    #[schemars(description = "Observations to append to entities that existed before this call")]
    pub observations_for_existing: Vec<ExistingObservations>,
}
