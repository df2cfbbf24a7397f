//! MCP `search_hybrid` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `search_hybrid` MCP tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchHybridParams {
    /// Search query, used for both the keyword and the semantic side.
    #[schemars(description = "Search query, used for both the keyword and the semantic side")]
    pub query: String,

    /// Maximum results to return. Defaults from server config.
    #[schemars(description = "Maximum results to return")]
    pub k: Option<usize>,

    /// Semantic weight in [0, 1]; the keyword side gets the complement.
    #[schemars(
        description = "Semantic weight between 0 and 1; the keyword side gets the complement. Defaults from server config (0.7)."
    )]
    pub vector_weight: Option<f64>,
}
