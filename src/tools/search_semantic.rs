//! MCP `search_entities_semantic` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `search_entities_semantic` MCP tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchSemanticParams {
    /// Natural-language query, embedded with the current provider.
    #[schemars(description = "Natural-language query, embedded with the current provider")]
    pub query: String,

    /// Maximum results to return. Defaults from server config.
    #[schemars(description = "Maximum results to return")]
    pub k: Option<usize>,

    /// Minimum cosine similarity to keep, in [-1, 1].
    #[schemars(description = "Minimum cosine similarity to keep, between -1 and 1")]
    pub threshold: Option<f64>,
}
