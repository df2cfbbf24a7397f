//! MCP `search_nodes` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `search_nodes` MCP tool (keyword search).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchNodesParams {
    /// Search query. Tokens are combined with OR semantics.
    #[schemars(
        description = "Search query. Whitespace tokens are combined with OR semantics, so multi-word queries match documents containing any token."
    )]
    pub query: String,

    /// Maximum results to return. Defaults from server config.
    #[schemars(description = "Maximum results to return")]
    pub k: Option<usize>,
}
