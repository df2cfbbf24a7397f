//! MCP `generate_embeddings` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `generate_embeddings` MCP tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GenerateEmbeddingsParams {
    /// Entities to embed. Defaults to every entity missing an embedding
    /// under the current model.
    #[schemars(
        description = "Entity names to embed. Omit to embed every entity missing an embedding under the current model."
    )]
    pub names: Option<Vec<String>>,

    /// Regenerate even when an embedding already exists.
    #[schemars(description = "Regenerate even when an embedding for the current model already exists")]
    pub force: Option<bool>,

    /// Texts per provider batch call. Defaults from server config.
    #[schemars(description = "Texts per provider batch call")]
    pub batch_size: Option<usize>,
}
