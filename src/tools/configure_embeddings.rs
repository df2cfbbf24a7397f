//! MCP `configure_embeddings` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `configure_embeddings` MCP tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConfigureEmbeddingsParams {
    /// `"local"` (in-process ONNX) or `"remote"` (OpenAI-style API).
    #[schemars(description = "Provider kind: 'local' (in-process ONNX) or 'remote' (OpenAI-style API)")]
    pub provider: String,

    /// Model identifier, e.g. `"all-MiniLM-L6-v2"` or `"text-embedding-3-small"`.
    #[schemars(description = "Model identifier, e.g. 'all-MiniLM-L6-v2' or 'text-embedding-3-small'")]
    pub model: String,

    /// API key for the remote provider.
    #[schemars(description = "API key, required for the remote provider")]
    pub api_key: Option<String>,
}
