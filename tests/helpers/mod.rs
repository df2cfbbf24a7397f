#![allow(dead_code)]

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::{Arc, Mutex};

use engram::config::EngramConfig;
use engram::db;
use engram::embedding::{EmbeddingProvider, EmbeddingRegistry};
use engram::supervisor::ServerInfo;
use engram::tools::GraphTools;

/// Dimensions used by the deterministic test provider.
pub const MOCK_DIM: usize = 64;

/// Deterministic embedding provider: each whitespace token hashes to a
/// dimension, so texts sharing tokens have positive cosine similarity and
/// unrelated texts are near-orthogonal. Covers the semantic pipeline without
/// model files.
pub struct MockProvider;

impl EmbeddingProvider for MockProvider {
    fn model_name(&self) -> &str {
        "mock-hash-v1"
    }

    fn dimensions(&self) -> usize {
        MOCK_DIM
    }

    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut v = vec![0.0f32; MOCK_DIM];
        for token in text.split_whitespace() {
            let token = token.to_lowercase();
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            v[(hasher.finish() as usize) % MOCK_DIM] += 1.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        Ok(v)
    }
}

/// A provider that always fails, for exercising degraded paths.
pub struct BrokenProvider;

impl EmbeddingProvider for BrokenProvider {
    fn model_name(&self) -> &str {
        "broken-model"
    }

    fn dimensions(&self) -> usize {
        MOCK_DIM
    }

    fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        anyhow::bail!("provider is deliberately broken")
    }
}

/// Tools over a fresh in-memory database with the default (lazy local)
/// embedding registry.
pub fn test_tools() -> GraphTools {
    let conn = db::open_memory_database().unwrap();
    build_tools(conn, None)
}

/// Tools over a fresh in-memory database with a specific provider installed.
pub fn test_tools_with_provider(provider: Arc<dyn EmbeddingProvider>) -> GraphTools {
    let conn = db::open_memory_database().unwrap();
    build_tools(conn, Some(provider))
}

/// Tools with auto_generate enabled, so entity creation embeds immediately.
pub fn test_tools_auto_generate(provider: Arc<dyn EmbeddingProvider>) -> GraphTools {
    let conn = db::open_memory_database().unwrap();
    let mut config = EngramConfig::default();
    config.embedding.auto_generate = true;
    let config = Arc::new(config);
    let registry = Arc::new(EmbeddingRegistry::new(config.embedding.clone()));
    registry.set(provider);
    let info = Arc::new(ServerInfo::new(&config, None));
    GraphTools::new(Arc::new(Mutex::new(conn)), registry, config, info)
}

/// Tools over an on-disk database, for cross-connection visibility tests.
pub fn test_tools_on_disk(path: &Path) -> GraphTools {
    let conn = db::open_database(path).unwrap();
    build_tools(conn, None)
}

fn build_tools(
    conn: rusqlite::Connection,
    provider: Option<Arc<dyn EmbeddingProvider>>,
) -> GraphTools {
    let config = Arc::new(EngramConfig::default());
    let registry = Arc::new(EmbeddingRegistry::new(config.embedding.clone()));
    if let Some(provider) = provider {
        registry.set(provider);
    }
    let info = Arc::new(ServerInfo::new(&config, None));
    GraphTools::new(Arc::new(Mutex::new(conn)), registry, config, info)
}

/// Unwrap a tool result into its JSON payload.
pub fn parse(result: Result<String, String>) -> serde_json::Value {
    let text = result.expect("tool call returned a protocol error");
    serde_json::from_str(&text).expect("tool payload is not valid JSON")
}

/// Assert a payload is a domain error of the given kind and return it.
pub fn expect_error(payload: &serde_json::Value, kind: &str) {
    assert_eq!(
        payload["error"].as_str(),
        Some(kind),
        "expected {kind} error, got: {payload}"
    );
}
