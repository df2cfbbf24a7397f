pub mod local;
pub mod remote;

use anyhow::Result;
use std::sync::{Arc, RwLock};

use crate::config::EmbeddingConfig;

/// Dimensions of the default local model (all-MiniLM-L6-v2).
pub const LOCAL_EMBEDDING_DIM: usize = 384;

/// Trait for embedding text into vectors.
///
/// Implementations produce vectors of exactly `dimensions()` length. All
/// methods are synchronous; callers in async contexts use
/// `tokio::task::spawn_blocking`.
pub trait EmbeddingProvider: Send + Sync {
    /// Canonical model identifier, used as the `model_name` key in the
    /// vector store.
    fn model_name(&self) -> &str;

    /// Vector width this provider produces.
    fn dimensions(&self) -> usize;

    /// Embed a single text string.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch. Implementations may override for batched inference.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Create a provider from config. `"local"` runs ONNX inference in-process;
/// `"remote"` calls an OpenAI-style embeddings API.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "local" => Ok(Box::new(local::LocalEmbeddingProvider::new(config))),
        "remote" => Ok(Box::new(remote::RemoteEmbeddingProvider::new(config)?)),
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: local, remote"),
    }
}

/// Holds the process-wide current provider.
///
/// The lock is held only to read or swap the `Arc`; embed calls run against
/// a clone, so reconfiguration never blocks behind inference, and in-flight
/// calls complete against the provider they started with.
pub struct EmbeddingRegistry {
    default_config: EmbeddingConfig,
    current: RwLock<Option<Arc<dyn EmbeddingProvider>>>,
}

impl EmbeddingRegistry {
    pub fn new(default_config: EmbeddingConfig) -> Self {
        Self {
            default_config,
            current: RwLock::new(None),
        }
    }

    /// The current provider. First access builds the configured default.
    pub fn current(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        if let Some(provider) = self
            .current
            .read()
            .map_err(|e| anyhow::anyhow!("registry lock poisoned: {e}"))?
            .as_ref()
        {
            return Ok(Arc::clone(provider));
        }

        let mut slot = self
            .current
            .write()
            .map_err(|e| anyhow::anyhow!("registry lock poisoned: {e}"))?;
        // Another task may have initialized while we waited for the lock.
        if let Some(provider) = slot.as_ref() {
            return Ok(Arc::clone(provider));
        }
        let provider: Arc<dyn EmbeddingProvider> =
            Arc::from(create_provider(&self.default_config)?);
        *slot = Some(Arc::clone(&provider));
        Ok(provider)
    }

    /// Replace the current provider atomically.
    pub fn configure(&self, config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
        let provider: Arc<dyn EmbeddingProvider> = Arc::from(create_provider(config)?);
        let mut slot = self
            .current
            .write()
            .map_err(|e| anyhow::anyhow!("registry lock poisoned: {e}"))?;
        *slot = Some(Arc::clone(&provider));
        Ok(provider)
    }

    /// Install a specific provider instance. Used by tests.
    pub fn set(&self, provider: Arc<dyn EmbeddingProvider>) {
        if let Ok(mut slot) = self.current.write() {
            *slot = Some(provider);
        }
    }
}
