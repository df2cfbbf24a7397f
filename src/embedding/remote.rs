//! Remote embedding provider for OpenAI-style `/v1/embeddings` APIs.
//!
//! Each call issues one HTTP request for the whole batch. Retry policy is
//! the caller's concern; errors surface with the remote status and message.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

/// Provider backed by a remote embeddings API.
///
/// Calls block on network IO; they are always dispatched from
/// `spawn_blocking`, never on the async reactor.
pub struct RemoteEmbeddingProvider {
    model_name: String,
    api_url: String,
    api_key: String,
    dimensions: usize,
    client: reqwest::blocking::Client,
}

impl RemoteEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .context("remote embedding provider requires an api_key")?;
        anyhow::ensure!(!config.model.is_empty(), "remote provider requires a model name");
        anyhow::ensure!(config.dimensions > 0, "remote provider dimensions must be positive");

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            model_name: config.model.clone(),
            api_url: config.api_url.clone(),
            api_key,
            dimensions: config.dimensions,
            client,
        })
    }
}

impl EmbeddingProvider for RemoteEmbeddingProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text])?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("remote API returned no embeddings"))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let request = EmbeddingRequest {
            model: &self.model_name,
            input: texts,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .with_context(|| format!("embedding request to {} failed", self.api_url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            anyhow::bail!("embedding API returned {status}: {body}");
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .context("failed to parse embedding API response")?;

        anyhow::ensure!(
            parsed.data.len() == texts.len(),
            "embedding API returned {} vectors for {} inputs",
            parsed.data.len(),
            texts.len()
        );

        // The API may reorder; index restores input order.
        parsed.data.sort_by_key(|d| d.index);
        for datum in &parsed.data {
            anyhow::ensure!(
                datum.embedding.len() == self.dimensions,
                "embedding API returned {} dimensions, expected {}. \
                 Adjust the configured dimensions for model {}.",
                datum.embedding.len(),
                self.dimensions,
                self.model_name
            );
        }

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}
