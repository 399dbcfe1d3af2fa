//! Embedding providers used by the similarity metric.
//!
//! - `LocalEmbedder`: hashed term-frequency vectors, no network access.
//! - `OpenAiEmbedder`: OpenAI `/v1/embeddings` API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::RetryConfig;
use crate::error::JudgeError;
use crate::retry::with_retry;

pub const DEFAULT_OPENAI_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const LOCAL_EMBEDDING_MODEL: &str = "local-hash";
const DEFAULT_LOCAL_DIMENSIONS: usize = 256;

/// Trait for embedding providers.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, JudgeError>;

    /// Return the provider name.
    fn provider_name(&self) -> &str;

    /// Model that produces the vectors, recorded on similarity results.
    fn model_name(&self) -> &str;
}

/// Configuration for embedding providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider name: "openai" (default) or "local".
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Provider-specific model name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Vector size for the local provider.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

fn default_provider() -> String {
    "openai".into()
}

fn default_dimensions() -> usize {
    DEFAULT_LOCAL_DIMENSIONS
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dimensions: default_dimensions(),
            api_key_env: default_api_key_env(),
            base_url: None,
        }
    }
}

impl EmbeddingConfig {
    /// Model name this configuration asks for. The embedder actually built
    /// by [`create_embedder`] may differ when it falls back to local.
    pub fn model_name(&self) -> &str {
        match (&self.model, self.provider.as_str()) {
            (Some(model), _) => model,
            (None, "local") => LOCAL_EMBEDDING_MODEL,
            (None, _) => DEFAULT_OPENAI_EMBEDDING_MODEL,
        }
    }

    pub fn local() -> Self {
        Self {
            provider: "local".into(),
            ..Default::default()
        }
    }
}

/// Local hashed term-frequency embedder.
#[derive(Debug, Clone)]
pub struct LocalEmbedder {
    dimensions: usize,
}

impl LocalEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        let lowered = text.to_lowercase();
        let mut tf: HashMap<&str, usize> = HashMap::new();
        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            *tf.entry(word).or_insert(0) += 1;
        }

        for (term, count) in &tf {
            vector[djb2(term) % self.dimensions] += *count as f32;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

fn djb2(s: &str) -> usize {
    let mut hash: usize = 5381;
    for b in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(b as usize);
    }
    hash
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, JudgeError> {
        Ok(self.embed_sync(text))
    }

    fn provider_name(&self) -> &str {
        "local"
    }

    fn model_name(&self) -> &str {
        LOCAL_EMBEDDING_MODEL
    }
}

/// OpenAI embedding API client.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    retry: RetryConfig,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_OPENAI_EMBEDDING_MODEL.into()),
            base_url: base_url
                .unwrap_or_else(|| "https://api.openai.com".into())
                .trim_end_matches('/')
                .to_string(),
            retry,
        }
    }

    async fn embed_once(&self, text: &str) -> Result<Vec<f32>, JudgeError> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| JudgeError::Connection {
                message: format!("Embedding request failed: {e}"),
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(JudgeError::RateLimited {
                retry_after_secs: 5,
            });
        }
        if status.as_u16() == 401 {
            return Err(JudgeError::AuthFailed {
                provider: "openai".into(),
            });
        }
        if !status.is_success() {
            return Err(JudgeError::ApiRequest {
                message: format!("Embedding API returned HTTP {status}"),
            });
        }

        let json: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| JudgeError::ResponseParse {
                    message: format!("Invalid embedding response: {e}"),
                })?;
        parse_embedding(&json)
    }
}

fn parse_embedding(json: &serde_json::Value) -> Result<Vec<f32>, JudgeError> {
    json["data"][0]["embedding"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_f64().map(|f| f as f32))
                .collect::<Vec<f32>>()
        })
        .filter(|v| !v.is_empty())
        .ok_or_else(|| JudgeError::ResponseParse {
            message: "response has no data[0].embedding".into(),
        })
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, JudgeError> {
        with_retry(&self.retry, || self.embed_once(text)).await
    }

    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Cosine similarity of two vectors. Zero when either vector has zero norm
/// or the lengths differ.
pub fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut na = 0.0f64;
    let mut nb = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

/// Create an embedder based on configuration. Falls back to the local
/// embedder when the OpenAI key is not available.
pub fn create_embedder(config: &EmbeddingConfig, retry: &RetryConfig) -> Arc<dyn Embedder> {
    match config.provider.as_str() {
        "openai" => match std::env::var(&config.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Arc::new(OpenAiEmbedder::new(
                key,
                config.model.clone(),
                config.base_url.clone(),
                retry.clone(),
            )),
            _ => {
                tracing::warn!(
                    var = %config.api_key_env,
                    "Embedding API key not set, falling back to local embedder"
                );
                Arc::new(LocalEmbedder::new(config.dimensions))
            }
        },
        "local" => Arc::new(LocalEmbedder::new(config.dimensions)),
        other => {
            tracing::warn!(provider = other, "Unknown embedding provider, using local");
            Arc::new(LocalEmbedder::new(config.dimensions))
        }
    }
}
