//! Embedding provider abstraction and implementations.
//!
//! [`EmbeddingState`] mirrors [`crate::completion::CompletionState`]: built
//! once at startup, `Ready` or `Disabled { reason }`, never a null. When
//! embeddings are disabled the document index is unusable and the document
//! path degrades instead of crashing.
//!
//! Also provides the vector utilities for BLOB storage:
//! - [`vec_to_blob`] / [`blob_to_vec`] — little-endian f32 codec for SQLite
//! - [`cosine_similarity`] — similarity between two embedding vectors
//!
//! # Retry Strategy
//!
//! Embedding calls go through the bounded retry policy:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::retry::RetryPolicy;

/// Capability mapping text to fixed-dimension vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query text.
pub async fn embed_query(provider: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    let results = provider.embed_texts(&[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Empty embedding response"))
}

/// Embedding client handle with an explicit disabled state.
#[derive(Clone)]
pub enum EmbeddingState {
    Ready(Arc<dyn EmbeddingProvider>),
    Disabled { reason: String },
}

impl EmbeddingState {
    /// Build the configured provider, retrying transient initialization
    /// failures. Configuration errors (missing API key variable) fail on
    /// the first attempt.
    pub async fn initialize(config: &EmbeddingConfig) -> Self {
        if !config.is_enabled() {
            return Self::Disabled {
                reason: "embedding.provider is 'disabled'".to_string(),
            };
        }
        let policy = RetryPolicy::new(config.max_retries);
        let built = policy
            .run(
                || async { OpenAiEmbedding::new(config) },
                |err: &anyhow::Error| err.downcast_ref::<std::env::VarError>().is_none(),
            )
            .await;
        match built {
            Ok(provider) => Self::Ready(Arc::new(provider)),
            Err(err) => {
                tracing::error!("embedding client initialization failed: {:#}", err);
                Self::Disabled {
                    reason: format!("{:#}", err),
                }
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn ready(&self) -> Option<&Arc<dyn EmbeddingProvider>> {
        match self {
            Self::Ready(provider) => Some(provider),
            Self::Disabled { .. } => None,
        }
    }

    pub fn disabled_reason(&self) -> Option<&str> {
        match self {
            Self::Ready(_) => None,
            Self::Disabled { reason } => Some(reason),
        }
    }
}

enum EmbedCallError {
    Retryable(anyhow::Error),
    Fatal(anyhow::Error),
}

impl EmbedCallError {
    fn into_inner(self) -> anyhow::Error {
        match self {
            Self::Retryable(e) => e,
            Self::Fatal(e) => e,
        }
    }
}

/// Embeddings client for OpenAI-compatible endpoints.
pub struct OpenAiEmbedding {
    model: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl OpenAiEmbedding {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for OpenAI provider"))?;
        let api_key = std::env::var(&config.api_key_env)
            .with_context(|| format!("{} environment variable not set", config.api_key_env))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build embedding HTTP client")?;
        Ok(Self {
            model,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
            policy: RetryPolicy::new(config.max_retries),
        })
    }

    async fn send_once(&self, body: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbedCallError> {
        let resp = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    let json: serde_json::Value = response
                        .json()
                        .await
                        .map_err(|e| EmbedCallError::Fatal(e.into()))?;
                    return parse_embeddings_response(&json).map_err(EmbedCallError::Fatal);
                }
                let body_text = response.text().await.unwrap_or_default();
                let err = anyhow!("embeddings API error {}: {}", status, body_text);
                if status.as_u16() == 429 || status.is_server_error() {
                    Err(EmbedCallError::Retryable(err))
                } else {
                    Err(EmbedCallError::Fatal(err))
                }
            }
            Err(e) => Err(EmbedCallError::Retryable(e.into())),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        self.policy
            .run(
                || self.send_once(&body),
                |err| matches!(err, EmbedCallError::Retryable(_)),
            )
            .await
            .map_err(EmbedCallError::into_inner)
    }
}

/// Extract the `data[].embedding` arrays from an embeddings response.
fn parse_embeddings_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid embeddings response: missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow!("Invalid embeddings response: missing embedding"))?;
        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        embeddings.push(vec);
    }

    Ok(embeddings)
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use talentgate::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity between two vectors, in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
