//! Embedding provider implementations.
//!
//! [`EmbeddingProvider`] is the narrow seam between the indexing pipeline
//! and whatever actually produces vectors. The production implementation is
//! [`RemoteEmbeddingProvider`], a thin HTTP client; retry, caching, and
//! degradation policy all live one level up in
//! [`EmbeddingClient`](crate::client::EmbeddingClient) so they can be
//! exercised against [`MockEmbeddingProvider`] in tests.

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A service that turns batches of text into dense vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts, returning one vector per input in the same
    /// order. A single attempt; retries are the caller's concern.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Dimensionality of the vectors this provider produces.
    fn dimension(&self) -> usize;

    /// Human-readable identifier for logs.
    fn provider_name(&self) -> &str;
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// HTTP embedding provider.
///
/// Speaks the generic contract: `POST endpoint` with
/// `{ "model": ..., "input": [texts] }` and an optional bearer credential,
/// expecting `{ "embeddings": [[f32]] }` back with one vector per input.
pub struct RemoteEmbeddingProvider {
    client: reqwest::Client,
    config: EmbedConfig,
}

impl std::fmt::Debug for RemoteEmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteEmbeddingProvider")
            .field("endpoint", &self.config.endpoint)
            .field("model", &self.config.model)
            .field("dimension", &self.config.dimension)
            .finish()
    }
}

impl RemoteEmbeddingProvider {
    pub fn new(config: EmbedConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &EmbedConfig {
        &self.config
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self.client.post(&self.config.endpoint).json(&EmbedRequest {
            model: &self.config.model,
            input: texts,
        });
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EmbedError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let body: EmbedResponse = response.json().await?;
        if body.embeddings.len() != texts.len() {
            return Err(EmbedError::malformed(format!(
                "expected {} vectors, got {}",
                texts.len(),
                body.embeddings.len()
            )));
        }
        for vector in &body.embeddings {
            if vector.len() != self.config.dimension {
                return Err(EmbedError::malformed(format!(
                    "expected dimension {}, got {}",
                    self.config.dimension,
                    vector.len()
                )));
            }
        }
        Ok(body.embeddings)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn provider_name(&self) -> &str {
        "remote-http"
    }
}

/// Deterministic in-process provider for tests.
///
/// Vectors are derived from a blake3 digest of the text, so identical texts
/// always embed identically. Failures can be scripted: the next
/// `fail_next(n)` calls return a transient provider error, which lets tests
/// drive the retry and degradation paths without a network.
pub struct MockEmbeddingProvider {
    dimension: usize,
    calls: AtomicUsize,
    failures_remaining: Mutex<u32>,
}

impl MockEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
            failures_remaining: Mutex::new(0),
        }
    }

    /// Script the next `count` calls to fail with a transient error.
    pub fn fail_next(&self, count: u32) {
        *self.failures_remaining.lock().unwrap() = count;
    }

    /// Number of `embed_batch` calls made so far, including failed ones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let digest = blake3::hash(text.as_bytes());
        let bytes = digest.as_bytes();
        (0..self.dimension)
            .map(|i| (bytes[i % bytes.len()] as f32 / 255.0) - 0.5)
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures = self.failures_remaining.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(EmbedError::Provider {
                    status: 503,
                    message: "scripted failure".to_string(),
                });
            }
        }
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_provider_is_deterministic() {
        let provider = MockEmbeddingProvider::new(8);
        let texts = vec!["fn main() {}".to_string()];
        let a = provider.embed_batch(&texts).await.unwrap();
        let b = provider.embed_batch(&texts).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), 8);
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn scripted_failures_are_transient() {
        let provider = MockEmbeddingProvider::new(4);
        provider.fail_next(1);
        let err = provider
            .embed_batch(&["x".to_string()])
            .await
            .expect_err("first call should fail");
        assert!(err.is_transient());
        assert!(provider.embed_batch(&["x".to_string()]).await.is_ok());
    }
}
