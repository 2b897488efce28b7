//! Cache-aware embedding client with batching, retry, and degradation.
//!
//! The client sits between the indexing pipeline and an
//! [`EmbeddingProvider`]: it resolves as much as possible from the shared
//! [`EmbeddingCache`], batches the misses, retries transient provider
//! failures with exponential backoff, and — once retries are exhausted —
//! degrades gracefully by leaving the affected texts vector-absent instead
//! of failing the whole indexing run.

use crate::cache::{EmbeddingCache, text_fingerprint};
use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use crate::provider::{EmbeddingProvider, RemoteEmbeddingProvider};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Batching and retry knobs for the client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub batch_size: usize,
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            batch_size: 32,
            max_retries: 3,
            backoff_base: Duration::from_millis(200),
        }
    }
}

impl ClientOptions {
    pub fn from_config(config: &EmbedConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            max_retries: config.max_retries,
            ..Self::default()
        }
    }
}

/// Result of an [`EmbeddingClient::embed_batched`] call.
///
/// `vectors[i]` corresponds to the i-th input text; `None` means the
/// provider failed for that text after exhausting retries.
#[derive(Debug)]
pub struct EmbedOutcome {
    pub vectors: Vec<Option<Vec<f32>>>,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub failed_batches: usize,
}

/// Cache-first embedding front end shared by indexing and query paths.
pub struct EmbeddingClient {
    provider: Arc<dyn EmbeddingProvider>,
    cache: Arc<EmbeddingCache>,
    options: ClientOptions,
}

impl std::fmt::Debug for EmbeddingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingClient")
            .field("provider", &self.provider.provider_name())
            .field("options", &self.options)
            .finish()
    }
}

impl EmbeddingClient {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        cache: Arc<EmbeddingCache>,
        options: ClientOptions,
    ) -> Self {
        Self {
            provider,
            cache,
            options,
        }
    }

    /// Build a client backed by the HTTP provider described in `config`.
    pub fn remote(config: EmbedConfig, cache: Arc<EmbeddingCache>) -> Result<Self> {
        let options = ClientOptions::from_config(&config);
        let provider = Arc::new(RemoteEmbeddingProvider::new(config)?);
        Ok(Self::new(provider, cache, options))
    }

    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    /// Embed `texts`, serving repeats and previously seen text from the
    /// cache. Identical texts within one call are deduplicated before the
    /// provider sees them. Provider failures surface as `None` vectors.
    pub async fn embed_batched(&self, texts: &[String]) -> EmbedOutcome {
        let mut vectors: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut cache_hits = 0usize;

        // Resolve cache hits and collect distinct misses in first-seen order.
        let mut miss_keys: Vec<[u8; 32]> = Vec::new();
        let mut miss_texts: Vec<String> = Vec::new();
        let mut miss_slots: Vec<Vec<usize>> = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            let key = text_fingerprint(text);
            if let Some(vector) = self.cache.get(&key) {
                vectors[i] = Some(vector);
                cache_hits += 1;
                continue;
            }
            match miss_keys.iter().position(|k| *k == key) {
                Some(pos) => miss_slots[pos].push(i),
                None => {
                    miss_keys.push(key);
                    miss_texts.push(text.clone());
                    miss_slots.push(vec![i]);
                }
            }
        }
        let cache_misses = texts.len() - cache_hits;

        let mut failed_batches = 0usize;
        let mut cursor = 0usize;
        while cursor < miss_texts.len() {
            let upper = (cursor + self.options.batch_size).min(miss_texts.len());
            let batch = &miss_texts[cursor..upper];
            match self.embed_with_retry(batch).await {
                Ok(batch_vectors) => {
                    for (offset, vector) in batch_vectors.into_iter().enumerate() {
                        let miss_index = cursor + offset;
                        self.cache
                            .insert_if_absent(miss_keys[miss_index], vector.clone());
                        for &slot in &miss_slots[miss_index] {
                            vectors[slot] = Some(vector.clone());
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        provider = self.provider.provider_name(),
                        batch_len = batch.len(),
                        error = %e,
                        "embedding batch failed, affected chunks stay vector-absent"
                    );
                    failed_batches += 1;
                }
            }
            cursor = upper;
        }

        EmbedOutcome {
            vectors,
            cache_hits,
            cache_misses,
            failed_batches,
        }
    }

    /// Embed a single query string. Unlike indexing, the caller needs to
    /// know about the failure so it can fall back to keyword-only search.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let key = text_fingerprint(text);
        if let Some(vector) = self.cache.get(&key) {
            return Ok(vector);
        }
        let mut result = self.embed_with_retry(&[text.to_string()]).await?;
        let vector = result
            .pop()
            .ok_or_else(|| EmbedError::malformed("provider returned no vector for query"))?;
        self.cache.insert_if_absent(key, vector.clone());
        Ok(vector)
    }

    async fn embed_with_retry(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut attempt = 0u32;
        loop {
            match self.provider.embed_batch(batch).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) if e.is_transient() && attempt < self.options.max_retries => {
                    let delay = self.options.backoff_base * 2u32.saturating_pow(attempt);
                    attempt += 1;
                    debug!(
                        attempt,
                        max_retries = self.options.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient embedding failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_transient() => {
                    return Err(EmbedError::RetriesExhausted {
                        attempts: attempt + 1,
                        source: Box::new(e),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::provider::MockEmbeddingProvider;

    fn client_with(
        provider: Arc<MockEmbeddingProvider>,
        batch_size: usize,
        max_retries: u32,
    ) -> EmbeddingClient {
        let cache = Arc::new(EmbeddingCache::new(CacheConfig::default()));
        EmbeddingClient::new(
            provider,
            cache,
            ClientOptions {
                batch_size,
                max_retries,
                backoff_base: Duration::from_millis(1),
            },
        )
    }

    #[tokio::test]
    async fn identical_texts_cause_one_provider_call() {
        let provider = Arc::new(MockEmbeddingProvider::new(8));
        let client = client_with(provider.clone(), 32, 0);

        let texts = vec![
            "def add(a,b): return a+b".to_string(),
            "def add(a,b): return a+b".to_string(),
        ];
        let outcome = client.embed_batched(&texts).await;
        assert_eq!(provider.call_count(), 1);
        assert_eq!(outcome.cache_misses, 2);
        assert!(outcome.vectors.iter().all(|v| v.is_some()));
        assert_eq!(outcome.vectors[0], outcome.vectors[1]);

        // A second call is served entirely from the cache.
        let outcome = client.embed_batched(&texts).await;
        assert_eq!(provider.call_count(), 1);
        assert_eq!(outcome.cache_hits, 2);
    }

    #[tokio::test]
    async fn misses_are_split_into_batches() {
        let provider = Arc::new(MockEmbeddingProvider::new(4));
        let client = client_with(provider.clone(), 2, 0);

        let texts: Vec<String> = (0..5).map(|i| format!("chunk {i}")).collect();
        let outcome = client.embed_batched(&texts).await;
        assert_eq!(provider.call_count(), 3); // 2 + 2 + 1
        assert!(outcome.vectors.iter().all(|v| v.is_some()));
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let provider = Arc::new(MockEmbeddingProvider::new(4));
        provider.fail_next(2);
        let client = client_with(provider.clone(), 32, 3);

        let outcome = client.embed_batched(&["text".to_string()]).await;
        assert_eq!(outcome.failed_batches, 0);
        assert!(outcome.vectors[0].is_some());
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_degrade_to_vector_absent() {
        let provider = Arc::new(MockEmbeddingProvider::new(4));
        provider.fail_next(10);
        let client = client_with(provider.clone(), 32, 2);

        let outcome = client.embed_batched(&["text".to_string()]).await;
        assert_eq!(outcome.failed_batches, 1);
        assert!(outcome.vectors[0].is_none());
        assert_eq!(provider.call_count(), 3); // initial attempt + 2 retries
    }

    #[tokio::test]
    async fn query_embedding_propagates_failure() {
        let provider = Arc::new(MockEmbeddingProvider::new(4));
        provider.fail_next(10);
        let client = client_with(provider.clone(), 32, 1);

        let err = client.embed_query("query").await.expect_err("should fail");
        assert!(matches!(err, EmbedError::RetriesExhausted { .. }));
    }
}
