//! quarry-embed: embedding provider abstraction for the quarry indexer.
//!
//! This crate owns everything between chunk text and dense vectors:
//!
//! - **[`provider`]**: the [`EmbeddingProvider`] trait, the HTTP
//!   [`RemoteEmbeddingProvider`], and a deterministic mock for tests
//! - **[`cache`]**: the shared hash-keyed [`EmbeddingCache`] with TTL and
//!   LRU eviction
//! - **[`client`]**: the [`EmbeddingClient`] that layers caching, batching,
//!   retry with backoff, and graceful degradation over a provider
//! - **[`config`]** / **[`error`]**: external configuration and the
//!   [`EmbedError`] taxonomy
//!
//! The provider seam is deliberately narrow (`embed_batch -> vectors or
//! error`) so all retry and degradation policy can be tested without a
//! network.
//!
//! ## Quick Start
//!
//! ```no_run
//! use quarry_embed::{CacheConfig, EmbedConfig, EmbeddingCache, EmbeddingClient};
//! use std::sync::Arc;
//!
//! # async fn example() -> quarry_embed::Result<()> {
//! let config = EmbedConfig {
//!     endpoint: "http://localhost:9000/v1/embeddings".into(),
//!     model: "code-embed-small".into(),
//!     api_key: None,
//!     dimension: 384,
//!     batch_size: 32,
//!     timeout_secs: 30,
//!     max_retries: 3,
//! };
//! let cache = Arc::new(EmbeddingCache::new(CacheConfig::default()));
//! let client = EmbeddingClient::remote(config, cache)?;
//! let outcome = client.embed_batched(&["fn main() {}".to_string()]).await;
//! assert_eq!(outcome.vectors.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod provider;

pub use cache::{CacheConfig, CacheStats, EmbeddingCache, text_fingerprint};
pub use client::{ClientOptions, EmbedOutcome, EmbeddingClient};
pub use config::EmbedConfig;
pub use error::{EmbedError, Result};
pub use provider::{EmbeddingProvider, MockEmbeddingProvider, RemoteEmbeddingProvider};
