//! TOML configuration for the indexer and retriever.
//!
//! All tunables live here rather than in code: chunking geometry, cache
//! limits, the embedding provider, search weights, and worker bounds.
//! Validation is fatal at startup; an invalid weight table or a zero size
//! rejects initialization instead of being silently clamped.

use crate::retrieval::hybrid::SearchWeights;
use anyhow::{Context, Result, bail};
use quarry_chunk::ChunkConfig;
use quarry_embed::{CacheConfig, EmbedConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_max_workers() -> usize {
    4
}

/// Top-level configuration, usually loaded from `quarry.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RetrieverConfig {
    /// Chunking geometry.
    pub chunking: ChunkConfig,
    /// Embedding cache limits.
    pub cache: CacheConfig,
    /// Remote embedding provider. Absent means keyword-only indexing.
    pub embedding: Option<EmbedConfig>,
    /// Per-query-type fusion weights.
    pub search_weights: SearchWeights,
    /// Bound on concurrent per-file indexing work.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkConfig::default(),
            cache: CacheConfig::default(),
            embedding: None,
            search_weights: SearchWeights::default(),
            max_workers: default_max_workers(),
        }
    }
}

impl RetrieverConfig {
    /// Load and validate a TOML config file. A missing file yields the
    /// defaults; a present but invalid file is a fatal error.
    pub fn load(path: &Path) -> Result<Self> {
        let config = match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)
                .with_context(|| format!("invalid config file {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("cannot read {}", path.display()));
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.chunking
            .validate()
            .context("invalid [chunking] section")?;
        self.search_weights
            .validate()
            .map_err(|e| anyhow::anyhow!(e))
            .context("invalid [search_weights] section")?;
        if let Some(embedding) = &self.embedding {
            embedding.validate().context("invalid [embedding] section")?;
        }
        if self.max_workers == 0 {
            bail!("max_workers must be at least 1");
        }
        if self.cache.max_entries == 0 {
            bail!("cache.max_entries must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::hybrid::QueryType;

    #[test]
    fn defaults_validate() {
        let config = RetrieverConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_workers, 4);
        assert!(config.embedding.is_none());
    }

    #[test]
    fn toml_round_trip_with_overrides() {
        let config: RetrieverConfig = toml::from_str(
            r#"
            max_workers = 2

            [chunking]
            chunk_size = 1000
            chunk_overlap = 100

            [search_weights.code_search]
            vector = 0.5
            keyword = 0.5

            [embedding]
            endpoint = "http://localhost:8080/embed"
            model = "nomic-embed-text"
            dimension = 768
            "#,
        )
        .unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(
            config.search_weights.profile(QueryType::CodeSearch).vector,
            0.5
        );
        assert_eq!(config.embedding.as_ref().unwrap().dimension, 768);
    }

    #[test]
    fn bad_weights_are_fatal() {
        let config: RetrieverConfig = toml::from_str(
            r#"
            [search_weights.default]
            vector = 0.9
            keyword = 0.9
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_sizes_are_fatal() {
        let config: RetrieverConfig = toml::from_str("[chunking]\nchunk_size = 0\n").unwrap();
        assert!(config.validate().is_err());

        let config: RetrieverConfig = toml::from_str("max_workers = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<RetrieverConfig>("chunk_sizes = 10\n").is_err());
    }
}
