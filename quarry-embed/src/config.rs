//! Configuration for the remote embedding provider.

use crate::error::{EmbedError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_batch_size() -> usize {
    32
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

/// Connection and batching parameters for an embedding provider.
///
/// Everything here is external configuration; nothing is hardcoded in the
/// provider itself. The request contract is generic: a batch of texts, a
/// model identifier, and an optional credential go out; one vector per
/// input text comes back in the same order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmbedConfig {
    /// Base endpoint of the embedding service.
    pub endpoint: String,
    /// Model identifier sent with every request.
    pub model: String,
    /// Optional bearer credential.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Expected dimensionality of returned vectors.
    pub dimension: usize,
    /// Maximum number of texts per provider request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retry attempts for transient failures before giving up on a batch.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl EmbedConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Reject unusable configurations up front.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(EmbedError::invalid_config("endpoint must not be empty"));
        }
        if self.model.trim().is_empty() {
            return Err(EmbedError::invalid_config("model must not be empty"));
        }
        if self.dimension == 0 {
            return Err(EmbedError::invalid_config("dimension must be positive"));
        }
        if self.batch_size == 0 {
            return Err(EmbedError::invalid_config("batch_size must be positive"));
        }
        if self.timeout_secs == 0 {
            return Err(EmbedError::invalid_config("timeout_secs must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> EmbedConfig {
        EmbedConfig {
            endpoint: "http://localhost:8080/embed".to_string(),
            model: "test-embed-small".to_string(),
            api_key: None,
            dimension: 8,
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn zero_sizes_are_rejected() {
        let mut cfg = base();
        cfg.dimension = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = base();
        cfg.batch_size = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = base();
        cfg.endpoint = String::new();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn defaults_fill_optional_fields() {
        let cfg: EmbedConfig = toml::from_str(
            r#"
            endpoint = "http://localhost:9000/v1/embeddings"
            model = "code-embed"
            dimension = 384
            "#,
        )
        .unwrap();
        assert_eq!(cfg.batch_size, 32);
        assert_eq!(cfg.max_retries, 3);
        assert!(cfg.api_key.is_none());
    }
}
