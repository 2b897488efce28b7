//! Error types for the embedding subsystem.

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Errors raised while configuring or talking to an embedding provider.
///
/// Transient failures (timeouts, rate limits, server errors) are retried by
/// the client; everything else is terminal for the affected request. The
/// distinction lives in [`EmbedError::is_transient`] so the retry loop does
/// not need to know provider details.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// Provider configuration is invalid (rejected at startup, never clamped).
    #[error("invalid embedding configuration: {message}")]
    InvalidConfig { message: String },

    /// The provider answered with a non-success status.
    #[error("embedding provider returned status {status}: {message}")]
    Provider { status: u16, message: String },

    /// The per-call timeout elapsed before the provider answered.
    #[error("embedding request timed out")]
    Timeout,

    /// Transport-level failure talking to the provider.
    #[error("embedding transport error: {source}")]
    Transport {
        #[source]
        source: reqwest::Error,
    },

    /// The provider answered but the payload did not match the contract
    /// (wrong vector count or dimension).
    #[error("malformed provider response: {message}")]
    MalformedResponse { message: String },

    /// All retry attempts were exhausted for a batch.
    #[error("embedding failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<EmbedError>,
    },
}

impl EmbedError {
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn malformed<S: Into<String>>(message: S) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::Provider { status, .. } => *status == 429 || *status >= 500,
            Self::Transport { source } => source.is_timeout() || source.is_connect(),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for EmbedError {
    fn from(source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport { source }
        }
    }
}
