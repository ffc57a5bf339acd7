//! Typed provider failures used to decide whether a request is worth retrying

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} API request failed with status {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("failed to reach {provider} API: {source}")]
    Transport {
        provider: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} returned a malformed response: {reason}")]
    Malformed { provider: String, reason: String },

    #[error("no scripted reply left for {0}")]
    Exhausted(String),
}

impl ProviderError {
    /// Rate limits, server errors and network hiccups are transient
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Transport { source, .. } => {
                source.is_timeout() || source.is_connect() || source.is_request()
            }
            Self::Malformed { .. } | Self::Exhausted(_) => false,
        }
    }
}

/// Classify an arbitrary error chain.
///
/// Errors that did not originate from a provider fall back to matching well
/// known transient phrases in their message.
pub fn is_retryable(err: &anyhow::Error) -> bool {
    if let Some(provider_err) = err.downcast_ref::<ProviderError>() {
        return provider_err.is_retryable();
    }
    let lower = err.to_string().to_lowercase();
    ["rate limit", "overloaded", "timed out", "timeout", "connection reset", "temporarily unavailable"]
        .iter()
        .any(|p| lower.contains(p))
}
