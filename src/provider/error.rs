//! Error types for provider operations.

use thiserror::Error;

/// Errors that can occur while talking to a carbon-intensity data source.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network connectivity error (DNS, connection refused, etc.).
    #[error("network error: {0}")]
    Network(String),

    /// Request exceeded its deadline.
    #[error("request timeout after {0}s")]
    Timeout(u64),

    /// The source returned a structured error response.
    #[error("provider API error {status}; {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// Response body did not match the expected format.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Provider was constructed with unusable configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}
