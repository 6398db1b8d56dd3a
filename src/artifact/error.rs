//! Error types for the artifact lifecycle.

use thiserror::Error;

/// Errors from forecast artifact create/replace/delete.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact '{0}' already exists")]
    AlreadyExists(String),

    #[error("artifact '{0}' not found")]
    NotFound(String),

    /// Populated artifacts are never mutated in place.
    #[error("artifact '{0}' is immutable")]
    Immutable(String),

    #[error("encoding forecast payload failed: {0}")]
    Encode(String),

    #[error("decoding forecast payload failed: {0}")]
    Decode(String),

    /// Store-side failure (I/O, backend unavailable).
    #[error("artifact store error: {0}")]
    Store(String),
}
