//! Error types for the resource store.

use thiserror::Error;

/// Errors surfaced by a [`super::ResourceStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Resource no longer exists.
    #[error("resource '{0}' not found")]
    NotFound(String),

    /// Optimistic concurrency token did not match; the resource changed
    /// since it was last read.
    #[error("resource '{key}' version conflict: expected {expected}, found {actual}")]
    Conflict {
        key: String,
        expected: u64,
        actual: u64,
    },

    /// A resource with the same key already exists.
    #[error("resource '{0}' already exists")]
    AlreadyExists(String),
}
