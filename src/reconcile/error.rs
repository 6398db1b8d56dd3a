//! Error taxonomy for a reconciliation pass.

use crate::artifact::ArtifactError;
use crate::provider::{ProviderError, ResolveError};
use crate::resource::StoreError;
use crate::status::StatusError;
use thiserror::Error;

/// Terminal outcomes of a failed pass. Every variant aborts the current pass;
/// the dispatcher decides whether and when to retry.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Spec could not be turned into a working provider instance.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The live value fetch failed outright. Distinct from the provider
    /// answering "no value", which continues the pass with a sentinel.
    #[error("fetching current carbon intensity failed: {0}")]
    CurrentFetchFailed(#[source] ProviderError),

    /// The forecast artifact could not be replaced.
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    /// Another writer bumped the resource version mid-pass. Never retried
    /// here; the next scheduled pass observes the fresh state.
    #[error("status patch conflict on {0}")]
    StatusConflict(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<StatusError> for ReconcileError {
    fn from(err: StatusError) -> Self {
        match err {
            StatusError::Conflict(key) => ReconcileError::StatusConflict(key),
            StatusError::Store(e) => ReconcileError::Store(e),
        }
    }
}

impl ReconcileError {
    /// Short token used as the `reason` label on the error counter.
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcileError::Resolve(_) => "resolve",
            ReconcileError::CurrentFetchFailed(_) => "current_fetch",
            ReconcileError::Artifact(_) => "artifact_sync",
            ReconcileError::StatusConflict(_) => "status_conflict",
            ReconcileError::Store(_) => "store",
        }
    }
}
