//! Status patching with optimistic concurrency.
//!
//! The manager only detects and reports a version conflict; the dispatcher
//! re-runs the whole pass, so status mutations are never silently lost or
//! duplicated and never retried piecemeal.

use crate::resource::{ProviderStatus, ResourceKey, ResourceStore, StoreError};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatusError {
    /// The resource version moved underneath the pass. Not retried here.
    #[error("status patch conflict on '{0}'")]
    Conflict(String),

    #[error(transparent)]
    Store(StoreError),
}

/// Applies status deltas against the last-read resource version.
pub struct StatusManager {
    store: Arc<dyn ResourceStore>,
}

impl StatusManager {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }

    /// Patch the resource's status in one atomic operation. Returns the new
    /// resource version for subsequent patches within the same pass.
    pub async fn patch(
        &self,
        key: &ResourceKey,
        expected_version: u64,
        status: ProviderStatus,
    ) -> Result<u64, StatusError> {
        match self.store.patch_status(key, expected_version, status).await {
            Ok(version) => Ok(version),
            Err(StoreError::Conflict { .. }) => Err(StatusError::Conflict(key.to_string())),
            Err(e) => Err(StatusError::Store(e)),
        }
    }
}
