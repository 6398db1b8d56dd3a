//! Artifact store abstraction and the in-memory implementation.

use super::{ArtifactError, ForecastArtifact};
use async_trait::async_trait;
use dashmap::DashMap;

/// Storage for derived forecast artifacts, shared across all resources but
/// partitioned by artifact name.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<ForecastArtifact>, ArtifactError>;

    /// Create a new artifact. Fails when one with the same name exists.
    async fn create(&self, artifact: ForecastArtifact) -> Result<(), ArtifactError>;

    async fn delete(&self, name: &str) -> Result<(), ArtifactError>;
}

/// In-memory artifact store enforcing the immutability rule.
#[derive(Default)]
pub struct MemoryArtifactStore {
    artifacts: DashMap<String, ForecastArtifact>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn get(&self, name: &str) -> Result<Option<ForecastArtifact>, ArtifactError> {
        Ok(self.artifacts.get(name).map(|a| a.clone()))
    }

    async fn create(&self, artifact: ForecastArtifact) -> Result<(), ArtifactError> {
        if let Some(existing) = self.artifacts.get(&artifact.name) {
            if existing.immutable {
                return Err(ArtifactError::Immutable(artifact.name.clone()));
            }
            return Err(ArtifactError::AlreadyExists(artifact.name.clone()));
        }

        self.artifacts.insert(artifact.name.clone(), artifact);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), ArtifactError> {
        self.artifacts
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ArtifactError::NotFound(name.to_string()))
    }
}
