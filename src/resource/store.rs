//! Resource store abstraction and the in-memory implementation.

use super::{ProviderResource, ProviderSpec, ProviderStatus, ResourceKey, StoreError};
use async_trait::async_trait;
use dashmap::DashMap;

/// Storage for provider resources.
///
/// Status mutations go through [`ResourceStore::patch_status`], a conditional
/// update keyed on the resource version read at the start of the pass. The
/// store never retries a conflicting patch; that decision belongs to the
/// dispatcher.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch a resource. `Ok(None)` means it was deleted, which is not an
    /// error for the caller.
    async fn get(&self, key: &ResourceKey) -> Result<Option<ProviderResource>, StoreError>;

    /// All known resource keys, for seeding the work queue.
    async fn list(&self) -> Result<Vec<ResourceKey>, StoreError>;

    /// Insert a freshly declared resource with an empty status.
    async fn insert(&self, key: ResourceKey, spec: ProviderSpec) -> Result<(), StoreError>;

    /// Conditionally replace the status. Returns the new resource version on
    /// success, `StoreError::Conflict` when `expected_version` is stale.
    async fn patch_status(
        &self,
        key: &ResourceKey,
        expected_version: u64,
        status: ProviderStatus,
    ) -> Result<u64, StoreError>;
}

/// In-memory store backing the standalone binary and tests.
#[derive(Default)]
pub struct MemoryResourceStore {
    resources: DashMap<ResourceKey, ProviderResource>,
}

impl MemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResourceStore for MemoryResourceStore {
    async fn get(&self, key: &ResourceKey) -> Result<Option<ProviderResource>, StoreError> {
        Ok(self.resources.get(key).map(|r| r.clone()))
    }

    async fn list(&self) -> Result<Vec<ResourceKey>, StoreError> {
        Ok(self.resources.iter().map(|r| r.key().clone()).collect())
    }

    async fn insert(&self, key: ResourceKey, spec: ProviderSpec) -> Result<(), StoreError> {
        if self.resources.contains_key(&key) {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }

        let resource = ProviderResource {
            key: key.clone(),
            spec,
            status: ProviderStatus::default(),
            resource_version: 1,
        };
        self.resources.insert(key, resource);
        Ok(())
    }

    async fn patch_status(
        &self,
        key: &ResourceKey,
        expected_version: u64,
        status: ProviderStatus,
    ) -> Result<u64, StoreError> {
        let mut entry = self
            .resources
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        if entry.resource_version != expected_version {
            return Err(StoreError::Conflict {
                key: key.to_string(),
                expected: expected_version,
                actual: entry.resource_version,
            });
        }

        entry.status = status;
        entry.resource_version += 1;
        Ok(entry.resource_version)
    }
}
