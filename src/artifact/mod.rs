//! Derived forecast artifact and its lifecycle manager.
//!
//! Each resource owns at most one forecast artifact, a cache of the latest
//! successful forecast fetch. Artifacts are immutable once populated, so a
//! refresh is always delete-then-recreate, never an in-place patch.

mod error;
mod store;

pub use error::ArtifactError;
pub use store::{ArtifactStore, MemoryArtifactStore};

use crate::provider::{Forecast, ForecastPoint};
use crate::resource::{ProviderKind, ResourceKey};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

const LABEL_COMPONENT: &str = "component";
const LABEL_INSTANCE: &str = "instance";
const LABEL_MANAGED_BY: &str = "managed-by";
const LABEL_PROVIDER_INSTANCE: &str = "carbon-provider-instance";
const LABEL_PROVIDER_TYPE: &str = "carbon-provider-type";
const LABEL_PROVIDER_ZONE: &str = "carbon-provider-zone";

/// The derived artifact holding one serialized forecast.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastArtifact {
    /// `<resource-name>-forecast`.
    pub name: String,
    /// Recorded identity: must always equal the resolution active at the
    /// most recent successful create.
    pub provider: ProviderKind,
    pub zone: String,
    /// When the forecast backing this artifact was fetched.
    pub point_time: DateTime<Utc>,
    pub labels: HashMap<String, String>,
    /// Set once populated; the store rejects mutation afterwards.
    pub immutable: bool,
    /// JSON array of forecast points wrapped in a binary envelope.
    pub payload: Vec<u8>,
    /// Ownership linkage back to the source resource, so deleting the
    /// resource cascades to the artifact.
    pub owner: ResourceKey,
}

impl ForecastArtifact {
    /// Unwrap the binary envelope and parse the forecast back out.
    pub fn decode_payload(&self) -> Result<Forecast, ArtifactError> {
        let json: Vec<u8> = bincode::deserialize(&self.payload)
            .map_err(|e| ArtifactError::Decode(e.to_string()))?;
        serde_json::from_slice(&json).map_err(|e| ArtifactError::Decode(e.to_string()))
    }
}

/// Identity check result for an owned artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactState {
    /// No artifact exists for the resource yet.
    Missing,
    /// Recorded identity matches the current resolution.
    Current,
    /// Recorded (kind, zone) no longer match; structurally stale.
    Drifted,
}

/// Manages create/replace/delete of the derived forecast artifact.
pub struct ForecastCache {
    store: Arc<dyn ArtifactStore>,
}

impl ForecastCache {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }

    /// Artifact name derived from the owning resource.
    pub fn artifact_name(resource_name: &str) -> String {
        format!("{}-forecast", resource_name)
    }

    /// Compare the recorded identity of the resource's artifact against the
    /// current resolution.
    pub async fn inspect(
        &self,
        key: &ResourceKey,
        provider: ProviderKind,
        zone: &str,
    ) -> Result<ArtifactState, ArtifactError> {
        let name = Self::artifact_name(&key.name);
        match self.store.get(&name).await? {
            None => Ok(ArtifactState::Missing),
            Some(artifact) if artifact.provider == provider && artifact.zone == zone => {
                Ok(ArtifactState::Current)
            }
            Some(_) => Ok(ArtifactState::Drifted),
        }
    }

    /// Replace the resource's artifact with a freshly fetched forecast.
    ///
    /// Any existing artifact is deleted first; a delete or create failure
    /// aborts the sync. The transient gap between delete and create is
    /// acceptable because the artifact is a cache, not a source of truth.
    pub async fn sync(
        &self,
        key: &ResourceKey,
        forecast: &Forecast,
        provider: ProviderKind,
        zone: &str,
        point_time: DateTime<Utc>,
    ) -> Result<(), ArtifactError> {
        let name = Self::artifact_name(&key.name);

        if let Some(existing) = self.store.get(&name).await? {
            if existing.provider != provider || existing.zone != zone {
                tracing::info!(
                    artifact = %name,
                    recorded_provider = %existing.provider,
                    recorded_zone = %existing.zone,
                    provider = %provider,
                    zone = %zone,
                    "Artifact identity drifted, replacing"
                );
            }
            self.store.delete(&name).await?;
        }

        let artifact = build_artifact(key, forecast, provider, zone, point_time)?;
        self.store.create(artifact).await?;

        tracing::debug!(
            artifact = %name,
            provider = %provider,
            zone = %zone,
            points = forecast.len(),
            "Forecast artifact created"
        );
        Ok(())
    }
}

fn build_artifact(
    key: &ResourceKey,
    forecast: &[ForecastPoint],
    provider: ProviderKind,
    zone: &str,
    point_time: DateTime<Utc>,
) -> Result<ForecastArtifact, ArtifactError> {
    let name = ForecastCache::artifact_name(&key.name);

    let json = serde_json::to_vec(forecast).map_err(|e| ArtifactError::Encode(e.to_string()))?;
    let payload = bincode::serialize(&json).map_err(|e| ArtifactError::Encode(e.to_string()))?;

    let labels = HashMap::from([
        (LABEL_COMPONENT.to_string(), "forecast".to_string()),
        (LABEL_INSTANCE.to_string(), name.clone()),
        (LABEL_MANAGED_BY.to_string(), "reconciler".to_string()),
        (LABEL_PROVIDER_INSTANCE.to_string(), key.name.clone()),
        (LABEL_PROVIDER_TYPE.to_string(), provider.to_string()),
        (LABEL_PROVIDER_ZONE.to_string(), zone.to_string()),
    ]);

    Ok(ForecastArtifact {
        name,
        provider,
        zone: zone.to_string(),
        point_time,
        labels,
        immutable: true,
        payload,
        owner: key.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_forecast() -> Forecast {
        vec![
            ForecastPoint {
                point_time: Utc::now(),
                carbon_intensity: 250.0,
            },
            ForecastPoint {
                point_time: Utc::now() + chrono::Duration::hours(1),
                carbon_intensity: 261.5,
            },
        ]
    }

    fn cache() -> (ForecastCache, Arc<MemoryArtifactStore>) {
        let store = Arc::new(MemoryArtifactStore::new());
        (ForecastCache::new(store.clone()), store)
    }

    #[tokio::test]
    async fn sync_creates_artifact_with_identity_and_labels() {
        let (cache, store) = cache();
        let key = ResourceKey::new("default", "sim");
        let now = Utc::now();

        cache
            .sync(&key, &sample_forecast(), ProviderKind::Simulator, "SIM-1", now)
            .await
            .unwrap();

        let artifact = store.get("sim-forecast").await.unwrap().unwrap();
        assert_eq!(artifact.provider, ProviderKind::Simulator);
        assert_eq!(artifact.zone, "SIM-1");
        assert_eq!(artifact.point_time, now);
        assert!(artifact.immutable);
        assert_eq!(artifact.labels["carbon-provider-zone"], "SIM-1");
        assert_eq!(artifact.labels["carbon-provider-instance"], "sim");
        assert_eq!(artifact.owner, key);
    }

    #[tokio::test]
    async fn payload_round_trips_through_envelope() {
        let (cache, store) = cache();
        let key = ResourceKey::new("default", "sim");
        let forecast = sample_forecast();

        cache
            .sync(&key, &forecast, ProviderKind::Simulator, "SIM-1", Utc::now())
            .await
            .unwrap();

        let artifact = store.get("sim-forecast").await.unwrap().unwrap();
        let decoded = artifact.decode_payload().unwrap();
        assert_eq!(decoded, forecast);
    }

    #[tokio::test]
    async fn refresh_deletes_then_recreates() {
        let (cache, store) = cache();
        let key = ResourceKey::new("default", "sim");
        let first = Utc::now() - chrono::Duration::hours(13);
        let second = Utc::now();

        cache
            .sync(&key, &sample_forecast(), ProviderKind::Simulator, "SIM-1", first)
            .await
            .unwrap();
        cache
            .sync(&key, &sample_forecast(), ProviderKind::Simulator, "SIM-1", second)
            .await
            .unwrap();

        let artifact = store.get("sim-forecast").await.unwrap().unwrap();
        assert_eq!(artifact.point_time, second);
    }

    #[tokio::test]
    async fn drifted_identity_is_eliminated_by_sync() {
        let (cache, store) = cache();
        let key = ResourceKey::new("default", "cip");

        cache
            .sync(&key, &sample_forecast(), ProviderKind::Simulator, "SIM-1", Utc::now())
            .await
            .unwrap();
        assert_eq!(
            cache
                .inspect(&key, ProviderKind::WattTime, "CAISO")
                .await
                .unwrap(),
            ArtifactState::Drifted
        );

        cache
            .sync(&key, &sample_forecast(), ProviderKind::WattTime, "CAISO", Utc::now())
            .await
            .unwrap();

        let artifact = store.get("cip-forecast").await.unwrap().unwrap();
        assert_eq!(artifact.provider, ProviderKind::WattTime);
        assert_eq!(artifact.zone, "CAISO");
        assert_eq!(
            cache
                .inspect(&key, ProviderKind::WattTime, "CAISO")
                .await
                .unwrap(),
            ArtifactState::Current
        );
    }

    #[tokio::test]
    async fn inspect_reports_missing() {
        let (cache, _store) = cache();
        let key = ResourceKey::new("default", "new");
        assert_eq!(
            cache
                .inspect(&key, ProviderKind::Simulator, "SIM-1")
                .await
                .unwrap(),
            ArtifactState::Missing
        );
    }
}
