//! Level-triggered reconciliation of provider resources.
//!
//! One pass reads the declared spec, resolves a provider, fetches the live
//! carbon intensity, refreshes the forecast artifact when due, and writes the
//! observed state back through a single conditional status patch. Passes are
//! idempotent: a repeated pass over unchanged state converges to the same
//! status and leaves the artifact untouched.

mod error;

pub use error::ReconcileError;

use crate::artifact::{ArtifactState, ArtifactStore, ForecastCache};
use crate::metrics::{LIVE_INTENSITY_GAUGE, RECONCILIATIONS_TOTAL};
use crate::provider::{
    self, Provider, ProviderEndpoints, SecretResolver, REQUEST_TIMEOUT_SECS,
};
use crate::resource::{
    set_condition, Condition, ConditionStatus, ProviderKind, ProviderStatus, ResourceKey,
    ResourceStore, CONDITION_AVAILABLE, REASON_ARTIFACT_SYNC_FAILED, REASON_INIT_FAILED,
    REASON_INIT_FINISHED, REASON_PENDING,
};
use crate::status::StatusManager;
use crate::telemetry::{TelemetrySink, MEASUREMENT_FORECAST, MEASUREMENT_LIVE};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::{counter, gauge};
use reqwest::Client;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// What the dispatcher should do after a successful pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The resource no longer exists; drop it.
    Skipped,
    /// Schedule the next pass after this delay.
    Requeue(Duration),
}

/// Executes reconciliation passes over resources in the store.
///
/// Holds no per-resource state between passes; everything observed is either
/// re-derived or read back from the stores, so a crash between any two steps
/// is repaired by the next pass.
pub struct Reconciler {
    store: Arc<dyn ResourceStore>,
    secrets: Arc<dyn SecretResolver>,
    cache: ForecastCache,
    status: StatusManager,
    telemetry: Arc<dyn TelemetrySink>,
    http: Arc<Client>,
    endpoints: ProviderEndpoints,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        secrets: Arc<dyn SecretResolver>,
        artifacts: Arc<dyn ArtifactStore>,
        telemetry: Arc<dyn TelemetrySink>,
        http: Arc<Client>,
    ) -> Self {
        Self {
            cache: ForecastCache::new(artifacts),
            status: StatusManager::new(Arc::clone(&store)),
            store,
            secrets,
            telemetry,
            http,
            endpoints: ProviderEndpoints::default(),
        }
    }

    /// Override provider base URLs, for pointing at test servers.
    pub fn with_endpoints(mut self, endpoints: ProviderEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Shared HTTP client with the provider request timeout applied.
    pub fn default_http_client() -> Result<Arc<Client>, reqwest::Error> {
        Ok(Arc::new(
            Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()?,
        ))
    }

    /// Run one reconciliation pass for `key`.
    #[tracing::instrument(skip(self), fields(resource = %key))]
    pub async fn reconcile(&self, key: &ResourceKey) -> Result<ReconcileOutcome, ReconcileError> {
        let Some(resource) = self.store.get(key).await? else {
            tracing::debug!("Resource deleted, nothing to reconcile");
            return Ok(ReconcileOutcome::Skipped);
        };

        let mut status = resource.status.clone();
        let mut version = resource.resource_version;

        // First observation of this resource: record that reconciliation is
        // underway before any external call can fail.
        if status.conditions.is_empty() {
            set_condition(
                &mut status.conditions,
                Condition::new(
                    CONDITION_AVAILABLE,
                    ConditionStatus::Unknown,
                    REASON_PENDING,
                    "Reconciliation has not completed yet",
                ),
            );
            version = self.status.patch(key, version, status.clone()).await?;
        }

        let (provider, zone) = match provider::resolve(
            key,
            &resource.spec,
            self.secrets.as_ref(),
            Arc::clone(&self.http),
            &self.endpoints,
        )
        .await
        {
            Ok(resolved) => resolved,
            Err(err) => {
                tracing::error!(error = %err, "Provider resolution failed");
                set_condition(
                    &mut status.conditions,
                    Condition::new(
                        CONDITION_AVAILABLE,
                        ConditionStatus::False,
                        REASON_INIT_FAILED,
                        err.to_string(),
                    ),
                );
                self.patch_failure(key, version, status).await;
                return Err(err.into());
            }
        };
        let kind = provider.kind();

        set_condition(
            &mut status.conditions,
            Condition::new(
                CONDITION_AVAILABLE,
                ConditionStatus::True,
                REASON_INIT_FINISHED,
                format!("resolved {} provider for zone {}", kind, zone),
            ),
        );

        // A failed live fetch is terminal: better a visibly stale status than
        // one silently re-stamped with old data.
        let current = provider.get_current(&zone).await.map_err(|err| {
            tracing::error!(error = %err, zone = %zone, "Live intensity fetch failed");
            ReconcileError::CurrentFetchFailed(err)
        })?;

        let artifact_state = self.cache.inspect(key, kind, &zone).await?;
        let now = Utc::now();
        let due = forecast_due(
            &resource.status,
            kind,
            &zone,
            artifact_state,
            now,
            resource.spec.forecast_refresh_interval_hours,
        );

        let mut refreshed = None;
        if due {
            match provider.get_forecast(&zone).await {
                Ok(forecast) if !forecast.is_empty() => refreshed = Some(forecast),
                Ok(_) => {
                    tracing::warn!(zone = %zone, "Provider returned an empty forecast, keeping previous one");
                }
                Err(err) => {
                    // Non-blocking: live data still lands, the forecast stays
                    // due and is retried next pass.
                    tracing::warn!(error = %err, zone = %zone, "Forecast fetch failed, keeping previous one");
                }
            }
        }

        if let Some(forecast) = &refreshed {
            if let Err(err) = self.cache.sync(key, forecast, kind, &zone, now).await {
                tracing::error!(error = %err, "Forecast artifact sync failed");
                set_condition(
                    &mut status.conditions,
                    Condition::new(
                        CONDITION_AVAILABLE,
                        ConditionStatus::False,
                        REASON_ARTIFACT_SYNC_FAILED,
                        err.to_string(),
                    ),
                );
                self.patch_failure(key, version, status).await;
                return Err(err.into());
            }
            status.last_forecast = Some(now);
        }

        let value_text = match current {
            Some(value) if value >= 0.0 => format!("{:.2}", value),
            _ => "n/a".to_string(),
        };

        status.zone = Some(zone.clone());
        status.provider = Some(kind);
        status.carbon_intensity = Some(value_text.clone());
        status.last_update = Some(now);
        status.next_update =
            Some(now + ChronoDuration::hours(resource.spec.live_refresh_interval_hours as i64));
        self.status.patch(key, version, status).await?;

        tracing::info!(
            provider = %kind,
            zone = %zone,
            carbon_intensity = %value_text,
            forecast_refreshed = refreshed.is_some(),
            "Reconciliation pass complete"
        );

        let tags = [
            ("provider_kind", kind.as_str()),
            ("provider", key.name.as_str()),
            ("zone", zone.as_str()),
        ];
        if let Some(value) = current.filter(|v| *v >= 0.0) {
            let points = BTreeMap::from([(now, value)]);
            if let Err(err) = self.telemetry.push(MEASUREMENT_LIVE, &tags, &points).await {
                tracing::warn!(error = %err, "Telemetry push for live value failed");
            }
            gauge!(
                LIVE_INTENSITY_GAUGE,
                "provider_kind" => kind.as_str(),
                "zone" => zone.clone()
            )
            .set(value);
        }
        if let Some(forecast) = &refreshed {
            let points: BTreeMap<DateTime<Utc>, f64> = forecast
                .iter()
                .map(|p| (p.point_time, p.carbon_intensity))
                .collect();
            if let Err(err) = self
                .telemetry
                .push(MEASUREMENT_FORECAST, &tags, &points)
                .await
            {
                tracing::warn!(error = %err, "Telemetry push for forecast failed");
            }
        }

        counter!(
            RECONCILIATIONS_TOTAL,
            "resource" => key.to_string(),
            "provider_kind" => kind.as_str(),
            "zone" => zone
        )
        .increment(1);

        Ok(ReconcileOutcome::Requeue(Duration::from_secs(
            resource.spec.live_refresh_interval_hours as u64 * 3600,
        )))
    }

    /// Record a failure condition without masking the original error. A
    /// conflict here just means some other writer got there first.
    async fn patch_failure(&self, key: &ResourceKey, version: u64, status: ProviderStatus) {
        if let Err(err) = self.status.patch(key, version, status).await {
            tracing::warn!(error = %err, "Failed to record failure condition");
        }
    }
}

/// Whether this pass must refresh the forecast.
///
/// Identity drift or a missing artifact forces a refresh regardless of
/// cadence, so the artifact converges in one pass after the spec changes.
fn forecast_due(
    status: &ProviderStatus,
    kind: ProviderKind,
    zone: &str,
    artifact_state: ArtifactState,
    now: DateTime<Utc>,
    interval_hours: u32,
) -> bool {
    if status.provider != Some(kind) || status.zone.as_deref() != Some(zone) {
        return true;
    }
    if artifact_state != ArtifactState::Current {
        return true;
    }
    match status.last_forecast {
        None => true,
        Some(last) => now - last >= ChronoDuration::hours(interval_hours as i64),
    }
}
