//! End-to-end reconciliation flows against mocked provider APIs.

use carbon::artifact::{ArtifactStore, ForecastCache, MemoryArtifactStore};
use carbon::provider::{ForecastPoint, MemorySecretResolver, ProviderEndpoints};
use carbon::reconcile::{ReconcileError, ReconcileOutcome, Reconciler};
use carbon::resource::{
    find_condition, Condition, ConditionStatus, ElectricityMapsConfig, EmissionsType,
    MemoryResourceStore, ProviderKind, ProviderSpec, ProviderStatus, ResourceKey, ResourceStore,
    SecretRef, Subscription, WattTimeConfig, CONDITION_AVAILABLE, REASON_INIT_FAILED,
    REASON_INIT_FINISHED,
};
use carbon::telemetry::NoopSink;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use mockito::{Matcher, Server, ServerGuard};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    server: ServerGuard,
    store: Arc<MemoryResourceStore>,
    artifacts: Arc<MemoryArtifactStore>,
    secrets: Arc<MemorySecretResolver>,
    reconciler: Reconciler,
}

async fn harness() -> Harness {
    let server = Server::new_async().await;
    let store = Arc::new(MemoryResourceStore::new());
    let artifacts = Arc::new(MemoryArtifactStore::new());
    let secrets = Arc::new(MemorySecretResolver::new());

    let endpoints = ProviderEndpoints {
        watttime: server.url(),
        electricitymaps: server.url(),
    };
    let reconciler = Reconciler::new(
        Arc::clone(&store) as Arc<dyn ResourceStore>,
        Arc::clone(&secrets) as _,
        Arc::clone(&artifacts) as _,
        Arc::new(NoopSink),
        Arc::new(Client::new()),
    )
    .with_endpoints(endpoints);

    Harness {
        server,
        store,
        artifacts,
        secrets,
        reconciler,
    }
}

fn electricitymaps_spec(zone: &str) -> ProviderSpec {
    ProviderSpec {
        provider: ProviderKind::ElectricityMaps,
        emissions_type: EmissionsType::Average,
        forecast_refresh_interval_hours: 12,
        live_refresh_interval_hours: 1,
        watttime: None,
        electricitymaps: Some(ElectricityMapsConfig {
            subscription: Subscription::FreeTier,
            commercial_trial_endpoint: None,
            zone: zone.to_string(),
            api_key: SecretRef {
                name: "em-creds".to_string(),
                namespace: None,
            },
        }),
        simulator: None,
    }
}

fn watttime_spec() -> ProviderSpec {
    ProviderSpec {
        provider: ProviderKind::WattTime,
        emissions_type: EmissionsType::Marginal,
        forecast_refresh_interval_hours: 12,
        live_refresh_interval_hours: 1,
        watttime: Some(WattTimeConfig {
            username: "operator".to_string(),
            region: "CAISO_NORTH".to_string(),
            password: SecretRef {
                name: "wt-creds".to_string(),
                namespace: None,
            },
        }),
        electricitymaps: None,
        simulator: None,
    }
}

fn seed_em_secret(secrets: &MemorySecretResolver) {
    secrets.insert(
        "default",
        "em-creds",
        HashMap::from([("apiKey".to_string(), "k3y".to_string())]),
    );
}

fn mock_em_latest(server: &mut ServerGuard, zone: &str, value: f64) -> mockito::Mock {
    server
        .mock("GET", "/free-tier/carbon-intensity/latest")
        .match_query(Matcher::UrlEncoded("zone".into(), zone.into()))
        .match_header("auth-token", "k3y")
        .with_status(200)
        .with_body(format!(
            r#"{{"zone":"{}","carbonIntensity":{},"datetime":"2030-01-01T00:00:00Z"}}"#,
            zone, value
        ))
        .create()
}

fn mock_em_forecast(server: &mut ServerGuard, zone: &str) -> mockito::Mock {
    server
        .mock("GET", "/free-tier/carbon-intensity/forecast")
        .match_query(Matcher::UrlEncoded("zone".into(), zone.into()))
        .match_header("auth-token", "k3y")
        .with_status(200)
        .with_body(format!(
            r#"{{"zone":"{}","forecast":[
                {{"carbonIntensity":305.0,"datetime":"2030-01-01T00:00:00Z"}},
                {{"carbonIntensity":290.0,"datetime":"2030-01-01T01:00:00Z"}}
            ]}}"#,
            zone
        ))
        .create()
}

#[tokio::test]
async fn first_pass_converges_a_fresh_resource() {
    let mut h = harness().await;
    seed_em_secret(&h.secrets);
    let latest = mock_em_latest(&mut h.server, "DE", 302.5);
    let forecast = mock_em_forecast(&mut h.server, "DE");

    let key = ResourceKey::new("default", "em-de");
    h.store
        .insert(key.clone(), electricitymaps_spec("DE"))
        .await
        .unwrap();

    let outcome = h.reconciler.reconcile(&key).await.unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Requeue(Duration::from_secs(3600))
    );
    latest.assert_async().await;
    forecast.assert_async().await;

    let resource = h.store.get(&key).await.unwrap().unwrap();
    let status = &resource.status;
    assert_eq!(status.provider, Some(ProviderKind::ElectricityMaps));
    assert_eq!(status.zone.as_deref(), Some("DE"));
    assert_eq!(status.carbon_intensity.as_deref(), Some("302.50"));
    assert!(status.last_forecast.is_some());
    // Live and forecast fetches from the same pass share one timestamp.
    assert_eq!(status.last_forecast, status.last_update);
    assert_eq!(
        status.next_update.unwrap() - status.last_update.unwrap(),
        ChronoDuration::hours(1)
    );

    let available = find_condition(&status.conditions, CONDITION_AVAILABLE).unwrap();
    assert_eq!(available.status, ConditionStatus::True);
    assert_eq!(available.reason, REASON_INIT_FINISHED);

    let artifact = h.artifacts.get("em-de-forecast").await.unwrap().unwrap();
    assert_eq!(artifact.provider, ProviderKind::ElectricityMaps);
    assert_eq!(artifact.zone, "DE");
    assert!(artifact.immutable);
    assert_eq!(artifact.owner, key);
    assert_eq!(artifact.labels["carbon-provider-zone"], "DE");

    let points = artifact.decode_payload().unwrap();
    assert_eq!(points.len(), 2);
    assert_eq!(points[0].carbon_intensity, 305.0);
}

#[tokio::test]
async fn steady_state_pass_skips_forecast_refresh() {
    let mut h = harness().await;
    seed_em_secret(&h.secrets);
    let latest = mock_em_latest(&mut h.server, "DE", 302.5).expect(2);
    let forecast = mock_em_forecast(&mut h.server, "DE").expect(1);

    let key = ResourceKey::new("default", "em-de");
    h.store
        .insert(key.clone(), electricitymaps_spec("DE"))
        .await
        .unwrap();

    h.reconciler.reconcile(&key).await.unwrap();
    let first = h.store.get(&key).await.unwrap().unwrap();

    h.reconciler.reconcile(&key).await.unwrap();
    let second = h.store.get(&key).await.unwrap().unwrap();

    latest.assert_async().await;
    forecast.assert_async().await;
    assert_eq!(second.status.last_forecast, first.status.last_forecast);
    assert_eq!(h.artifacts.len(), 1);
}

#[tokio::test]
async fn zone_change_forces_forecast_refresh() {
    let mut h = harness().await;
    seed_em_secret(&h.secrets);
    let latest = mock_em_latest(&mut h.server, "DE", 180.0);
    let forecast = mock_em_forecast(&mut h.server, "DE");

    let key = ResourceKey::new("default", "em-roaming");
    h.store
        .insert(key.clone(), electricitymaps_spec("DE"))
        .await
        .unwrap();

    // Previous life of this resource: zone FR, forecast fetched moments ago.
    let cache = ForecastCache::new(Arc::clone(&h.artifacts) as Arc<dyn ArtifactStore>);
    let old_points = vec![ForecastPoint {
        point_time: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
        carbon_intensity: 99.0,
    }];
    cache
        .sync(
            &key,
            &old_points,
            ProviderKind::ElectricityMaps,
            "FR",
            Utc::now(),
        )
        .await
        .unwrap();

    let mut conditions = Vec::new();
    carbon::resource::set_condition(
        &mut conditions,
        Condition::new(
            CONDITION_AVAILABLE,
            ConditionStatus::True,
            REASON_INIT_FINISHED,
            "resolved",
        ),
    );
    let stale_status = ProviderStatus {
        zone: Some("FR".to_string()),
        provider: Some(ProviderKind::ElectricityMaps),
        last_forecast: Some(Utc::now()),
        conditions,
        ..Default::default()
    };
    h.store.patch_status(&key, 1, stale_status).await.unwrap();

    h.reconciler.reconcile(&key).await.unwrap();

    // The cadence had not elapsed, yet the drifted identity forced a refresh.
    latest.assert_async().await;
    forecast.assert_async().await;

    let artifact = h
        .artifacts
        .get("em-roaming-forecast")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(artifact.zone, "DE");
    assert_eq!(artifact.decode_payload().unwrap().len(), 2);
    assert_eq!(h.artifacts.len(), 1);

    let resource = h.store.get(&key).await.unwrap().unwrap();
    assert_eq!(resource.status.zone.as_deref(), Some("DE"));
}

#[tokio::test]
async fn provider_kind_change_forces_forecast_refresh() {
    let mut h = harness().await;
    h.secrets.insert(
        "default",
        "wt-creds",
        HashMap::from([("password".to_string(), "hunter2".to_string())]),
    );

    let login = h
        .server
        .mock("GET", "/login")
        .with_status(200)
        .with_body(r#"{"token":"tok3n"}"#)
        .create();
    let index = h
        .server
        .mock("GET", "/index")
        .match_query(Matcher::UrlEncoded("ba".into(), "CAISO_NORTH".into()))
        .with_status(200)
        .with_body(r#"{"ba":"CAISO_NORTH","moer":"100"}"#)
        .create();
    let forecast = h
        .server
        .mock("GET", "/forecast")
        .match_query(Matcher::UrlEncoded("ba".into(), "CAISO_NORTH".into()))
        .with_status(200)
        .with_body(
            r#"{"forecast":[{"point_time":"2030-01-01T00:00:00Z","value":850.0}]}"#,
        )
        .create();

    let key = ResourceKey::new("default", "wt-caiso");
    h.store.insert(key.clone(), watttime_spec()).await.unwrap();

    // Previous life of this resource: simulator, forecast fetched moments ago.
    let cache = ForecastCache::new(Arc::clone(&h.artifacts) as Arc<dyn ArtifactStore>);
    cache
        .sync(
            &key,
            &[ForecastPoint {
                point_time: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
                carbon_intensity: 42.0,
            }]
            .to_vec(),
            ProviderKind::Simulator,
            "SIM-1",
            Utc::now(),
        )
        .await
        .unwrap();
    let mut conditions = Vec::new();
    carbon::resource::set_condition(
        &mut conditions,
        Condition::new(
            CONDITION_AVAILABLE,
            ConditionStatus::True,
            REASON_INIT_FINISHED,
            "resolved",
        ),
    );
    let stale_status = ProviderStatus {
        zone: Some("SIM-1".to_string()),
        provider: Some(ProviderKind::Simulator),
        last_forecast: Some(Utc::now()),
        conditions,
        ..Default::default()
    };
    h.store.patch_status(&key, 1, stale_status).await.unwrap();

    h.reconciler.reconcile(&key).await.unwrap();

    // The cadence had not elapsed, yet the new provider kind forced a refresh.
    login.assert_async().await;
    index.assert_async().await;
    forecast.assert_async().await;

    let artifact = h.artifacts.get("wt-caiso-forecast").await.unwrap().unwrap();
    assert_eq!(artifact.provider, ProviderKind::WattTime);
    assert_eq!(artifact.zone, "CAISO_NORTH");
    assert_eq!(artifact.labels["carbon-provider-type"], "watttime");
    assert_eq!(h.artifacts.len(), 1);

    let resource = h.store.get(&key).await.unwrap().unwrap();
    assert_eq!(resource.status.provider, Some(ProviderKind::WattTime));
    assert_eq!(resource.status.zone.as_deref(), Some("CAISO_NORTH"));
    assert_eq!(resource.status.carbon_intensity.as_deref(), Some("45.36"));
}

#[tokio::test]
async fn missing_credentials_fail_then_recover() {
    let mut h = harness().await;

    let key = ResourceKey::new("default", "em-de");
    h.store
        .insert(key.clone(), electricitymaps_spec("DE"))
        .await
        .unwrap();

    // No secret seeded yet: resolution fails and the condition records it.
    let result = h.reconciler.reconcile(&key).await;
    assert!(matches!(result, Err(ReconcileError::Resolve(_))));

    let resource = h.store.get(&key).await.unwrap().unwrap();
    let available = find_condition(&resource.status.conditions, CONDITION_AVAILABLE).unwrap();
    assert_eq!(available.status, ConditionStatus::False);
    assert_eq!(available.reason, REASON_INIT_FAILED);
    assert!(resource.status.last_update.is_none());

    // Operator adds the secret; the next pass converges without manual resets.
    seed_em_secret(&h.secrets);
    let latest = mock_em_latest(&mut h.server, "DE", 250.0);
    let forecast = mock_em_forecast(&mut h.server, "DE");

    h.reconciler.reconcile(&key).await.unwrap();
    latest.assert_async().await;
    forecast.assert_async().await;

    let resource = h.store.get(&key).await.unwrap().unwrap();
    let available = find_condition(&resource.status.conditions, CONDITION_AVAILABLE).unwrap();
    assert_eq!(available.status, ConditionStatus::True);
    assert_eq!(available.reason, REASON_INIT_FINISHED);
    assert_eq!(resource.status.carbon_intensity.as_deref(), Some("250.00"));
}

#[tokio::test]
async fn forecast_failure_does_not_block_live_data() {
    let mut h = harness().await;
    seed_em_secret(&h.secrets);
    let latest = mock_em_latest(&mut h.server, "DE", 412.0);
    let forecast = h
        .server
        .mock("GET", "/free-tier/carbon-intensity/forecast")
        .match_query(Matcher::UrlEncoded("zone".into(), "DE".into()))
        .with_status(500)
        .with_body(r#"{"error":"internal","message":"temporary"}"#)
        .create();

    let key = ResourceKey::new("default", "em-de");
    h.store
        .insert(key.clone(), electricitymaps_spec("DE"))
        .await
        .unwrap();

    let outcome = h.reconciler.reconcile(&key).await.unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Requeue(Duration::from_secs(3600))
    );
    latest.assert_async().await;
    forecast.assert_async().await;

    let resource = h.store.get(&key).await.unwrap().unwrap();
    assert_eq!(resource.status.carbon_intensity.as_deref(), Some("412.00"));
    // Still due: the failed fetch did not advance the forecast clock.
    assert!(resource.status.last_forecast.is_none());
    assert_eq!(h.artifacts.len(), 0);

    let available = find_condition(&resource.status.conditions, CONDITION_AVAILABLE).unwrap();
    assert_eq!(available.status, ConditionStatus::True);
}

#[tokio::test]
async fn failed_refresh_retains_previous_forecast_timestamp() {
    let mut h = harness().await;
    seed_em_secret(&h.secrets);
    let latest = mock_em_latest(&mut h.server, "DE", 210.0);
    let forecast = h
        .server
        .mock("GET", "/free-tier/carbon-intensity/forecast")
        .match_query(Matcher::UrlEncoded("zone".into(), "DE".into()))
        .with_status(503)
        .create();

    let key = ResourceKey::new("default", "em-de");
    h.store
        .insert(key.clone(), electricitymaps_spec("DE"))
        .await
        .unwrap();

    // A forecast landed 13 hours ago, so the cadence has elapsed.
    let cache = ForecastCache::new(Arc::clone(&h.artifacts) as Arc<dyn ArtifactStore>);
    let stale_forecast_at = Utc::now() - ChronoDuration::hours(13);
    cache
        .sync(
            &key,
            &[ForecastPoint {
                point_time: stale_forecast_at,
                carbon_intensity: 120.0,
            }]
            .to_vec(),
            ProviderKind::ElectricityMaps,
            "DE",
            stale_forecast_at,
        )
        .await
        .unwrap();
    let mut conditions = Vec::new();
    carbon::resource::set_condition(
        &mut conditions,
        Condition::new(
            CONDITION_AVAILABLE,
            ConditionStatus::True,
            REASON_INIT_FINISHED,
            "resolved",
        ),
    );
    let prior_status = ProviderStatus {
        zone: Some("DE".to_string()),
        provider: Some(ProviderKind::ElectricityMaps),
        last_forecast: Some(stale_forecast_at),
        conditions,
        ..Default::default()
    };
    h.store.patch_status(&key, 1, prior_status).await.unwrap();

    h.reconciler.reconcile(&key).await.unwrap();
    latest.assert_async().await;
    forecast.assert_async().await;

    let resource = h.store.get(&key).await.unwrap().unwrap();
    // The clock did not advance, so the next pass retries immediately.
    assert_eq!(resource.status.last_forecast, Some(stale_forecast_at));
    assert_eq!(resource.status.carbon_intensity.as_deref(), Some("210.00"));

    let artifact = h.artifacts.get("em-de-forecast").await.unwrap().unwrap();
    assert_eq!(artifact.decode_payload().unwrap()[0].carbon_intensity, 120.0);
}

#[tokio::test]
async fn unparseable_live_value_reports_sentinel() {
    let mut h = harness().await;
    h.secrets.insert(
        "default",
        "wt-creds",
        HashMap::from([("password".to_string(), "hunter2".to_string())]),
    );

    let login = h
        .server
        .mock("GET", "/login")
        .with_status(200)
        .with_body(r#"{"token":"tok3n"}"#)
        .create();
    let index = h
        .server
        .mock("GET", "/index")
        .match_query(Matcher::UrlEncoded("ba".into(), "CAISO_NORTH".into()))
        .with_status(200)
        .with_body(r#"{"ba":"CAISO_NORTH","moer":"not-a-number"}"#)
        .create();
    h.server
        .mock("GET", "/forecast")
        .match_query(Matcher::UrlEncoded("ba".into(), "CAISO_NORTH".into()))
        .with_status(200)
        .with_body(
            r#"{"forecast":[{"point_time":"2030-01-01T00:00:00Z","value":850.0}]}"#,
        )
        .create();

    let key = ResourceKey::new("default", "wt-caiso");
    h.store.insert(key.clone(), watttime_spec()).await.unwrap();

    h.reconciler.reconcile(&key).await.unwrap();
    login.assert_async().await;
    index.assert_async().await;

    let resource = h.store.get(&key).await.unwrap().unwrap();
    // The source answered but had no usable value.
    assert_eq!(resource.status.carbon_intensity.as_deref(), Some("n/a"));
    assert_eq!(resource.status.provider, Some(ProviderKind::WattTime));

    let available = find_condition(&resource.status.conditions, CONDITION_AVAILABLE).unwrap();
    assert_eq!(available.status, ConditionStatus::True);
}

#[tokio::test]
async fn repeated_passes_are_idempotent() {
    let mut h = harness().await;
    seed_em_secret(&h.secrets);
    mock_em_latest(&mut h.server, "DE", 302.5).expect_at_least(3);
    mock_em_forecast(&mut h.server, "DE").expect(1);

    let key = ResourceKey::new("default", "em-de");
    h.store
        .insert(key.clone(), electricitymaps_spec("DE"))
        .await
        .unwrap();

    h.reconciler.reconcile(&key).await.unwrap();
    let baseline = h.store.get(&key).await.unwrap().unwrap();
    let baseline_available =
        find_condition(&baseline.status.conditions, CONDITION_AVAILABLE)
            .unwrap()
            .clone();

    for _ in 0..2 {
        h.reconciler.reconcile(&key).await.unwrap();
    }

    let converged = h.store.get(&key).await.unwrap().unwrap();
    assert_eq!(converged.status.last_forecast, baseline.status.last_forecast);
    assert_eq!(
        converged.status.carbon_intensity,
        baseline.status.carbon_intensity
    );
    assert_eq!(h.artifacts.len(), 1);

    // Unchanged condition status keeps its original transition time.
    let converged_available =
        find_condition(&converged.status.conditions, CONDITION_AVAILABLE).unwrap();
    assert_eq!(
        converged_available.last_transition_time,
        baseline_available.last_transition_time
    );
}
