//! Provider resolver: maps a declared spec onto one concrete provider.

use super::electricitymaps::{ElectricityMapsProvider, ELECTRICITY_MAPS_BASE_URL};
use super::secrets::{require_key, SecretError, SecretResolver};
use super::simulator::SimulatorProvider;
use super::watttime::{WattTimeProvider, WATTTIME_BASE_URL};
use super::{Provider, ProviderError};
use crate::resource::{ProviderKind, ProviderSpec, ResourceKey};
use reqwest::Client;
use std::sync::Arc;
use thiserror::Error;

/// Base URLs for the networked providers, overridable in tests.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub watttime: String,
    pub electricitymaps: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            watttime: WATTTIME_BASE_URL.to_string(),
            electricitymaps: ELECTRICITY_MAPS_BASE_URL.to_string(),
        }
    }
}

/// Errors during provider resolution. All of them are terminal for the pass
/// and surface as an `InitFailed` condition.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Declared kind has no matching sub-config. A declaration problem, not
    /// a retryable fault.
    #[error("provider '{0}' is missing its configuration block")]
    ConfigurationMissing(ProviderKind),

    #[error("fetching credentials failed: {0}")]
    CredentialFetchFailed(#[from] SecretError),

    /// Construction or login handshake failed.
    #[error("unable to initialize {kind} provider: {source}")]
    ProviderInitFailed {
        kind: ProviderKind,
        #[source]
        source: ProviderError,
    },
}

/// Resolve the declared spec into a provider instance and its zone.
///
/// Credentials are fetched where the kind requires them; WattTime additionally
/// performs its login handshake here so a bad credential fails the pass up
/// front rather than mid-fetch.
pub async fn resolve(
    key: &ResourceKey,
    spec: &ProviderSpec,
    secrets: &dyn SecretResolver,
    client: Arc<Client>,
    endpoints: &ProviderEndpoints,
) -> Result<(Arc<dyn Provider>, String), ResolveError> {
    let init_failed = |source| ResolveError::ProviderInitFailed {
        kind: spec.provider,
        source,
    };

    match spec.provider {
        ProviderKind::WattTime => {
            let config = spec
                .watttime
                .as_ref()
                .ok_or(ResolveError::ConfigurationMissing(spec.provider))?;

            let data = secrets.resolve(&config.password, &key.namespace).await?;
            let password = require_key(&config.password.name, &data, "password")?;

            let provider = WattTimeProvider::connect(
                &endpoints.watttime,
                &config.username,
                &password,
                client,
            )
            .await
            .map_err(init_failed)?;

            Ok((Arc::new(provider), config.region.clone()))
        }
        ProviderKind::ElectricityMaps => {
            let config = spec
                .electricitymaps
                .as_ref()
                .ok_or(ResolveError::ConfigurationMissing(spec.provider))?;

            let data = secrets.resolve(&config.api_key, &key.namespace).await?;
            let api_key = require_key(&config.api_key.name, &data, "apiKey")?;

            let provider = ElectricityMapsProvider::new(
                &endpoints.electricitymaps,
                api_key,
                config.subscription,
                config.commercial_trial_endpoint.as_deref(),
                client,
            )
            .map_err(init_failed)?;

            Ok((Arc::new(provider), config.zone.clone()))
        }
        ProviderKind::Simulator => {
            let config = spec
                .simulator
                .as_ref()
                .ok_or(ResolveError::ConfigurationMissing(spec.provider))?;

            let provider = SimulatorProvider::new(config.randomize).map_err(init_failed)?;
            Ok((Arc::new(provider), config.zone.clone()))
        }
    }
}
