//! Spec and status types for provider resources.

use super::Condition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported carbon-intensity data sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Metered utility API (basic-auth login handshake, MOER index).
    WattTime,
    /// Commercial data API with subscription tiers.
    ElectricityMaps,
    /// Synthetic provider for development and test environments.
    Simulator,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::WattTime => "watttime",
            ProviderKind::ElectricityMaps => "electricitymaps",
            ProviderKind::Simulator => "simulator",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emissions signal carried by the provider's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmissionsType {
    #[default]
    Average,
    Marginal,
}

/// Reference to a named secret in the external secret store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// ElectricityMaps subscription tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Subscription {
    Commercial,
    CommercialTrial,
    #[default]
    FreeTier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WattTimeConfig {
    pub username: String,
    /// Balancing authority, e.g. "CAISO_NORTH".
    pub region: String,
    pub password: SecretRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectricityMapsConfig {
    #[serde(default)]
    pub subscription: Subscription,
    /// Endpoint suffix issued with a commercial trial; required for that tier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commercial_trial_endpoint: Option<String>,
    pub zone: String,
    pub api_key: SecretRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub zone: String,
    /// Draw values uniformly within the embedded sample envelope instead of
    /// replaying the samples verbatim.
    pub randomize: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            zone: "SIM-1".to_string(),
            randomize: false,
        }
    }
}

fn default_forecast_interval() -> u32 {
    12
}

fn default_live_interval() -> u32 {
    1
}

/// Desired state of a provider resource. Immutable within a single pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub provider: ProviderKind,

    #[serde(default)]
    pub emissions_type: EmissionsType,

    /// Hours between forecast refreshes, bounded [12, 24].
    #[serde(default = "default_forecast_interval")]
    pub forecast_refresh_interval_hours: u32,

    /// Hours between live value refreshes, bounded [1, 24].
    #[serde(default = "default_live_interval")]
    pub live_refresh_interval_hours: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watttime: Option<WattTimeConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub electricitymaps: Option<ElectricityMapsConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulator: Option<SimulatorConfig>,
}

/// Observed state, owned exclusively by the reconciler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProviderStatus {
    pub zone: Option<String>,
    pub provider: Option<ProviderKind>,
    pub last_forecast: Option<DateTime<Utc>>,
    pub last_update: Option<DateTime<Utc>>,
    pub next_update: Option<DateTime<Utc>>,
    /// Formatted g/kWh value, or the "n/a" sentinel when the provider
    /// reported no value.
    pub carbon_intensity: Option<String>,
    pub conditions: Vec<Condition>,
}

/// One provider resource as read from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResource {
    pub key: super::ResourceKey,
    pub spec: ProviderSpec,
    #[serde(default)]
    pub status: ProviderStatus,
    /// Optimistic concurrency token, bumped by every status patch.
    #[serde(default)]
    pub resource_version: u64,
}
