//! Configuration module for the carbon operator
//!
//! Provides layered configuration loading from files, environment variables,
//! and defaults.
//!
//! # Configuration Precedence
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`CARBON_*`)
//! 3. Configuration file (TOML)
//! 4. Default values (lowest priority)
//!
//! # Example
//!
//! ```rust
//! use carbon::config::CarbonConfig;
//!
//! let toml = r#"
//! [[providers]]
//! name = "sim"
//! provider = "simulator"
//!
//! [providers.simulator]
//! zone = "SIM-1"
//! "#;
//! let config: CarbonConfig = toml::from_str(toml).unwrap();
//! assert_eq!(config.providers.len(), 1);
//! ```

pub mod error;
pub mod logging;

pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};

// Dispatch tuning lives with the worker pool it configures.
pub use crate::dispatch::DispatchConfig;

use crate::resource::ProviderSpec;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;

fn default_namespace() -> String {
    "default".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_listen() -> String {
    "0.0.0.0:9090".to_string()
}

/// One declared provider resource.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderResourceConfig {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(flatten)]
    pub spec: ProviderSpec,
}

/// One secret made available to the credential resolver.
#[derive(Debug, Clone, Deserialize)]
pub struct SecretConfig {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub data: HashMap<String, String>,
}

/// Time-series sink settings. Disabled by default; when enabled the
/// connection fields are all required.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub url: String,
    pub org: String,
    pub bucket: String,
    pub token: String,
}

/// Prometheus exporter settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            listen: default_metrics_listen(),
        }
    }
}

/// Unified configuration for the operator binary.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CarbonConfig {
    pub logging: LoggingConfig,
    pub dispatch: DispatchConfig,
    pub telemetry: TelemetryConfig,
    pub metrics: MetricsConfig,
    pub providers: Vec<ProviderResourceConfig>,
    pub secrets: Vec<SecretConfig>,
}

impl CarbonConfig {
    /// Load configuration from a TOML file.
    ///
    /// `None` returns defaults; a missing path is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.to_path_buf()));
                }
                let content = std::fs::read_to_string(p)?;
                toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply `CARBON_*` environment variable overrides.
    ///
    /// Invalid values are silently ignored (previous values are kept).
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(level) = std::env::var("CARBON_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("CARBON_LOG_FORMAT") {
            if let Ok(f) = format.parse() {
                self.logging.format = f;
            }
        }

        if let Ok(metrics) = std::env::var("CARBON_METRICS") {
            self.metrics.enabled = metrics.to_lowercase() == "true";
        }
        if let Ok(listen) = std::env::var("CARBON_METRICS_LISTEN") {
            self.metrics.listen = listen;
        }

        if let Ok(telemetry) = std::env::var("CARBON_TELEMETRY") {
            self.telemetry.enabled = telemetry.to_lowercase() == "true";
        }
        if let Ok(url) = std::env::var("CARBON_INFLUX_URL") {
            self.telemetry.url = url;
        }
        if let Ok(org) = std::env::var("CARBON_INFLUX_ORG") {
            self.telemetry.org = org;
        }
        if let Ok(bucket) = std::env::var("CARBON_INFLUX_BUCKET") {
            self.telemetry.bucket = bucket;
        }
        if let Ok(token) = std::env::var("CARBON_INFLUX_TOKEN") {
            self.telemetry.token = token;
        }

        if let Ok(workers) = std::env::var("CARBON_WORKERS") {
            if let Ok(w) = workers.parse() {
                self.dispatch.workers = w;
            }
        }

        self
    }

    /// Validate cross-field constraints before the service starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for provider in &self.providers {
            if !seen.insert((provider.namespace.clone(), provider.name.clone())) {
                return Err(ConfigError::Validation {
                    field: "providers".to_string(),
                    message: format!(
                        "duplicate provider resource {}/{}",
                        provider.namespace, provider.name
                    ),
                });
            }

            let field = format!("providers.{}", provider.name);
            let forecast = provider.spec.forecast_refresh_interval_hours;
            if !(12..=24).contains(&forecast) {
                return Err(ConfigError::Validation {
                    field: field.clone(),
                    message: format!(
                        "forecast_refresh_interval_hours must be within [12, 24], got {}",
                        forecast
                    ),
                });
            }
            let live = provider.spec.live_refresh_interval_hours;
            if !(1..=24).contains(&live) {
                return Err(ConfigError::Validation {
                    field: field.clone(),
                    message: format!(
                        "live_refresh_interval_hours must be within [1, 24], got {}",
                        live
                    ),
                });
            }

            use crate::resource::ProviderKind;
            let has_sub_config = match provider.spec.provider {
                ProviderKind::WattTime => provider.spec.watttime.is_some(),
                ProviderKind::ElectricityMaps => provider.spec.electricitymaps.is_some(),
                ProviderKind::Simulator => provider.spec.simulator.is_some(),
            };
            if !has_sub_config {
                return Err(ConfigError::Validation {
                    field,
                    message: format!(
                        "provider '{}' requires its configuration block",
                        provider.spec.provider
                    ),
                });
            }
        }

        if self.telemetry.enabled {
            for (name, value) in [
                ("url", &self.telemetry.url),
                ("org", &self.telemetry.org),
                ("bucket", &self.telemetry.bucket),
                ("token", &self.telemetry.token),
            ] {
                if value.is_empty() {
                    return Err(ConfigError::Validation {
                        field: format!("telemetry.{}", name),
                        message: "required when telemetry is enabled".to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}
