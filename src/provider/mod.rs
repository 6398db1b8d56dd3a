//! Provider abstraction layer.
//!
//! This module provides the [`Provider`] trait and supporting types that
//! abstract source-specific logic for fetching live carbon intensity and
//! forecasts from external data sources.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod electricitymaps;
pub mod error;
pub mod resolver;
pub mod secrets;
pub mod simulator;
pub mod watttime;

pub use error::ProviderError;
pub use resolver::{resolve, ProviderEndpoints, ResolveError};
pub use secrets::{MemorySecretResolver, SecretError, SecretResolver};

use crate::resource::ProviderKind;

/// Per-request timeout applied to every provider HTTP call.
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// One predicted (time, intensity) point, in g CO2-eq per kWh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    #[serde(rename = "pointTime")]
    pub point_time: DateTime<Utc>,
    #[serde(rename = "carbonIntensity")]
    pub carbon_intensity: f64,
}

/// Ordered sequence of forecast points. Empty when a fetch failed, in which
/// case the previous forecast state is left untouched by the caller.
pub type Forecast = Vec<ForecastPoint>;

/// Unified interface for all carbon-intensity data sources.
///
/// Encapsulates source-specific HTTP protocols, response parsing, and unit
/// normalization. Resolution (including any login handshake) happens once per
/// pass in [`resolver::resolve`]; the returned instance is held immutable for
/// the rest of the pass.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Which source this instance talks to.
    fn kind(&self) -> ProviderKind;

    /// Current carbon intensity for a zone in g/kWh.
    ///
    /// `Ok(None)` is the explicit no-value sentinel: the source answered but
    /// has no usable value. `Err` means the request itself failed.
    async fn get_current(&self, zone: &str) -> Result<Option<f64>, ProviderError>;

    /// Forward-looking forecast for a zone.
    async fn get_forecast(&self, zone: &str) -> Result<Forecast, ProviderError>;
}

/// Decode a non-200 response into a structured API error.
///
/// Both HTTP surfaces return a `{error, message}` body on failure; when the
/// body does not parse, the HTTP status alone is reported.
pub(crate) async fn decode_api_error(response: reqwest::Response) -> ProviderError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();

    match serde_json::from_str::<std::collections::HashMap<String, String>>(&body) {
        Ok(payload) => ProviderError::Api {
            status,
            code: payload.get("error").cloned().unwrap_or_default(),
            message: payload.get("message").cloned().unwrap_or_default(),
        },
        Err(_) => ProviderError::Api {
            status,
            code: String::new(),
            message: body,
        },
    }
}

/// Map a reqwest failure onto the provider error taxonomy.
pub(crate) fn classify_request_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(REQUEST_TIMEOUT_SECS)
    } else {
        ProviderError::Network(e.to_string())
    }
}
