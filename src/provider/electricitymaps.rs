//! ElectricityMaps provider implementation.
//!
//! Commercial data API: stateless per call beyond the stored API key and the
//! subscription-resolved base path. All requests carry the zone as a query
//! parameter and the key in an `auth-token` header.

use super::{
    classify_request_error, decode_api_error, Forecast, ForecastPoint, Provider, ProviderError,
    REQUEST_TIMEOUT_SECS,
};
use crate::resource::{ProviderKind, Subscription};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Production API base.
pub const ELECTRICITY_MAPS_BASE_URL: &str = "https://api-access.electricitymaps.com";

/// Fixed endpoint suffix for the free tier.
const FREE_TIER_PATH: &str = "/free-tier";

pub struct ElectricityMapsProvider {
    base_url: String,
    /// Subscription-dependent path segment between base and endpoints.
    subscription_path: String,
    api_key: String,
    client: Arc<Client>,
}

#[derive(Deserialize)]
struct LatestResponse {
    #[serde(rename = "carbonIntensity")]
    carbon_intensity: f64,
}

#[derive(Deserialize)]
struct ForecastResponse {
    forecast: Vec<ForecastEntry>,
}

#[derive(Deserialize)]
struct ForecastEntry {
    #[serde(rename = "carbonIntensity")]
    carbon_intensity: f64,
    datetime: DateTime<Utc>,
}

impl ElectricityMapsProvider {
    /// Build a provider for the requested subscription tier.
    ///
    /// A commercial trial needs its operator-supplied endpoint suffix; asking
    /// for one without it is a configuration error.
    pub fn new(
        base_url: &str,
        api_key: String,
        subscription: Subscription,
        commercial_trial_endpoint: Option<&str>,
        client: Arc<Client>,
    ) -> Result<Self, ProviderError> {
        let subscription_path = match subscription {
            Subscription::Commercial => String::new(),
            Subscription::CommercialTrial => commercial_trial_endpoint
                .map(str::to_string)
                .ok_or_else(|| {
                    ProviderError::Configuration(
                        "commercial trial subscription requires an endpoint".into(),
                    )
                })?,
            Subscription::FreeTier => FREE_TIER_PATH.to_string(),
        };

        Ok(Self {
            base_url: base_url.to_string(),
            subscription_path,
            api_key,
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, self.subscription_path, path)
    }
}

#[async_trait]
impl Provider for ElectricityMapsProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::ElectricityMaps
    }

    async fn get_current(&self, zone: &str) -> Result<Option<f64>, ProviderError> {
        let url = self.endpoint("/carbon-intensity/latest");

        let response = self
            .client
            .get(&url)
            .query(&[("zone", zone)])
            .header("auth-token", &self.api_key)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .send()
            .await
            .map_err(classify_request_error)?;

        if !response.status().is_success() {
            return Err(decode_api_error(response).await);
        }

        let latest: LatestResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("latest response: {}", e)))?;

        Ok(Some(latest.carbon_intensity))
    }

    async fn get_forecast(&self, zone: &str) -> Result<Forecast, ProviderError> {
        let url = self.endpoint("/carbon-intensity/forecast");

        let response = self
            .client
            .get(&url)
            .query(&[("zone", zone)])
            .header("auth-token", &self.api_key)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .send()
            .await
            .map_err(classify_request_error)?;

        if !response.status().is_success() {
            return Err(decode_api_error(response).await);
        }

        let payload: ForecastResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("forecast response: {}", e)))?;

        let mut points: Forecast = payload
            .forecast
            .into_iter()
            .map(|entry| ForecastPoint {
                point_time: entry.datetime,
                carbon_intensity: entry.carbon_intensity,
            })
            .collect();
        points.sort_by_key(|p| p.point_time);

        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn free_tier(server: &Server) -> ElectricityMapsProvider {
        ElectricityMapsProvider::new(
            &server.url(),
            "k-123".to_string(),
            Subscription::FreeTier,
            None,
            Arc::new(Client::new()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn free_tier_uses_fixed_suffix() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/free-tier/carbon-intensity/latest")
            .match_query(mockito::Matcher::UrlEncoded("zone".into(), "DE".into()))
            .match_header("auth-token", "k-123")
            .with_status(200)
            .with_body(r#"{"zone":"DE","carbonIntensity":312.0,"datetime":"2023-02-13T11:00:00Z"}"#)
            .create();

        let value = free_tier(&server).get_current("DE").await.unwrap();

        mock.assert_async().await;
        assert_eq!(value, Some(312.0));
    }

    #[tokio::test]
    async fn commercial_uses_bare_path() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/carbon-intensity/latest")
            .match_query(mockito::Matcher::UrlEncoded("zone".into(), "DE".into()))
            .with_status(200)
            .with_body(r#"{"carbonIntensity":290.5}"#)
            .create();

        let provider = ElectricityMapsProvider::new(
            &server.url(),
            "k-123".to_string(),
            Subscription::Commercial,
            None,
            Arc::new(Client::new()),
        )
        .unwrap();
        let value = provider.get_current("DE").await.unwrap();

        mock.assert_async().await;
        assert_eq!(value, Some(290.5));
    }

    #[tokio::test]
    async fn trial_without_endpoint_is_configuration_error() {
        let result = ElectricityMapsProvider::new(
            ELECTRICITY_MAPS_BASE_URL,
            "k-123".to_string(),
            Subscription::CommercialTrial,
            None,
            Arc::new(Client::new()),
        );
        assert!(matches!(result, Err(ProviderError::Configuration(_))));
    }

    #[tokio::test]
    async fn trial_endpoint_prefixes_requests() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/trial-42/carbon-intensity/forecast")
            .match_query(mockito::Matcher::UrlEncoded("zone".into(), "DE".into()))
            .with_status(200)
            .with_body(
                r#"{"zone":"DE","forecast":[
                    {"carbonIntensity":305,"datetime":"2023-02-13T12:00:00Z"},
                    {"carbonIntensity":298,"datetime":"2023-02-13T13:00:00Z"}
                ],"updatedAt":"2023-02-13T11:00:00Z"}"#,
            )
            .create();

        let provider = ElectricityMapsProvider::new(
            &server.url(),
            "k-123".to_string(),
            Subscription::CommercialTrial,
            Some("/trial-42"),
            Arc::new(Client::new()),
        )
        .unwrap();
        let forecast = provider.get_forecast("DE").await.unwrap();

        mock.assert_async().await;
        assert_eq!(forecast.len(), 2);
        assert_eq!(forecast[0].carbon_intensity, 305.0);
    }

    #[tokio::test]
    async fn api_error_body_is_decoded() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/free-tier/carbon-intensity/latest")
            .match_query(mockito::Matcher::Any)
            .with_status(401)
            .with_body(r#"{"error":"unauthorized","message":"invalid token"}"#)
            .create();

        let result = free_tier(&server).get_current("DE").await;
        match result {
            Err(ProviderError::Api {
                status,
                code,
                message,
            }) => {
                assert_eq!(status, 401);
                assert_eq!(code, "unauthorized");
                assert_eq!(message, "invalid token");
            }
            other => panic!("expected Api error, got {:?}", other.map(|_| ())),
        }
    }
}
