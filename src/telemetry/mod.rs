//! Telemetry sink for time-series storage of intensity values.
//!
//! The reconciler pushes the live value and refreshed forecasts here after a
//! successful pass. Sink failures are logged by the caller and never fail a
//! pass.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Measurement name for live intensity points.
pub const MEASUREMENT_LIVE: &str = "carbon_intensity_live";
/// Measurement name for forecast points.
pub const MEASUREMENT_FORECAST: &str = "carbon_intensity_forecast";
/// Field key attached to every point.
const FIELD_NAME: &str = "gco2eq_per_kwh";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry write failed: {0}")]
    Write(String),

    #[error("telemetry sink rejected write: HTTP {0}")]
    Rejected(u16),
}

/// Receives measurement points for time-series storage.
///
/// `points` maps timestamps to g/kWh values; an empty set is a no-op.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn push(
        &self,
        measurement: &str,
        tags: &[(&str, &str)],
        points: &BTreeMap<DateTime<Utc>, f64>,
    ) -> Result<(), TelemetryError>;
}

/// Sink that drops everything; used when telemetry is disabled.
pub struct NoopSink;

#[async_trait]
impl TelemetrySink for NoopSink {
    async fn push(
        &self,
        _measurement: &str,
        _tags: &[(&str, &str)],
        _points: &BTreeMap<DateTime<Utc>, f64>,
    ) -> Result<(), TelemetryError> {
        Ok(())
    }
}

/// InfluxDB v2 sink writing line protocol over HTTP.
pub struct InfluxSink {
    url: String,
    org: String,
    bucket: String,
    token: String,
    client: Arc<Client>,
}

impl InfluxSink {
    pub fn new(
        url: impl Into<String>,
        org: impl Into<String>,
        bucket: impl Into<String>,
        token: impl Into<String>,
        client: Arc<Client>,
    ) -> Self {
        Self {
            url: url.into(),
            org: org.into(),
            bucket: bucket.into(),
            token: token.into(),
            client,
        }
    }

    fn encode_lines(
        measurement: &str,
        tags: &[(&str, &str)],
        points: &BTreeMap<DateTime<Utc>, f64>,
    ) -> String {
        let mut lines = String::new();
        for (timestamp, value) in points {
            lines.push_str(&escape_identifier(measurement));
            for (key, tag_value) in tags {
                lines.push(',');
                lines.push_str(&escape_identifier(key));
                lines.push('=');
                lines.push_str(&escape_identifier(tag_value));
            }
            lines.push(' ');
            lines.push_str(FIELD_NAME);
            lines.push('=');
            lines.push_str(&value.to_string());
            lines.push(' ');
            lines.push_str(
                &timestamp
                    .timestamp_nanos_opt()
                    .unwrap_or_else(|| timestamp.timestamp_millis() * 1_000_000)
                    .to_string(),
            );
            lines.push('\n');
        }
        lines
    }
}

/// Escape measurement/tag tokens for line protocol.
fn escape_identifier(raw: &str) -> String {
    raw.replace(' ', "\\ ").replace(',', "\\,").replace('=', "\\=")
}

#[async_trait]
impl TelemetrySink for InfluxSink {
    async fn push(
        &self,
        measurement: &str,
        tags: &[(&str, &str)],
        points: &BTreeMap<DateTime<Utc>, f64>,
    ) -> Result<(), TelemetryError> {
        if points.is_empty() {
            return Ok(());
        }

        let body = Self::encode_lines(measurement, tags, points);
        let url = format!("{}/api/v2/write", self.url);

        let response = self
            .client
            .post(&url)
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header("authorization", format!("Token {}", self.token))
            .header("content-type", "text/plain; charset=utf-8")
            .body(body)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| TelemetryError::Write(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TelemetryError::Rejected(response.status().as_u16()));
        }

        Ok(())
    }
}
