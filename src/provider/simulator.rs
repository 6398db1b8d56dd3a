//! Synthetic provider for development and test environments.
//!
//! Replays an embedded historical sample set; no network access. Deterministic
//! mode returns the embedded "latest" value and re-times the embedded forecast
//! hourly from invocation time. Randomized mode draws uniformly within the
//! min/max envelope precomputed from the embedded forecast.

use super::{Forecast, ForecastPoint, Provider, ProviderError};
use crate::resource::ProviderKind;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Deserialize;

static LATEST: &str = include_str!("data/latest.json");
static FORECAST: &str = include_str!("data/forecast.json");

/// Number of hourly points in a simulated forecast.
const FORECAST_POINTS: usize = 24;

pub struct SimulatorProvider {
    randomize: bool,
    /// Embedded "latest" value, replayed in deterministic mode.
    latest: f64,
    /// Embedded forecast values, replayed in order in deterministic mode.
    samples: Vec<f64>,
    /// (min, max) over the embedded samples, for the randomized draw.
    envelope: (f64, f64),
}

#[derive(Deserialize)]
struct LatestSample {
    #[serde(rename = "carbonIntensity")]
    carbon_intensity: f64,
}

#[derive(Deserialize)]
struct ForecastSample {
    forecast: Vec<ForecastSampleEntry>,
}

#[derive(Deserialize)]
struct ForecastSampleEntry {
    #[serde(rename = "carbonIntensity")]
    carbon_intensity: f64,
    #[allow(dead_code)]
    datetime: DateTime<Utc>,
}

impl SimulatorProvider {
    pub fn new(randomize: bool) -> Result<Self, ProviderError> {
        let latest: LatestSample = serde_json::from_str(LATEST)
            .map_err(|e| ProviderError::InvalidResponse(format!("embedded latest sample: {}", e)))?;
        let historical: ForecastSample = serde_json::from_str(FORECAST).map_err(|e| {
            ProviderError::InvalidResponse(format!("embedded forecast sample: {}", e))
        })?;

        let samples: Vec<f64> = historical
            .forecast
            .iter()
            .map(|entry| entry.carbon_intensity)
            .collect();
        if samples.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "embedded forecast sample is empty".into(),
            ));
        }

        let min = samples.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        Ok(Self {
            randomize,
            latest: latest.carbon_intensity,
            samples,
            envelope: (min, max),
        })
    }

    fn draw(&self) -> f64 {
        let (min, max) = self.envelope;
        rand::thread_rng().gen_range(min..=max)
    }
}

#[async_trait]
impl Provider for SimulatorProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Simulator
    }

    async fn get_current(&self, _zone: &str) -> Result<Option<f64>, ProviderError> {
        if self.randomize {
            Ok(Some(self.draw()))
        } else {
            Ok(Some(self.latest))
        }
    }

    async fn get_forecast(&self, _zone: &str) -> Result<Forecast, ProviderError> {
        let start = Utc::now();

        let points = (0..FORECAST_POINTS)
            .map(|i| {
                let carbon_intensity = if self.randomize {
                    self.draw()
                } else {
                    self.samples[i % self.samples.len()]
                };
                ForecastPoint {
                    point_time: start + Duration::hours(i as i64),
                    carbon_intensity,
                }
            })
            .collect();

        Ok(points)
    }
}
