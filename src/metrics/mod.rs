//! # Metrics Module
//!
//! Prometheus metrics for the reconciliation loop, exported through the
//! `metrics` facade with the Prometheus exporter's built-in HTTP listener.
//!
//! ## Metrics Tracked
//!
//! **Counters:**
//! - `carbon_reconciliations_total{resource, provider_kind, zone}` - Successful passes
//! - `carbon_reconciliation_errors_total{resource, reason}` - Failed passes
//!
//! **Gauges:**
//! - `carbon_live_intensity_gco2eq_per_kwh{provider_kind, zone}` - Last observed live value
//! - `carbon_queue_depth` - Keys waiting in the work queue

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use thiserror::Error;

pub const RECONCILIATIONS_TOTAL: &str = "carbon_reconciliations_total";
pub const RECONCILIATION_ERRORS_TOTAL: &str = "carbon_reconciliation_errors_total";
pub const LIVE_INTENSITY_GAUGE: &str = "carbon_live_intensity_gco2eq_per_kwh";
pub const QUEUE_DEPTH_GAUGE: &str = "carbon_queue_depth";

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("invalid metrics listen address '{0}': {1}")]
    InvalidListenAddress(String, std::net::AddrParseError),

    #[error("failed to install Prometheus exporter: {0}")]
    Exporter(#[from] metrics_exporter_prometheus::BuildError),
}

/// Install the Prometheus recorder and start its scrape endpoint.
///
/// The exporter serves `GET /metrics` on `listen` from a background task on
/// the current tokio runtime.
pub fn setup_metrics(listen: &str) -> Result<(), MetricsError> {
    let addr: SocketAddr = listen
        .parse()
        .map_err(|e| MetricsError::InvalidListenAddress(listen.to_string(), e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    describe_counter!(
        RECONCILIATIONS_TOTAL,
        "Total reconciliation passes that ran to completion"
    );
    describe_counter!(
        RECONCILIATION_ERRORS_TOTAL,
        "Total reconciliation passes that ended in an error"
    );
    describe_gauge!(
        LIVE_INTENSITY_GAUGE,
        "Most recently observed live carbon intensity in gCO2eq/kWh"
    );
    describe_gauge!(QUEUE_DEPTH_GAUGE, "Keys currently waiting in the work queue");

    Ok(())
}
