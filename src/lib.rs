//! # Carbon
//!
//! A reconciliation service for carbon-intensity data providers. Declared
//! provider resources are continuously converged: the service resolves each
//! declaration into a concrete data source, fetches live carbon intensity on
//! its cadence, maintains a derived forecast artifact, and reports progress
//! through status conditions.
//!
//! ## Modules
//!
//! - [`resource`] - Provider resource model, conditions, and the store
//! - [`provider`] - Data source implementations and the resolver
//! - [`artifact`] - Forecast artifact lifecycle
//! - [`status`] - Conditional status patching
//! - [`reconcile`] - The reconciliation pass itself
//! - [`dispatch`] - Work queue and worker pool
//! - [`telemetry`] - Time-series sink for intensity values
//! - [`metrics`] - Prometheus metrics
//! - [`config`] - Layered TOML configuration
//! - [`cli`] - Command-line interface

pub mod artifact;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod logging;
pub mod metrics;
pub mod provider;
pub mod reconcile;
pub mod resource;
pub mod status;
pub mod telemetry;
