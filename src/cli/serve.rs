//! Serve command implementation

use crate::artifact::MemoryArtifactStore;
use crate::cli::ServeArgs;
use crate::config::CarbonConfig;
use crate::dispatch::{Dispatcher, WorkQueue};
use crate::logging::init_tracing;
use crate::metrics::setup_metrics;
use crate::provider::{MemorySecretResolver, SecretResolver};
use crate::reconcile::Reconciler;
use crate::resource::{MemoryResourceStore, ResourceKey, ResourceStore};
use crate::telemetry::{InfluxSink, NoopSink, TelemetrySink};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Load configuration with CLI overrides
pub fn load_config_with_overrides(
    args: &ServeArgs,
) -> Result<CarbonConfig, Box<dyn std::error::Error>> {
    // Load from file if it exists, otherwise use defaults
    let mut config = if args.config.exists() {
        CarbonConfig::load(Some(&args.config))?
    } else {
        tracing::debug!("Config file not found, using defaults");
        CarbonConfig::default()
    };

    // Apply environment variable overrides
    config = config.with_env_overrides();

    // Apply CLI overrides (highest priority)
    if let Some(ref log_level) = args.log_level {
        config.logging.level = log_level.clone();
    }
    if args.no_metrics {
        config.metrics.enabled = false;
    }

    Ok(config)
}

/// Wait for SIGINT or SIGTERM, then trip the cancellation token.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        }
    }

    cancel.cancel();
}

/// Main serve command handler
pub async fn run_serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load, merge, and validate configuration
    let config = load_config_with_overrides(&args)?;
    config.validate()?;

    // 2. Initialize tracing
    init_tracing(&config.logging)?;

    tracing::info!("Starting carbon operator");
    tracing::debug!(
        dispatch = ?config.dispatch,
        providers = config.providers.len(),
        "Loaded configuration"
    );

    // 3. Prometheus exporter
    if config.metrics.enabled {
        setup_metrics(&config.metrics.listen)?;
        tracing::info!(listen = %config.metrics.listen, "Prometheus exporter listening");
    } else {
        tracing::info!("Metrics exporter disabled");
    }

    // 4. Seed the stores from configuration
    let store = Arc::new(MemoryResourceStore::new());
    for provider in &config.providers {
        let key = ResourceKey::new(provider.namespace.clone(), provider.name.clone());
        store.insert(key.clone(), provider.spec.clone()).await?;
        tracing::info!(
            resource = %key,
            provider = %provider.spec.provider,
            "Declared provider resource"
        );
    }

    let secrets = MemorySecretResolver::new();
    for secret in &config.secrets {
        secrets.insert(
            secret.namespace.clone(),
            secret.name.clone(),
            secret.data.clone(),
        );
    }
    let secrets: Arc<dyn SecretResolver> = Arc::new(secrets);

    let artifacts = Arc::new(MemoryArtifactStore::new());

    // 5. Telemetry sink
    let http = Reconciler::default_http_client()?;
    let telemetry: Arc<dyn TelemetrySink> = if config.telemetry.enabled {
        tracing::info!(url = %config.telemetry.url, bucket = %config.telemetry.bucket, "Telemetry sink enabled");
        Arc::new(InfluxSink::new(
            config.telemetry.url.clone(),
            config.telemetry.org.clone(),
            config.telemetry.bucket.clone(),
            config.telemetry.token.clone(),
            Arc::clone(&http),
        ))
    } else {
        Arc::new(NoopSink)
    };

    // 6. Reconciler, queue, and worker pool
    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&store) as Arc<dyn ResourceStore>,
        secrets,
        artifacts,
        telemetry,
        http,
    ));

    let queue = Arc::new(WorkQueue::new());
    for key in store.list().await? {
        queue.enqueue(key)?;
    }

    let cancel = CancellationToken::new();
    let dispatcher = Dispatcher::new(Arc::clone(&queue), reconciler, config.dispatch.clone());
    let handles = dispatcher.start(cancel.clone());

    // 7. Run until a shutdown signal arrives
    shutdown_signal(cancel).await;

    for handle in handles {
        handle.await?;
    }

    tracing::info!("Carbon operator stopped");
    Ok(())
}
