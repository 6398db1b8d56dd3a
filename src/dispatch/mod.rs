//! Work queue and worker pool driving reconciliation passes.
//!
//! Keys flow through a deduplicating queue into a fixed pool of workers. At
//! most one pass runs per key at any time; a key handed to a worker while a
//! pass for it is still in flight goes back on the queue after a short delay.

use crate::reconcile::{ReconcileOutcome, Reconciler};
use dashmap::DashMap;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::metrics::{QUEUE_DEPTH_GAUGE, RECONCILIATION_ERRORS_TOTAL};
use crate::resource::ResourceKey;

/// Delay before re-offering a key whose previous pass is still running.
const BUSY_REQUEUE_DELAY: Duration = Duration::from_secs(1);

fn default_workers() -> usize {
    2
}

fn default_error_backoff() -> u64 {
    60
}

fn default_pass_timeout() -> u64 {
    30
}

/// Worker pool tuning, loaded from the `[dispatch]` config table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Concurrent reconciliation workers.
    pub workers: usize,
    /// Seconds before a failed pass is retried.
    pub error_backoff_seconds: u64,
    /// Hard deadline for a single pass.
    pub pass_timeout_seconds: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            error_backoff_seconds: default_error_backoff(),
            pass_timeout_seconds: default_pass_timeout(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("work queue is closed")]
    QueueClosed,
}

/// Deduplicating multi-producer work queue.
///
/// A key already waiting in the queue is not enqueued twice, so a burst of
/// schedule events for one resource collapses into a single pass.
pub struct WorkQueue {
    tx: mpsc::UnboundedSender<ResourceKey>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ResourceKey>>,
    pending: DashMap<ResourceKey, ()>,
}

impl WorkQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
            pending: DashMap::new(),
        }
    }

    /// Offer a key. Returns `Ok(false)` when the key was already pending.
    pub fn enqueue(&self, key: ResourceKey) -> Result<bool, DispatchError> {
        if self.pending.insert(key.clone(), ()).is_some() {
            return Ok(false);
        }
        if self.tx.send(key.clone()).is_err() {
            self.pending.remove(&key);
            return Err(DispatchError::QueueClosed);
        }
        metrics::gauge!(QUEUE_DEPTH_GAUGE).set(self.pending.len() as f64);
        Ok(true)
    }

    /// Wait for the next key. `None` once all senders are gone.
    pub async fn recv(&self) -> Option<ResourceKey> {
        let key = self.rx.lock().await.recv().await?;
        self.pending.remove(&key);
        metrics::gauge!(QUEUE_DEPTH_GAUGE).set(self.pending.len() as f64);
        Some(key)
    }

    pub fn depth(&self) -> usize {
        self.pending.len()
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Worker pool that pulls keys off the queue and runs passes.
pub struct Dispatcher {
    queue: Arc<WorkQueue>,
    reconciler: Arc<Reconciler>,
    config: DispatchConfig,
    /// Keys with a pass currently executing.
    inflight: Arc<DashMap<ResourceKey, ()>>,
}

impl Dispatcher {
    pub fn new(queue: Arc<WorkQueue>, reconciler: Arc<Reconciler>, config: DispatchConfig) -> Self {
        Self {
            queue,
            reconciler,
            config,
            inflight: Arc::new(DashMap::new()),
        }
    }

    /// Spawn the worker pool. Each handle resolves when its worker observes
    /// cancellation.
    pub fn start(&self, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        let workers = self.config.workers.max(1);
        tracing::info!(workers, "Dispatcher starting");

        (0..workers)
            .map(|worker_id| {
                let queue = Arc::clone(&self.queue);
                let reconciler = Arc::clone(&self.reconciler);
                let inflight = Arc::clone(&self.inflight);
                let config = self.config.clone();
                let cancel = cancel.clone();

                tokio::spawn(async move {
                    loop {
                        let key = tokio::select! {
                            _ = cancel.cancelled() => {
                                tracing::info!(worker_id, "Worker shutting down");
                                break;
                            }
                            key = queue.recv() => match key {
                                Some(key) => key,
                                None => break,
                            },
                        };

                        // Serialize passes per key. The busy key goes back on
                        // the queue shortly instead of blocking this worker.
                        if inflight.insert(key.clone(), ()).is_some() {
                            schedule(&queue, &cancel, key, BUSY_REQUEUE_DELAY);
                            continue;
                        }

                        let deadline = Duration::from_secs(config.pass_timeout_seconds);
                        let result =
                            tokio::time::timeout(deadline, reconciler.reconcile(&key)).await;
                        inflight.remove(&key);

                        match result {
                            Ok(Ok(ReconcileOutcome::Requeue(delay))) => {
                                schedule(&queue, &cancel, key, delay);
                            }
                            Ok(Ok(ReconcileOutcome::Skipped)) => {
                                tracing::debug!(resource = %key, "Resource dropped from dispatch");
                            }
                            Ok(Err(err)) => {
                                tracing::warn!(
                                    resource = %key,
                                    error = %err,
                                    backoff_seconds = config.error_backoff_seconds,
                                    "Reconciliation pass failed"
                                );
                                metrics::counter!(
                                    RECONCILIATION_ERRORS_TOTAL,
                                    "resource" => key.to_string(),
                                    "reason" => err.reason()
                                )
                                .increment(1);
                                schedule(
                                    &queue,
                                    &cancel,
                                    key,
                                    Duration::from_secs(config.error_backoff_seconds),
                                );
                            }
                            Err(_) => {
                                tracing::warn!(
                                    resource = %key,
                                    timeout_seconds = config.pass_timeout_seconds,
                                    "Reconciliation pass timed out"
                                );
                                metrics::counter!(
                                    RECONCILIATION_ERRORS_TOTAL,
                                    "resource" => key.to_string(),
                                    "reason" => "timeout"
                                )
                                .increment(1);
                                schedule(
                                    &queue,
                                    &cancel,
                                    key,
                                    Duration::from_secs(config.error_backoff_seconds),
                                );
                            }
                        }
                    }
                })
            })
            .collect()
    }
}

/// Re-enqueue `key` after `delay`, abandoned on shutdown.
fn schedule(queue: &Arc<WorkQueue>, cancel: &CancellationToken, key: ResourceKey, delay: Duration) {
    let queue = Arc::clone(queue);
    let cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(delay) => {
                if let Err(err) = queue.enqueue(key) {
                    tracing::debug!(error = %err, "Dropping scheduled key");
                }
            }
        }
    });
}
