//! Background cache replenishment.
//!
//! One task per client, stopped on shutdown or wipe. Every tick it requests
//! the storable deficit (pool and location bounds combined) from the
//! random-source service and appends the result; failures never propagate -
//! they are retried with backoff and, once persistent, reflected in the
//! cache status for callers to poll.

use std::{sync::Arc, time::Duration};

use tokio::{sync::watch, task::JoinHandle, time};

use keywell_cache::CacheError;
use keywell_core::{AuthToken, RandomSource};

use crate::state::CacheShared;

/// Consecutive failed ticks before the status reports a stall.
pub(crate) const STALL_THRESHOLD: u32 = 5;

/// Backoff cap: delay never exceeds `maintenance_interval * MAX_BACKOFF_FACTOR`.
const MAX_BACKOFF_FACTOR: u32 = 8;

/// Bound on joining the task at shutdown.
pub(crate) const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle owning the background task.
pub(crate) struct MaintenanceHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Spawn the maintenance task on the current runtime.
    pub fn spawn<R: RandomSource>(
        source: Arc<R>,
        token: AuthToken,
        shared: Arc<CacheShared>,
        interval: Duration,
    ) -> Self {
        let (shutdown, signal) = watch::channel(false);
        let task = tokio::spawn(run(source, token, shared, interval, signal));
        Self { shutdown, task }
    }

    /// Signal the task and join it, bounded by [`SHUTDOWN_TIMEOUT`].
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if time::timeout(SHUTDOWN_TIMEOUT, self.task).await.is_err() {
            tracing::warn!("maintenance task did not stop within the shutdown timeout");
        }
    }

    /// Backstop for a client dropped without an explicit shutdown.
    pub fn abort(&self) {
        let _ = self.shutdown.send(true);
        self.task.abort();
    }
}

async fn run<R: RandomSource>(
    source: Arc<R>,
    token: AuthToken,
    shared: Arc<CacheShared>,
    interval: Duration,
    mut signal: watch::Receiver<bool>,
) {
    let mut backoff: u32 = 1;
    let mut first_tick = true;

    loop {
        // The first tick runs immediately: the initial pool download should
        // not wait out a full maintenance interval.
        if first_tick {
            first_tick = false;
        } else {
            let delay = interval.saturating_mul(backoff);
            tokio::select! {
                _ = signal.changed() => break,
                () = time::sleep(delay) => {},
            }
        }

        let deficit = shared.headroom();
        if deficit == 0 {
            backoff = 1;
            continue;
        }

        let generation = shared.wipe_generation();
        match source.fetch_random(&token, deficit).await {
            Ok(bytes) if !bytes.is_empty() => {
                let mut store = shared.lock_store();
                if shared.wipe_generation() != generation {
                    tracing::debug!("discarding download that completed after a wipe");
                    continue;
                }
                match store.append(&bytes) {
                    Ok(()) => {
                        shared.refresh(&store);
                        shared.record_maintenance_success();
                        backoff = 1;
                        tracing::debug!(
                            appended = bytes.len(),
                            remaining = store.remaining(),
                            "maintenance tick appended random"
                        );
                    },
                    Err(CacheError::CapacityExceeded { .. }) => {
                        // The request was clamped to the store's headroom,
                        // so this means the service over-delivered; drop it.
                        tracing::debug!("download no longer fits, discarding");
                        shared.record_maintenance_success();
                        backoff = 1;
                    },
                    Err(e) => {
                        let failures = shared.record_maintenance_failure(STALL_THRESHOLD);
                        backoff = (backoff * 2).min(MAX_BACKOFF_FACTOR);
                        tracing::warn!(error = %e, failures, "maintenance append failed");
                    },
                }
            },
            Ok(_) => {
                let failures = shared.record_maintenance_failure(STALL_THRESHOLD);
                backoff = (backoff * 2).min(MAX_BACKOFF_FACTOR);
                tracing::warn!(failures, "random source returned no bytes");
            },
            Err(e) => {
                let failures = shared.record_maintenance_failure(STALL_THRESHOLD);
                backoff = (backoff * 2).min(MAX_BACKOFF_FACTOR);
                tracing::warn!(error = %e, failures, "random download failed");
            },
        }
    }

    tracing::debug!("maintenance task stopped");
}
