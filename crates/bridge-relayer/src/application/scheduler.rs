//! # Sync Scheduler
//!
//! Runs each [`SyncStrategy`] on its own task with a fixed delay between
//! cycles. Engines never share state, so one engine's failure or slowness
//! does not hold up another. A cycle error is logged and counted; the loop
//! carries on with the next cycle.
//!
//! Shutdown is a `watch` flag. The flag is only observed between cycles,
//! so an in-flight cycle always finishes first.

use std::time::{Duration, Instant};

use relayer_telemetry::metrics;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::ports::SyncStrategy;

/// Run `strategy` every `delay` until `shutdown` flips to `true`.
pub fn spawn_sync_task<S>(
    mut strategy: S,
    delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    S: SyncStrategy + 'static,
{
    tokio::spawn(async move {
        let engine = strategy.name();
        relayer_telemetry::log_event!(info, engine, "Sync task started", delay_ms = delay.as_millis() as u64);

        loop {
            if *shutdown.borrow() {
                break;
            }

            let started = Instant::now();
            match strategy.sync_once().await {
                Ok(report) => {
                    metrics::record_cycle(engine, true, started.elapsed().as_secs_f64());
                    metrics::record_headers_submitted(engine, report.submitted);
                    relayer_telemetry::log_event!(
                        debug,
                        engine,
                        "Cycle complete",
                        submitted = report.submitted,
                        batches = report.batches,
                        checked_height = report.checked_height
                    );
                }
                Err(e) => {
                    metrics::record_cycle(engine, false, started.elapsed().as_secs_f64());
                    relayer_telemetry::log_event!(
                        error,
                        engine,
                        "Cycle failed",
                        kind = ?e.kind(),
                        error = %e
                    );
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    // a dropped sender also means stop
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        relayer_telemetry::log_event!(info, engine, "Sync task stopped");
    })
}

/// Owns the sync tasks and their shared shutdown flag.
pub struct SyncScheduler {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl SyncScheduler {
    /// Create a scheduler with no tasks.
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            handles: Vec::new(),
        }
    }

    /// Start `strategy` on its own task.
    pub fn spawn<S>(&mut self, strategy: S, delay: Duration)
    where
        S: SyncStrategy + 'static,
    {
        let handle = spawn_sync_task(strategy, delay, self.shutdown_tx.subscribe());
        self.handles.push(handle);
    }

    /// Number of running tasks.
    pub fn task_count(&self) -> usize {
        self.handles.len()
    }

    /// Signal every task and wait for them to stop.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Sync task panicked");
            }
        }
    }
}

impl Default for SyncScheduler {
    fn default() -> Self {
        Self::new()
    }
}
