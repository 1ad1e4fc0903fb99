//! In-process expiry sweeper.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::state::AppState;

/// Spawn a task that runs the expiry sweep every `every` until `shutdown`
/// flips to `true` or its sender is dropped.
///
/// A failed run is logged and retried on the next tick.
pub fn spawn_sweeper(
    state: AppState,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so startup is not a sweep
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let batch_size = state.config().sweep.batch_size;
            match state.reconciler().sweep_expired(Utc::now(), batch_size).await {
                Ok(report) if report.count > 0 => {
                    tracing::info!(count = report.count, "expired lapsed subscriptions");
                }
                Ok(_) => tracing::debug!("no lapsed subscriptions"),
                Err(e) => tracing::warn!(error = %e, "expiry sweep failed"),
            }
        }

        tracing::info!("expiry sweeper stopped");
    });

    tracing::info!(interval_secs = every.as_secs(), "expiry sweeper started");
    handle
}
