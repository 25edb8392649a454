use crate::state::Sweep;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Run the expiry sweep every `every`, starting one interval from now.
pub fn spawn_sweep(sweep: Arc<Sweep>, every: Duration, clean: bool) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let sweep = sweep.clone();
            match tokio::task::spawn_blocking(move || sweep.run(clean)).await {
                Ok(Ok(summary)) => tracing::debug!(
                    expired = summary.expired_count,
                    failed = summary.failed_count,
                    "scheduled sweep completed"
                ),
                Ok(Err(err)) => tracing::warn!(error = %err, "scheduled sweep aborted"),
                Err(err) => tracing::error!(error = %err, "scheduled sweep task panicked"),
            }
        }
    })
}
