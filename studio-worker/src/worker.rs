use std::sync::Arc;
use std::time::Duration;
use studio_booking::{BookingManager, SweepReport};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Periodic housekeeping: expire lapsed waitlist offers and close out
/// finished sessions. Runs until `shutdown` flips to true or its sender drops.
pub fn start_sweep_worker(
    manager: Arc<BookingManager>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Sweep worker started, running every {:?}", every);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    sweep_once(&manager).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Sweep worker stopped");
    })
}

/// One pass. Contention is retried on the next tick.
pub async fn sweep_once(manager: &BookingManager) -> Option<SweepReport> {
    match manager.run_sweeps(manager.now()).await {
        Ok(report) => {
            if !report.is_empty() {
                info!(
                    offers_expired = report.offers_expired,
                    users_promoted = report.users_promoted,
                    sessions_completed = report.sessions_completed,
                    no_shows = report.no_shows,
                    cancellations_resumed = report.cancellations_resumed,
                    skipped_busy = report.skipped_busy,
                    "Sweep finished"
                );
            }
            Some(report)
        }
        Err(e) if e.is_retryable() => {
            warn!("Sweep hit a busy lock, will retry: {}", e);
            None
        }
        Err(e) => {
            error!(class = ?e.class(), "Sweep failed: {}", e);
            None
        }
    }
}
