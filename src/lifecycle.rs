//! Process-wide background work
//!
//! The cleanup loop sweeps expired rate-limit counters off the request path.
//! It is started at most once and stopped through an explicit shutdown.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::admission::RateLimiter;

struct CleanupTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Owner of the background cleanup task
#[derive(Default)]
pub struct Lifecycle {
    cleanup: Mutex<Option<CleanupTask>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the cleanup loop; returns false if it is already running
    pub fn start_cleanup(&self, limiter: RateLimiter, interval: Duration) -> bool {
        let mut slot = self.cleanup.lock();
        if slot.is_some() {
            return false;
        }

        let (shutdown, mut signal) = watch::channel(false);
        let period = interval.max(Duration::from_millis(10));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match limiter.purge_expired().await {
                            Ok(0) => {}
                            Ok(purged) => debug!(purged, "Purged expired rate limit counters"),
                            Err(e) => warn!(error = %e, "Rate limit cleanup failed"),
                        }
                    }
                    changed = signal.changed() => {
                        if changed.is_err() || *signal.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        info!(interval_secs = period.as_secs(), "Cleanup task started");
        *slot = Some(CleanupTask { shutdown, handle });
        true
    }

    /// Signal the loop to stop and wait for it
    pub async fn shutdown(&self) {
        let task = self.cleanup.lock().take();
        let Some(task) = task else {
            return;
        };

        let _ = task.shutdown.send(true);
        if let Err(e) = task.handle.await {
            warn!(error = %e, "Cleanup task ended abnormally");
        }
        info!("Cleanup task stopped");
    }
}
