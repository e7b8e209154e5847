//! Periodic background flush

use super::versioned::VersionedCache;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Handle to the task that calls [`VersionedCache::flush_all`] on an interval.
///
/// Dropping the handle also ends the task, after any flush in progress.
pub struct FlushTask {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl FlushTask {
    /// Spawn the flush loop. The first flush runs one `interval` from now.
    pub fn start(cache: Arc<VersionedCache>, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let handle = tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "Background flush started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        let report = cache.flush_all().await;
                        if !report.is_empty() {
                            debug!(
                                flushed = report.flushed.len(),
                                failed = report.failed.len(),
                                "Background flush cycle"
                            );
                        }
                        for failure in &report.failed {
                            warn!("{} still dirty: {}", failure.path, failure.error);
                        }
                    }
                }
            }
            info!("Background flush stopped");
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Signal the loop to exit and wait for it. A flush cycle already running
    /// completes first.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.handle.await {
            warn!("Background flush task ended abnormally: {}", e);
        }
    }
}
