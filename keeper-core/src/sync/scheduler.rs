//! Periodic background push of unsynced records.

use crate::sync::engine::SyncEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Handle to the running push task.
pub struct SyncScheduler {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl SyncScheduler {
    /// Start pushing every `period` until `cancel` fires or [`shutdown`] is called.
    ///
    /// A failed tick is logged and retried on the next one; the unsynced set
    /// is re-read from the store each time.
    ///
    /// [`shutdown`]: SyncScheduler::shutdown
    pub fn spawn(engine: Arc<SyncEngine>, period: Duration, cancel: CancellationToken) -> Self {
        let cancel = cancel.child_token();
        let task_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer.tick().await; // Skip first tick

            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = timer.tick() => {
                        let report = engine.push_batch(&task_cancel).await;
                        if let Some(e) = report.error {
                            debug!(
                                committed = report.committed.len(),
                                error = %e,
                                "SyncToRemote error"
                            );
                        }
                    }
                }
            }

            debug!("SyncToRemote exit");
        });

        info!("Push scheduler started, interval {}ms", period.as_millis());
        Self { cancel, handle }
    }

    /// Stop the task and wait for an in-flight push to unwind.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            debug!("Push scheduler task ended abnormally: {}", e);
        }
    }
}
