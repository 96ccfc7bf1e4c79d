//! Retention manager for pruning old snapshots.

use crate::db::Store;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

const PRUNE_EVERY: Duration = Duration::from_secs(3600);

/// Deletes snapshot rows older than the configured number of days.
pub struct RetentionManager {
    store: Arc<Store>,
    retention: ChronoDuration,
    task: Mutex<Option<(broadcast::Sender<()>, JoinHandle<()>)>>,
}

impl RetentionManager {
    pub fn new(store: Arc<Store>, retention_days: u32) -> Self {
        Self {
            store,
            retention: ChronoDuration::days(i64::from(retention_days)),
            task: Mutex::new(None),
        }
    }

    /// Start the hourly prune task. The first prune runs immediately.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() {
            tracing::warn!("RetentionManager already running");
            return;
        }

        let (stop_tx, mut stop_rx) = broadcast::channel(1);
        let store = self.store.clone();
        let retention = self.retention;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(PRUNE_EVERY);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = stop_rx.recv() => break,
                    _ = interval.tick() => {
                        prune_expired(&store, retention, Utc::now());
                    }
                }
            }
        });

        *task = Some((stop_tx, handle));
        tracing::info!("RetentionManager started, keeping {} days", retention.num_days());
    }

    /// Signal the prune task and wait for it to exit.
    pub async fn stop(&self) {
        let Some((stop_tx, handle)) = self.task.lock().take() else {
            return;
        };
        let _ = stop_tx.send(());
        if let Err(e) = handle.await {
            tracing::error!("RetentionManager task failed: {}", e);
        }
    }
}

/// Prune rows recorded before `now - retention`. Returns the number removed.
pub fn prune_expired(store: &Store, retention: ChronoDuration, now: DateTime<Utc>) -> usize {
    let cutoff = now - retention;
    match store.prune_before(cutoff) {
        Ok(0) => 0,
        Ok(removed) => {
            tracing::info!("RetentionManager: pruned {} rows older than {}", removed, cutoff);
            removed
        }
        Err(e) => {
            tracing::error!("RetentionManager: failed to prune snapshots: {}", e);
            0
        }
    }
}
