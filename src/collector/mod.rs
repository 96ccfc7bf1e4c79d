//! Background collector: pulls a bundle from the source on an interval and
//! persists it as one snapshot cycle.

mod mapping;
mod retention;

pub use mapping::*;
pub use retention::*;

use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bundle::HealthBundle;
use crate::config::ServerConfig;
use crate::db::{DbError, Store};
use crate::source::{HealthSource, SourceError};

/// How long `stop` waits for an in-flight cycle before aborting it.
pub const STOP_GRACE: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum CollectError {
    #[error("fetch failed: {0}")]
    Source(#[from] SourceError),
    #[error("store failed: {0}")]
    Store(#[from] DbError),
}

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub interval: Duration,
    /// Component types whose per-instance details are stored.
    pub components_to_check: Vec<String>,
}

impl From<&ServerConfig> for CollectorConfig {
    fn from(cfg: &ServerConfig) -> Self {
        Self {
            interval: cfg.collect_interval,
            components_to_check: cfg.components_to_check.clone(),
        }
    }
}

pub struct Collector {
    source: Arc<dyn HealthSource>,
    store: Arc<Store>,
    config: CollectorConfig,
    running: AtomicBool,
    task: Mutex<Option<(broadcast::Sender<()>, JoinHandle<()>)>>,
}

impl Collector {
    pub fn new(source: Arc<dyn HealthSource>, store: Arc<Store>, config: CollectorConfig) -> Self {
        Self {
            source,
            store,
            config,
            running: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the collection loop. A second call while running only warns.
    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Collector already running");
            return;
        }

        let (stop_tx, stop_rx) = broadcast::channel(1);
        let collector = Arc::clone(self);
        let handle = tokio::spawn(async move { collector.run_loop(stop_rx).await });
        *self.task.lock().await = Some((stop_tx, handle));

        info!(
            "Collector started, collecting every {}s",
            self.config.interval.as_secs()
        );
    }

    /// Stop the loop, waiting up to [`STOP_GRACE`] for an in-flight cycle.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);

        let Some((stop_tx, handle)) = self.task.lock().await.take() else {
            return;
        };
        let _ = stop_tx.send(());

        let abort = handle.abort_handle();
        match tokio::time::timeout(STOP_GRACE, handle).await {
            Ok(_) => info!("Collector stopped"),
            Err(_) => {
                warn!("Collector did not stop within {:?}, aborting", STOP_GRACE);
                abort.abort();
            }
        }
    }

    async fn run_loop(&self, mut stop_rx: broadcast::Receiver<()>) {
        while self.is_running() {
            // failures are logged inside; the loop keeps going
            let _ = self.collect_and_store().await;

            tokio::select! {
                _ = stop_rx.recv() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }
    }

    /// Run one collection cycle: fetch the full bundle, fetch details for
    /// allow-listed component types, then write everything in one transaction.
    pub async fn collect_and_store(&self) -> Result<(), CollectError> {
        info!("Starting health data collection");

        let bundle = match self.source.fetch_all().await {
            Ok(bundle) => bundle,
            Err(e) => {
                error!("Health data collection failed: {}", e);
                return Err(e.into());
            }
        };

        let mut details = HashMap::new();
        for item in &bundle.component_status.items {
            let allowed = self
                .config
                .components_to_check
                .iter()
                .any(|t| t == &item.component_type);
            if allowed && !details.contains_key(&item.component_type) {
                let rows = self.source.fetch_component_details(&item.component_type).await;
                details.insert(item.component_type.clone(), rows);
            }
        }

        let recorded_at = Utc::now();
        match self
            .store
            .write_cycle(|writer| store_bundle(writer, &bundle, &details, recorded_at))
        {
            Ok(()) => {
                info!(
                    "Stored health data: {} components, {} events, {} failed logins",
                    bundle.component_status.items.len(),
                    bundle.recent_activities.len(),
                    bundle.failed_logins.len()
                );
                Ok(())
            }
            Err(e) => {
                error!("Failed to store health data, cycle rolled back: {}", e);
                Err(e.into())
            }
        }
    }

    /// Best available bundle: a fresh fetch, then the newest stored cycle,
    /// then whatever the source holds in memory, then an empty bundle.
    pub async fn latest_health_data(&self) -> HealthBundle {
        match self.source.fetch_all().await {
            Ok(bundle) => return bundle,
            Err(e) => warn!("Live fetch failed, reading stored snapshots: {}", e),
        }

        match load_latest_bundle(&self.store) {
            Ok(Some(bundle)) => return bundle,
            Ok(None) => debug!("No stored snapshots yet"),
            Err(e) => error!("Failed to read stored snapshots: {}", e),
        }

        self.source
            .cached_bundle()
            .unwrap_or_else(|| HealthBundle::empty(Utc::now()))
    }
}
