//! pamwatch - PAM platform health collector
//!
//! Polls a privileged-access-management platform (or a demo generator),
//! stores each collection cycle in SQLite and serves the latest snapshot
//! over a small REST API with a static dashboard.

mod bundle;
mod collector;
mod config;
mod db;
mod source;
mod web;

use collector::{Collector, CollectorConfig, RetentionManager};
use config::ServerConfig;
use db::Store;
use web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("pamwatch=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!(
        "Starting pamwatch on {}:{} (demo mode: {})",
        cfg.http_host,
        cfg.http_port,
        cfg.demo_mode
    );
    tracing::info!("Using database at {}", cfg.db_path);

    // Initialize database
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    let source = source::source_from_config(&cfg)?;
    if let Err(e) = source.login().await {
        // the collector retries on every cycle
        tracing::warn!("Initial login failed: {}", e);
    }

    // Start collector
    let collector = Arc::new(Collector::new(
        source.clone(),
        store.clone(),
        CollectorConfig::from(&cfg),
    ));
    collector.start().await;

    let retention = (cfg.retention_days > 0).then(|| {
        let manager = RetentionManager::new(store.clone(), cfg.retention_days);
        manager.start();
        manager
    });

    // Start web server
    let server = Server::new(cfg, collector.clone());
    server.start(shutdown_signal()).await?;

    tracing::info!("Shutting down");
    collector.stop().await;
    if let Some(manager) = retention {
        manager.stop().await;
    }
    if !source.is_demo() {
        if let Err(e) = source.logout().await {
            tracing::warn!("Logout failed: {}", e);
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
