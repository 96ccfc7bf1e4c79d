//! Web server module.

mod assets;
mod handlers;

pub use handlers::*;

use crate::collector::Collector;
use crate::config::ServerConfig;

use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub collector: Arc<Collector>,
}

/// Status API and dashboard server.
pub struct Server {
    state: AppState,
}

impl Server {
    pub fn new(config: ServerConfig, collector: Arc<Collector>) -> Self {
        Self {
            state: AppState { config, collector },
        }
    }

    /// Build the router with all routes.
    fn routes(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            // Dashboard
            .route("/", get(assets::handle_index))
            .route("/static/{*path}", get(assets::handle_static))
            // API endpoints
            .route("/api/health", get(handlers::handle_health))
            .route("/api/dashboard", get(handlers::handle_dashboard))
            .route("/api/components", get(handlers::handle_components))
            .route("/api/vault", get(handlers::handle_vault))
            .route("/api/accounts", get(handlers::handle_accounts))
            .route("/api/system", get(handlers::handle_system))
            .route("/api/events", get(handlers::handle_events))
            .route("/api/logins/failed", get(handlers::handle_failed_logins))
            .route("/api/collect", post(handlers::handle_force_collect))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Serve until `shutdown` resolves.
    pub async fn start<F>(&self, shutdown: F) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let host = self.state.config.http_host.as_str();
        let port = self.state.config.http_port;
        let router = self.routes();

        let listener = tokio::net::TcpListener::bind((host, port)).await?;
        tracing::info!("Web server listening on {}", listener.local_addr()?);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
