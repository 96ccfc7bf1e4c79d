//! HTTP request handlers.

use super::AppState;
use crate::bundle::HealthBundle;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

// ============================================================================
// Health
// ============================================================================

pub async fn handle_health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

// ============================================================================
// Dashboard
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    #[serde(default)]
    pub refresh: bool,
}

pub async fn handle_dashboard(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> Response {
    if query.refresh {
        // errors are already logged by the collector
        let _ = state.collector.collect_and_store().await;
    }

    let bundle = state.collector.latest_health_data().await;
    if bundle.is_empty() {
        tracing::warn!("No dashboard data available");
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "detail": "No data available" })),
        )
            .into_response();
    }

    Json(bundle).into_response()
}

// ============================================================================
// Categories
// ============================================================================

pub async fn handle_components(State(state): State<AppState>) -> impl IntoResponse {
    Json(latest(&state).await.component_status)
}

pub async fn handle_vault(State(state): State<AppState>) -> impl IntoResponse {
    Json(latest(&state).await.vault_status)
}

pub async fn handle_accounts(State(state): State<AppState>) -> impl IntoResponse {
    Json(latest(&state).await.accounts_status)
}

pub async fn handle_system(State(state): State<AppState>) -> impl IntoResponse {
    Json(latest(&state).await.system_health)
}

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

impl LimitQuery {
    /// Requested limit clamped to `[1, MAX_LIMIT]`.
    pub fn clamped(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT) as usize
    }
}

pub async fn handle_events(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    let mut events = latest(&state).await.recent_activities;
    events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    events.truncate(query.clamped());

    Json(json!({ "events": events }))
}

pub async fn handle_failed_logins(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    let mut logins = latest(&state).await.failed_logins;
    logins.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    logins.truncate(query.clamped());

    Json(json!({ "logins": logins }))
}

// ============================================================================
// Collection
// ============================================================================

/// Queue one collection cycle and return immediately.
pub async fn handle_force_collect(State(state): State<AppState>) -> impl IntoResponse {
    let collector = state.collector.clone();
    tokio::spawn(async move {
        let _ = collector.collect_and_store().await;
    });

    tracing::info!("Forced collection queued");
    Json(json!({
        "status": "collection started",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn latest(state: &AppState) -> HealthBundle {
    state.collector.latest_health_data().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{Collector, CollectorConfig};
    use crate::config::ServerConfig;
    use crate::db::Store;
    use crate::source::testing::UnreachableSource;
    use crate::source::{generate_bundle, DemoSource, HealthSource};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tempfile::NamedTempFile;

    fn state_with(source: Arc<dyn HealthSource>, tmp: &NamedTempFile) -> AppState {
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        let config = ServerConfig::default();
        let collector = Arc::new(Collector::new(
            source,
            store,
            CollectorConfig::from(&config),
        ));
        AppState { config, collector }
    }

    fn demo() -> Arc<DemoSource> {
        Arc::new(DemoSource::from_bundle(generate_bundle(
            &mut StdRng::seed_from_u64(21),
            Utc::now(),
        )))
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_limit_clamping() {
        assert_eq!(LimitQuery { limit: None }.clamped(), 10);
        assert_eq!(LimitQuery { limit: Some(0) }.clamped(), 1);
        assert_eq!(LimitQuery { limit: Some(-5) }.clamped(), 1);
        assert_eq!(LimitQuery { limit: Some(1000) }.clamped(), 100);
        assert_eq!(LimitQuery { limit: Some(42) }.clamped(), 42);
    }

    #[tokio::test]
    async fn test_health() {
        let body = body_json(handle_health().await.into_response()).await;
        assert_eq!(body["status"], "ok");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_events_returns_most_recent() {
        let tmp = NamedTempFile::new().unwrap();
        let source = demo();
        let state = state_with(source.clone(), &tmp);

        let resp = handle_events(State(state), Query(LimitQuery { limit: Some(5) }))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        let events = body["events"].as_array().unwrap();
        assert_eq!(events.len(), 5);

        let expected = source.cached_bundle().unwrap().recent_activities;
        let expected = serde_json::to_value(&expected[..5]).unwrap();
        assert_eq!(Value::Array(events.clone()), expected);
    }

    #[tokio::test]
    async fn test_failed_logins_limit_is_clamped() {
        let tmp = NamedTempFile::new().unwrap();
        let state = state_with(demo(), &tmp);

        let resp = handle_failed_logins(State(state.clone()), Query(LimitQuery { limit: Some(0) }))
            .await
            .into_response();
        assert_eq!(body_json(resp).await["logins"].as_array().unwrap().len(), 1);

        let resp = handle_failed_logins(State(state), Query(LimitQuery { limit: Some(500) }))
            .await
            .into_response();
        assert_eq!(body_json(resp).await["logins"].as_array().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_dashboard_404_when_nothing_available() {
        let tmp = NamedTempFile::new().unwrap();
        let state = state_with(Arc::new(UnreachableSource::default()), &tmp);

        let resp = handle_dashboard(State(state), Query(DashboardQuery { refresh: true })).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(body_json(resp).await["detail"].is_string());
    }

    #[tokio::test]
    async fn test_dashboard_refresh_persists_cycle() {
        let tmp = NamedTempFile::new().unwrap();
        let state = state_with(demo(), &tmp);

        let resp = handle_dashboard(State(state.clone()), Query(DashboardQuery { refresh: true })).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        assert_eq!(body["component_status"]["Items"].as_array().unwrap().len(), 4);
        assert!(body["vault_status"]["Safes"]["Total_Safes"].is_number());

        let store = Store::new(tmp.path()).unwrap();
        assert_eq!(store.latest_component_statuses(10).unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_categories_fall_back_to_empty_shapes() {
        let tmp = NamedTempFile::new().unwrap();
        let state = state_with(Arc::new(UnreachableSource::default()), &tmp);

        let components = body_json(handle_components(State(state.clone())).await.into_response()).await;
        assert_eq!(components, serde_json::json!({ "Items": [] }));

        let vault = body_json(handle_vault(State(state.clone())).await.into_response()).await;
        assert_eq!(vault, serde_json::json!({ "Safes": {} }));

        let accounts = body_json(handle_accounts(State(state.clone())).await.into_response()).await;
        assert_eq!(accounts, serde_json::json!({ "value": {} }));

        let system = body_json(handle_system(State(state)).await.into_response()).await;
        assert_eq!(system, serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_force_collect_returns_before_cycle_finishes() {
        let tmp = NamedTempFile::new().unwrap();
        let state = state_with(Arc::new(UnreachableSource::slow(Duration::from_secs(2))), &tmp);

        let started = Instant::now();
        let resp = handle_force_collect(State(state)).await.into_response();
        assert!(started.elapsed() < Duration::from_millis(100));

        let body = body_json(resp).await;
        assert_eq!(body["status"], "collection started");
        assert!(body["timestamp"].is_string());
    }
}
