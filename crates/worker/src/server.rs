//! Read-only HTTP surface: `GET /health` and `GET /stats`.

use std::sync::Arc;

use axum::extract::State;
use axum::{routing::get, Json, Router};
use retouch_db::DbPool;
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::scheduler::{SchedulerStats, TaskScheduler};

/// Shared state for the monitoring routes.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<TaskScheduler>,
    /// `None` when the worker runs without a database.
    pub pool: Option<DbPool>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_healthy: Option<bool>,
}

/// GET /health -- process liveness plus database reachability.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_healthy = match &state.pool {
        Some(pool) => Some(retouch_db::health_check(pool).await.is_ok()),
        None => None,
    };
    let status = if db_healthy == Some(false) { "degraded" } else { "ok" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        db_healthy,
    })
}

/// GET /stats -- scheduler occupancy snapshot.
async fn stats(State(state): State<AppState>) -> Json<SchedulerStats> {
    Json(state.scheduler.stats())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
