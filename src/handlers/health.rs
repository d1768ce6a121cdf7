use axum::{Json, extract::State};
use std::sync::Arc;
use crate::models::{DetailedHealthResponse, HealthResponse};
use crate::state::AppState;

async fn probe(state: &AppState) -> HealthResponse {
    HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
        database_connected: state.executor.is_connected().await,
        cache_connected: state.cache.is_available(),
    }
}

// health handler, always 200
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(probe(&state).await)
}

pub async fn detailed_health_handler(
    State(state): State<Arc<AppState>>,
) -> Json<DetailedHealthResponse> {
    Json(DetailedHealthResponse {
        health: probe(&state).await,
        uptime_seconds: state.started_at.elapsed().as_secs(),
        cache_entries: state.cache.len(),
        rate_limited_clients: state.rate_limiter.tracked_clients(),
    })
}
