use axum::{Json, extract::State};
use serde_json::{Value, json};
use std::sync::Arc;
use crate::metrics::CACHE_SIZE;
use crate::state::AppState;

// DELETE /cache, out-of-band flush
pub async fn flush_cache_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let flushed = state.cache.clear();
    CACHE_SIZE.set(state.cache.len() as f64);
    tracing::info!(flushed, "cache flushed");
    Json(json!({ "flushed": flushed }))
}
