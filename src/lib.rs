//! Natural-language to SQL gateway.
//!
//! Questions arrive over HTTP, are rate limited per client, answered from an
//! in-memory cache when possible, otherwise translated to SQL by an LLM and
//! optionally executed against the warehouse.

pub mod cache;
pub mod config;
pub mod error;
pub mod executor;
pub mod generation_log;
pub mod generator;
pub mod handlers;
pub mod maintenance;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod rate_limit;
pub mod state;

use axum::{
    Router, middleware,
    routing::{delete, get, post},
};
use std::sync::Arc;
use crate::state::AppState;

// creating the router with routes
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/health/detailed", get(handlers::detailed_health_handler))
        .route("/sql/generate", post(handlers::generate_handler))
        .route("/sql/tables", get(handlers::tables_handler))
        .route("/cache", delete(handlers::flush_cache_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(middleware::from_fn(handlers::catch_panic))
        .with_state(state)
}
