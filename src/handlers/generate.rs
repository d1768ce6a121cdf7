use axum::{Json, extract::State, extract::rejection::JsonRejection};
use std::sync::Arc;
use crate::error::AppError;
use crate::handlers::client::ClientId;
use crate::models::{GenerateSqlRequest, GenerateSqlResponse};
use crate::state::AppState;

// POST /sql/generate
pub async fn generate_handler(
    State(state): State<Arc<AppState>>,
    ClientId(client): ClientId,
    payload: Result<Json<GenerateSqlRequest>, JsonRejection>,
) -> Result<Json<GenerateSqlResponse>, AppError> {
    // malformed bodies are validation failures, not server faults
    let Json(payload) = payload.map_err(|e| AppError::Validation(e.body_text()))?;

    state.pipeline.handle(&client, payload).await.map(Json)
}
