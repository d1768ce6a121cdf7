use axum::{Json, extract::State};
use std::sync::Arc;
use crate::error::AppError;
use crate::models::TablesResponse;
use crate::state::AppState;

// GET /sql/tables
pub async fn tables_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TablesResponse>, AppError> {
    let timeout = state.pipeline.limits().execution_timeout;

    let schema = tokio::time::timeout(timeout, state.executor.describe_schema())
        .await
        .map_err(|_| AppError::Internal(format!("describing tables timed out after {:?}", timeout)))?
        .map_err(|e| AppError::Internal(format!("failed to get tables: {}", e)))?;

    Ok(Json(TablesResponse {
        tables: schema.tables,
    }))
}
