//! Error taxonomy for the gateway.
//!
//! Collaborator errors are kept separate from [`AppError`], which is the only
//! type that reaches the HTTP boundary. Execution failures never become an
//! `AppError`: they ride along in the response body.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::time::Duration;

/// Failures of the LLM collaborator.
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("LLM request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("LLM returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("LLM response had no candidates")]
    EmptyResponse,

    #[error("LLM call timed out after {0:?}")]
    Timeout(Duration),
}

/// Failures of the warehouse collaborator.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("{0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    #[error("unsupported column type {type_name} for column {column}")]
    UnsupportedType { column: String, type_name: String },

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache is disabled")]
    Disabled,

    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Errors that terminate a request.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Rate limit exceeded. Max {limit} requests per {} seconds", .window.as_secs())]
    RateLimited {
        limit: u32,
        window: Duration,
        retry_after: Duration,
    },

    #[error("Failed to generate SQL")]
    GenerationFailed(String),

    #[error("Internal server error")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::GenerationFailed(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Validation(msg) => tracing::debug!(reason = %msg, "request rejected"),
            AppError::RateLimited { .. } => tracing::info!("rate limit exceeded"),
            AppError::GenerationFailed(cause) => tracing::warn!(cause = %cause, "SQL generation failed"),
            AppError::Internal(cause) => tracing::error!(cause = %cause, "unhandled fault"),
        }

        // Display text only, causes stay in the logs
        let body = Json(json!({ "detail": self.to_string() }));
        let mut response = (self.status(), body).into_response();

        if let AppError::RateLimited { retry_after, .. } = &self {
            let secs = retry_after.as_secs_f64().ceil().max(1.0) as u64;
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
