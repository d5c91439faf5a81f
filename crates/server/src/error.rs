use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] serde_json::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::InvalidRequest(e) => {
                // The parser detail stays in the logs.
                tracing::debug!(error = %e, "rejected request body");
                (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({ "error": "invalid request" })),
                )
                    .into_response()
            }
        }
    }
}
