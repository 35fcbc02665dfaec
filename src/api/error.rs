use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::telemetry::validate::ValidationIssue;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Invalid(Vec<ValidationIssue>),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                json!({ "status": "error", "message": message }),
            ),
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                json!({ "status": "error", "message": message }),
            ),
            ApiError::Invalid(issues) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "status": "error", "errors": issues }),
            ),
            ApiError::Internal(e) => {
                error!(error = %e, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "status": "error", "message": format!("internal error: {e}") }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
