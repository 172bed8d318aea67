use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// One problem with one submitted answer. Batched so a client sees every
/// broken answer in a single round trip.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerIssue {
    pub question_id: i64,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    BadRequest(String),

    #[error("validation failed for {} answer(s)", .0.len())]
    Validation(Vec<AnswerIssue>),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        match self {
            ServiceError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({
                    "success": false,
                    "message": format!("{what} not found"),
                })),
            )
                .into_response(),
            ServiceError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "success": false,
                    "message": message,
                })),
            )
                .into_response(),
            ServiceError::Validation(issues) => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "success": false,
                    "message": "some answers failed validation",
                    "errors": issues,
                })),
            )
                .into_response(),
            ServiceError::Storage(err) => {
                tracing::error!("storage error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({
                        "success": false,
                        "message": "internal server error",
                    })),
                )
                    .into_response()
            }
        }
    }
}
