use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::services::scheduler::BatchError;

/// Standard error response body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable error message
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, axum::Json(ErrorResponse { error: message })).into_response()
    }
}

/// Only request-resolution errors reach handlers; runtime failures travel
/// through the batch event stream instead.
impl From<BatchError> for AppError {
    fn from(err: BatchError) -> Self {
        match err {
            BatchError::UnknownCrop(_)
            | BatchError::UnknownLocation(_)
            | BatchError::UnknownSoil(_)
            | BatchError::InvalidConfig(_)
            | BatchError::InvalidInput(_) => AppError::BadRequest(err.to_string()),
            BatchError::Weather(_) | BatchError::Engine(_) => AppError::InternalError(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_error_status_mapping() {
        let resp = AppError::from(BatchError::UnknownCrop("maize".into())).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = AppError::from(BatchError::InvalidConfig("no scenarios".into())).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = AppError::Conflict("still running".into()).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = AppError::NotFound("batch".into()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
