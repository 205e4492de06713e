use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::error::AppError;
use serde::Serialize;
use thiserror::Error;

/// HTTP-facing error type: maps the engine's [`AppError`] taxonomy (spec
/// §7) onto a status code and a JSON body, one variant per recovery
/// strategy rather than one per `AppError` variant.
#[derive(Error, Debug, Serialize, Clone)]
pub enum ApiError {
    #[error("Internal server error")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Service temporarily unavailable: {0}")]
    Degraded(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::InvalidArgument(msg) | AppError::Validation(msg) => {
                Self::ValidationError(msg)
            }
            AppError::NotFound(msg) => Self::NotFound(msg),
            AppError::StoreUnavailable(msg)
            | AppError::EmbeddingUnavailable(msg)
            | AppError::LLMUnavailable(msg) => Self::Degraded(msg),
            AppError::Timeout(msg) => Self::Timeout(msg),
            AppError::DimensionMismatch { expected, actual } => Self::InternalError(format!(
                "embedding dimension mismatch: expected {expected}, got {actual}"
            )),
            other => {
                tracing::error!(error = %other, "internal error reached the HTTP boundary");
                Self::InternalError("internal server error".to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::InternalError(message) => (StatusCode::INTERNAL_SERVER_ERROR, message.clone()),
            Self::ValidationError(message) => (StatusCode::BAD_REQUEST, message.clone()),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message.clone()),
            Self::Degraded(message) => (StatusCode::SERVICE_UNAVAILABLE, message.clone()),
            Self::Timeout(message) => (StatusCode::GATEWAY_TIMEOUT, message.clone()),
        };

        (
            status,
            Json(ErrorResponse {
                error: message,
                status: "error".to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Serialize, Debug)]
struct ErrorResponse {
    error: String,
    status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_argument_maps_to_bad_request() {
        let api_error = ApiError::from(AppError::InvalidArgument("bad query".into()));
        assert!(matches!(api_error, ApiError::ValidationError(_)));
        assert_eq!(
            api_error.into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn embedding_unavailable_maps_to_service_unavailable() {
        let api_error = ApiError::from(AppError::EmbeddingUnavailable("timeout".into()));
        assert_eq!(
            api_error.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn timeout_maps_to_gateway_timeout() {
        let api_error = ApiError::from(AppError::Timeout("deadline exceeded".into()));
        assert_eq!(
            api_error.into_response().status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn database_error_is_sanitized_to_internal_error() {
        let api_error = ApiError::from(AppError::Database(surrealdb::Error::Api(
            surrealdb::error::Api::Query("boom".into()),
        )));
        assert!(matches!(api_error, ApiError::InternalError(_)));
        assert_eq!(api_error.to_string(), "Internal server error");
    }
}
