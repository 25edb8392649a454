use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use types::errors::EngineError;

/// Central error type for the Gateway application
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

fn engine_status(err: &EngineError) -> (StatusCode, &'static str) {
    match err {
        EngineError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        EngineError::Expired { .. } => (StatusCode::GONE, "EXPIRED"),
        EngineError::NotParticipant { .. } => (StatusCode::FORBIDDEN, "NOT_PARTICIPANT"),
        EngineError::QuotaExceeded { .. } => (StatusCode::CONFLICT, "QUOTA_EXCEEDED"),
        EngineError::CoLocationRequired { .. } => (StatusCode::CONFLICT, "CO_LOCATION_REQUIRED"),
        EngineError::MatchActive { .. } => (StatusCode::CONFLICT, "MATCH_ACTIVE"),
        EngineError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMIT_EXCEEDED"),
        EngineError::SelfInterest { .. } => (StatusCode::BAD_REQUEST, "SELF_INTEREST"),
        EngineError::InvalidMessage { .. } => (StatusCode::BAD_REQUEST, "INVALID_MESSAGE"),
        EngineError::StoreUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, code) = match self {
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, "UNAUTHORIZED"),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, "BAD_REQUEST"),
            AppError::Engine(err) => {
                let (status, code) = engine_status(&err);
                if status.is_server_error() {
                    tracing::error!(error = %err, "engine fault");
                }
                (status, err.user_message().to_string(), code)
            }
            AppError::InternalError(err) => {
                tracing::error!(error = %err, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    "INTERNAL_ERROR",
                )
            }
        };

        let body = Json(json!({
            "error": code,
            "message": error_message
        }));

        (status, body).into_response()
    }
}
