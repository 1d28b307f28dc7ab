//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::broadcast::BroadcastError;
use crate::engine::EngineError;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Patient not in triage queue: {0}")]
    NotInQueue(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail.clone()),
            ApiError::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail.clone())
            }
            ApiError::NotInQueue(patient_id) => (
                StatusCode::CONFLICT,
                "NOT_IN_QUEUE",
                format!("Patient {patient_id} has no assessment yet"),
            ),
            ApiError::Unavailable(detail) => {
                tracing::warn!(detail, "API dependency unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "UNAVAILABLE",
                    "A required service is temporarily unavailable".to_string(),
                )
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidIdentifier(_) | EngineError::Merge(_) => {
                ApiError::BadRequest(err.to_string())
            }
            // Another tenant's patient is reported exactly like a missing one.
            EngineError::UnknownPatient(patient_id)
            | EngineError::TenantMismatch { patient_id, .. } => {
                ApiError::NotFound(format!("Patient {patient_id} not found"))
            }
            EngineError::NotInQueue(patient_id) => ApiError::NotInQueue(patient_id),
            EngineError::Store(e) if e.is_transient() => ApiError::Unavailable(e.to_string()),
            EngineError::Audit(e) => ApiError::Unavailable(e.to_string()),
            EngineError::Store(e) => ApiError::Internal(e.to_string()),
            EngineError::LockPoisoned => ApiError::Internal("lock poisoned".into()),
        }
    }
}

impl From<BroadcastError> for ApiError {
    fn from(err: BroadcastError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
