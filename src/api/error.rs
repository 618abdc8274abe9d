//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::db::DatabaseError;
use crate::drip::{DripError, StartError, StartRejection};
use crate::tracking::TrackingError;

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
    #[error("Cron secret missing or invalid")]
    Unauthorized,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Sequence start rejected: {}", .0.as_str())]
    Rejected(StartRejection),
    #[error("{message}")]
    Conflict { code: &'static str, message: String },
    #[error("{message}")]
    Unprocessable { code: &'static str, message: String },
    /// Collaborator failure; the caller may retry.
    #[error("Temporarily unavailable: {0}")]
    Retry(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "AUTH_REQUIRED",
                "Cron secret missing or invalid".to_string(),
            ),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail),
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail),
            ApiError::Rejected(reason) => {
                let status = match reason {
                    StartRejection::AlreadyStarted | StartRejection::AlreadyReceivedElsewhere => {
                        StatusCode::CONFLICT
                    }
                    StartRejection::NotWeightLoss | StartRejection::NoEmail => {
                        StatusCode::UNPROCESSABLE_ENTITY
                    }
                };
                (status, reason.as_str(), reason.message().to_string())
            }
            ApiError::Conflict { code, message } => (StatusCode::CONFLICT, code, message),
            ApiError::Unprocessable { code, message } => {
                (StatusCode::UNPROCESSABLE_ENTITY, code, message)
            }
            ApiError::Retry(detail) => {
                tracing::warn!(detail, "API collaborator failure");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "RETRY",
                    "Temporarily unavailable, try again".to_string(),
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

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity_type, id } => {
                ApiError::NotFound(format!("{entity_type} {id} not found"))
            }
            DatabaseError::Sqlite(_) | DatabaseError::LockPoisoned => ApiError::Retry(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<TrackingError> for ApiError {
    fn from(err: TrackingError) -> Self {
        match err {
            TrackingError::Database(e) => e.into(),
            TrackingError::SessionsExhausted { .. } => ApiError::Conflict {
                code: "SESSIONS_EXHAUSTED",
                message: err.to_string(),
            },
            TrackingError::InvalidExtension { .. } | TrackingError::SessionBudgetOverflow { .. } => {
                ApiError::Unprocessable {
                    code: "INVALID_EXTENSION",
                    message: err.to_string(),
                }
            }
            TrackingError::DateOutOfRange { .. } => ApiError::Unprocessable {
                code: "DATE_OUT_OF_RANGE",
                message: err.to_string(),
            },
            TrackingError::MissingReason => ApiError::Unprocessable {
                code: "MISSING_REASON",
                message: err.to_string(),
            },
        }
    }
}

impl From<DripError> for ApiError {
    fn from(err: DripError) -> Self {
        match err {
            DripError::Database(e) => e.into(),
            DripError::Dispatch(_) | DripError::DispatchTimeout(_) => ApiError::Retry(err.to_string()),
        }
    }
}

impl From<StartError> for ApiError {
    fn from(err: StartError) -> Self {
        match err {
            StartError::Rejected(reason) => ApiError::Rejected(reason),
            StartError::Drip(e) => e.into(),
        }
    }
}
