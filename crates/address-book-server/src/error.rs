use address_book::{AddressId, FieldViolation, ValidationError, error::AddressBookError};
use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Everything a handler can fail with, already sorted into 400/404/500.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Validation failed: {0}")]
    Validation(ValidationError),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Address with ID {0} not found")]
    NotFound(AddressId),
    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    violations: Vec<FieldViolation>,
}

impl From<AddressBookError> for ApiError {
    fn from(err: AddressBookError) -> Self {
        match err {
            AddressBookError::Validation(e) => Self::Validation(e),
            AddressBookError::NotFound(id) => Self::NotFound(id),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("store task failed: {err}"))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message, violations) = match self {
            Self::Validation(e) => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                e.to_string(),
                e.violations,
            ),
            Self::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                "bad_request",
                message,
                Vec::new(),
            ),
            Self::NotFound(id) => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("Address with ID {id} not found"),
                Vec::new(),
            ),
            Self::Internal(detail) => {
                error!(%detail, "Request failed with an internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "The address store could not complete the request".to_string(),
                    Vec::new(),
                )
            }
        };
        let body = ErrorBody {
            error: kind,
            message,
            violations,
        };
        (status, Json(body)).into_response()
    }
}
