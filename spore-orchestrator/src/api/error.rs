//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use spore_core::dto::job::ErrorBody;

use crate::service::RegistryError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        let message = err.to_string();
        match err {
            RegistryError::InvalidRequest(_) => ApiError::BadRequest(message),
            RegistryError::JobNotFound(_) => ApiError::NotFound(message),
            RegistryError::JobAlreadyRunning | RegistryError::JobNotRunning(_) => {
                ApiError::Conflict(message)
            }
            RegistryError::Spawn(_) => ApiError::InternalError(message),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
