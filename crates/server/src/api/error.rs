//! Mapping of tracker errors to HTTP responses.

use axum::{http::StatusCode, Json};
use serde::Serialize;
use tracing::error;

use anitrack_core::{ExternalCatalogError, LibraryError, TrackerError};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub message: String,
}

/// Error half of every handler result.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

pub fn status_for(err: &TrackerError) -> StatusCode {
    match err {
        TrackerError::NotFound(_) => StatusCode::NOT_FOUND,
        TrackerError::Store(e) => match e {
            LibraryError::NotFound(_) => StatusCode::NOT_FOUND,
            LibraryError::Validation(_) => StatusCode::BAD_REQUEST,
            LibraryError::Initialization(_) | LibraryError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        },
        TrackerError::Remote(e) => match e {
            ExternalCatalogError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            ExternalCatalogError::NotFound(_) => StatusCode::NOT_FOUND,
            ExternalCatalogError::Security(_)
            | ExternalCatalogError::HttpError(_)
            | ExternalCatalogError::ApiError { .. }
            | ExternalCatalogError::ParseError(_) => StatusCode::BAD_GATEWAY,
        },
    }
}

impl From<TrackerError> for ErrorResponse {
    fn from(err: TrackerError) -> Self {
        Self {
            error: err.to_string(),
        }
    }
}

/// Convert a tracker error, logging the ones that are our fault.
pub fn tracker_error(err: TrackerError) -> ApiError {
    let status = status_for(&err);
    if status.is_server_error() {
        error!("Request failed: {}", err);
    }
    (status, Json(ErrorResponse::from(err)))
}
