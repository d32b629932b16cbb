//! HTTP mapping for request errors.

use super::types::ErrorBody;
use crate::error::Doc2MdError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Everything a `/process` handler can fail with.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Validation or conversion failure from the library.
    #[error(transparent)]
    Request(#[from] Doc2MdError),

    /// The body exceeded the configured limit while being read.
    #[error("Request body too large: {0}")]
    PayloadTooLarge(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Request(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Request(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let details = match &self {
            ApiError::Request(e) => e.field_errors(),
            ApiError::PayloadTooLarge(_) => Vec::new(),
        };

        let body = ErrorBody {
            error: self.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for handlers.
pub type ApiResult<T> = Result<T, ApiError>;
