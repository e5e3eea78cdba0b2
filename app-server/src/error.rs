//! HTTP error responses.

use std::fmt;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use vector_rules_retrieval::RetrievalError;

/// Result type for route handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Error body returned to clients.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// An error that renders as a JSON response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<RetrievalError> for ApiError {
    fn from(err: RetrievalError) -> Self {
        let status = match &err {
            RetrievalError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            RetrievalError::RuleNotFound(_) | RetrievalError::RuleTypeNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            RetrievalError::DuplicateEntry(_) | RetrievalError::Conflict(_) => {
                StatusCode::CONFLICT
            }
            RetrievalError::Cancelled | RetrievalError::StorageUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            RetrievalError::EmbeddingFailed(_) => StatusCode::BAD_GATEWAY,
            RetrievalError::DimensionMismatch(_) | RetrievalError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        debug!("Rejected request body: {rejection}");
        Self::bad_request("invalid request body")
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        debug!("Rejected path parameter: {rejection}");
        Self::bad_request("invalid id")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("Request failed ({}): {}", self.status, self.message);
        } else {
            debug!("Request rejected ({}): {}", self.status, self.message);
        }

        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}
