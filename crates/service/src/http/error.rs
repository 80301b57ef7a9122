//! HTTP mapping for the engine error kinds.
//!
//! Every error leaves the surface as `{"message": "<text>"}` with the
//! status mandated for its kind: malformed requests and invalid metadata
//! are 400, blacklisted uploads/pins are 403, missing content is 404,
//! deadline hits are 504, backend trouble is 502. Blacklist hits on the
//! retrieval path surface as 404 inside the engine itself, so they are
//! indistinguishable from missing content.

use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::Serialize;

use crate::pin::PinError;
use crate::policy::PolicyError;
use crate::retrieval::RetrievalError;
use crate::upload::UploadError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
}

pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            message: message.into(),
        }),
    )
        .into_response()
}

impl IntoResponse for RetrievalError {
    fn into_response(self) -> Response {
        let status = match self {
            RetrievalError::InvalidPublink(_)
            | RetrievalError::InvalidMetadata(_)
            | RetrievalError::AmbiguousRequest(_) => StatusCode::BAD_REQUEST,
            RetrievalError::NotFound(_) => StatusCode::NOT_FOUND,
            RetrievalError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            RetrievalError::Backend(_) => StatusCode::BAD_GATEWAY,
            RetrievalError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error_response(status, self.to_string())
    }
}

impl IntoResponse for PinError {
    fn into_response(self) -> Response {
        let status = match self {
            PinError::InvalidPublink(_)
            | PinError::InvalidSitePath(_)
            | PinError::ForceDisabled
            | PinError::AlreadyExists(_) => StatusCode::BAD_REQUEST,
            PinError::Blacklisted => StatusCode::FORBIDDEN,
            PinError::NotFound => StatusCode::NOT_FOUND,
            PinError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            PinError::Backend(_) => StatusCode::BAD_GATEWAY,
        };
        error_response(status, self.to_string())
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = match self {
            UploadError::BadRequest(_)
            | UploadError::Metadata(_)
            | UploadError::SitePath(_)
            | UploadError::ForceDisabled
            | UploadError::AlreadyExists(_) => StatusCode::BAD_REQUEST,
            UploadError::Blacklisted => StatusCode::FORBIDDEN,
            UploadError::Backend(_) => StatusCode::BAD_GATEWAY,
        };
        error_response(status, self.to_string())
    }
}

/// Mapping for the policy batch endpoints.
pub fn policy_error_response(err: PolicyError) -> Response {
    let status = match err {
        PolicyError::Validation(_) => StatusCode::BAD_REQUEST,
        PolicyError::Blacklisted => StatusCode::FORBIDDEN,
        PolicyError::Persist(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, err.to_string())
}
