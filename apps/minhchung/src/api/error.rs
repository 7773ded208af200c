//! # API Errors
//!
//! Maps registry errors to HTTP status codes and the JSON envelope.

use super::types::ApiResponse;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use minhchung_core::McError;

#[derive(Debug)]
pub enum ApiError {
    Core(McError),
    BadRequest(String),
    Unauthorized,
    Forbidden(String),
    RateLimited,
    Internal(String),
}

impl From<McError> for ApiError {
    fn from(err: McError) -> Self {
        Self::Core(err)
    }
}

/// Status code for a registry error.
pub fn status_for(err: &McError) -> StatusCode {
    match err {
        McError::DepartmentNotFound(_)
        | McError::CriterionNotFound(_)
        | McError::EvidenceCodeNotFound(_)
        | McError::CodeNotFound(_) => StatusCode::NOT_FOUND,
        McError::DepartmentInactive(_)
        | McError::CriterionInactive(_)
        | McError::DuplicateCode { .. }
        | McError::SequenceConflict { .. }
        | McError::SequenceOverflow(_) => StatusCode::CONFLICT,
        McError::Validation { .. } => StatusCode::BAD_REQUEST,
        McError::AllocationExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
        McError::Integrity(_) | McError::Storage(_) | McError::Serialization(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Core(err) => status_for(err),
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Core(err) => err.to_string(),
            Self::BadRequest(msg) | Self::Forbidden(msg) | Self::Internal(msg) => msg.clone(),
            Self::Unauthorized => "Unauthorized".to_string(),
            Self::RateLimited => "Too Many Requests".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self.message(), "request failed");
        }
        (status, Json(ApiResponse::<()>::error(self.message()))).into_response()
    }
}
