//! Unified API error handling.
//!
//! Every handler returns errors in the same JSON envelope:
//! `{"error": {"code": "...", "message": "...", "details": {...}}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::db::StoreError;
use crate::engine::{ProjectionError, WindowError};
use crate::report::ReportError;

/// Error codes for API responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Client errors (4xx)
    BadRequest,
    NotFound,
    ValidationError,

    // Server errors (5xx)
    InternalError,
    ServiceUnavailable,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "bad_request",
            ErrorCode::NotFound => "not_found",
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::InternalError => "internal_error",
            ErrorCode::ServiceUnavailable => "service_unavailable",
        }
    }
}

/// The inner error object in the response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Field-level validation errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, Vec<String>>>,
}

/// The full error response envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Unified API error type
#[derive(Debug)]
pub struct ApiError {
    code: ErrorCode,
    status: StatusCode,
    message: String,
    details: Option<HashMap<String, Vec<String>>>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: code.status_code(),
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Validation error (400) for a single query parameter
    pub fn validation_field(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut errors = HashMap::new();
        errors.insert(field.to_string(), vec![message.clone()]);

        let mut err = Self::new(ErrorCode::ValidationError, message);
        err.details = Some(errors);
        err
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let response = ErrorResponse {
            error: ErrorBody {
                code: self.code.as_str().to_string(),
                message: self.message,
                details: self.details,
            },
        };

        (self.status, Json(response)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for ApiError {}

// -------------------------------------------------------------------------
// Conversions from domain errors
// -------------------------------------------------------------------------

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        tracing::error!("Store error: {}", err);
        match err {
            StoreError::Unavailable(_) => {
                ApiError::service_unavailable("Usage storage is unavailable")
            }
            StoreError::CorruptRow(_) => ApiError::internal("Stored usage data could not be read"),
        }
    }
}

impl From<ProjectionError> for ApiError {
    fn from(err: ProjectionError) -> Self {
        match &err {
            ProjectionError::InvalidGrowthRate(_) => {
                ApiError::validation_field("growth_rate", err.to_string())
            }
            ProjectionError::InvalidHorizon(_) => {
                ApiError::validation_field("months", err.to_string())
            }
            ProjectionError::InvalidVariance(_) => {
                ApiError::validation_field("variance_pct", err.to_string())
            }
            ProjectionError::EmptyBaseline(_) => ApiError::not_found(err.to_string()),
        }
    }
}

impl From<WindowError> for ApiError {
    fn from(err: WindowError) -> Self {
        match &err {
            WindowError::TooLong(_) => ApiError::validation_field("period", err.to_string()),
            WindowError::OutOfRange { .. } => ApiError::validation_field("end", err.to_string()),
        }
    }
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        match &err {
            ReportError::InvalidCreditPrice(_) => {
                ApiError::validation_field("credit_price", err.to_string())
            }
            ReportError::MissingColumns(_) => ApiError::bad_request(err.to_string()),
            ReportError::Csv(_) | ReportError::Io(_) => {
                tracing::error!("Report rendering failed: {}", err);
                ApiError::internal("Failed to render report")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::ServiceType;

    #[test]
    fn test_error_code_status_codes() {
        assert_eq!(ErrorCode::BadRequest.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::ValidationError.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorCode::ServiceUnavailable.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_validation_field_details() {
        let err = ApiError::validation_field("period", "Invalid period");
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert_eq!(err.details.unwrap().get("period").unwrap()[0], "Invalid period");
    }

    #[test]
    fn test_domain_error_conversions() {
        let err: ApiError = ProjectionError::InvalidGrowthRate(-2.0).into();
        assert_eq!(err.code, ErrorCode::ValidationError);

        let err: ApiError = ProjectionError::EmptyBaseline(ServiceType::CortexSearch).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let err: ApiError = StoreError::Unavailable("pool closed".into()).into();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);

        let err: ApiError = ReportError::InvalidCreditPrice(0.0).into();
        assert_eq!(err.code, ErrorCode::ValidationError);

        let err: ApiError = WindowError::TooLong(9999).into();
        assert!(err.details.unwrap().contains_key("period"));
    }
}
