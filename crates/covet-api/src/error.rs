//! API error types and HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use covet_core::Error as CoreError;
use covet_resy::UpstreamError;

/// API result type.
pub type ApiResult<T> = Result<T, ApiError>;

/// Standard JSON error response body.
#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message (safe for clients).
    pub message: String,
    /// The upstream protocol step, on network errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    /// The upstream HTTP status, on network errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_status: Option<u16>,
}

/// HTTP API error with a stable machine-readable code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    step: Option<String>,
    upstream_status: Option<u16>,
}

impl ApiError {
    /// Returns an error response for invalid input.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_INPUT", message)
    }

    /// Returns an error response for authentication failures.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    /// Returns an error response for authorization failures (quota).
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    /// Returns an error response for missing resources.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    /// Returns an error response for conflicts. Currently unmapped, kept
    /// for taxonomy completeness.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "CONFLICT", message)
    }

    /// Returns the operational signal that the WAF retry budget was
    /// exhausted.
    #[must_use]
    pub fn waf_blocked() -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "WAF_BLOCKED",
            "WAF challenge unresolved; refresh cookies via /admin/cookies/import",
        )
    }

    /// Returns an upstream network error preserving step and status.
    pub fn network(step: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        let step = step.into();
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "NETWORK",
            message: format!("Network error at {step} step: {}", message.into()),
            step: Some(step),
            upstream_status: Some(status),
        }
    }

    /// Returns an internal error response.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", message)
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the stable machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }

    /// Returns the human-readable error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            step: None,
            upstream_status: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ApiErrorBody {
                code: self.code.to_string(),
                message: self.message,
                step: self.step,
                upstream_status: self.upstream_status,
            }),
        )
            .into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(value: CoreError) -> Self {
        match value {
            CoreError::InvalidInput(message) | CoreError::InvalidId { message } => {
                Self::bad_request(message)
            }
            CoreError::ResourceNotFound { resource_type, id } => {
                Self::not_found(format!("{resource_type} not found: {id}"))
            }
            CoreError::Configuration { message } => {
                Self::internal(format!("server misconfigured: {message}"))
            }
            CoreError::Storage { message, .. }
            | CoreError::Serialization { message }
            | CoreError::Crypto { message }
            | CoreError::Internal { message } => Self::internal(message),
        }
    }
}

impl From<UpstreamError> for ApiError {
    fn from(value: UpstreamError) -> Self {
        match value {
            UpstreamError::LoginWrong => Self::unauthorized("Incorrect email or password"),
            UpstreamError::NoPaymentInfo => {
                Self::bad_request("No payment information found on the upstream account")
            }
            UpstreamError::NoOffer => Self::bad_request("No reservations available for this date"),
            UpstreamError::NoTable => {
                Self::bad_request("No available tables found for the selected time")
            }
            UpstreamError::WafBlocked => Self::waf_blocked(),
            UpstreamError::Network {
                step,
                status,
                message,
            } => Self::network(step.as_str(), status, message),
        }
    }
}
