//! Per-request failure values.
//!
//! # Responsibilities
//! - Carry the status, message and details of a failed request
//! - Travel from the failing stage to the failure handler untouched
//!
//! # Design Decisions
//! - Stages never render error bodies themselves
//! - `into_response` only sets the status and stashes the failure in the
//!   response extensions; `http::failure` renders it
//! - Status defaults to 500 when the failing stage names none

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// A single problem reported by a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetail {
    /// Where the problem is, e.g. `/query/limit` or `/body/name`.
    pub path: String,

    pub message: String,

    #[serde(rename = "errorCode", skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl ErrorDetail {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            error_code: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }
}

/// A failure signalled by any stage of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{status}: {message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub errors: Vec<ErrorDetail>,
}

impl ApiError {
    /// A failure with the default status (500).
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            errors: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_errors(mut self, errors: Vec<ErrorDetail>) -> Self {
        self.errors = errors;
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(message).with_status(StatusCode::BAD_REQUEST)
    }

    pub fn not_found(path: &str) -> Self {
        Self::new("not found")
            .with_status(StatusCode::NOT_FOUND)
            .with_errors(vec![ErrorDetail::new(path, "not found")])
    }

    pub fn payload_too_large(limit: usize) -> Self {
        Self::new(format!("request entity too large (limit {limit} bytes)"))
            .with_status(StatusCode::PAYLOAD_TOO_LARGE)
    }

    /// Build a 400 from a list of details, joining their messages.
    pub fn validation(errors: Vec<ErrorDetail>) -> Self {
        let message = errors
            .iter()
            .map(|e| format!("{} {}", e.path, e.message))
            .collect::<Vec<_>>()
            .join(", ");
        Self::bad_request(message).with_errors(errors)
    }
}

/// Response extension marking a response as an unrendered failure.
#[derive(Debug, Clone)]
pub struct Failure(pub ApiError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = self.status.into_response();
        response.extensions_mut().insert(Failure(self));
        response
    }
}
