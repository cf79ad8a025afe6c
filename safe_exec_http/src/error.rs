//! Error types for the HTTP service

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use safe_exec_common::{ErrorBody, ErrorClass, ErrorCode};
use serde_json::json;
use thiserror::Error;

/// Failures of the service itself, as opposed to failures of a request.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP server error: {0}")]
    Serve(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// HTTP status for an error code.
pub fn status_for(code: ErrorCode) -> StatusCode {
    match code.class() {
        ErrorClass::Request => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        ErrorClass::Validation | ErrorClass::UserCode => StatusCode::BAD_REQUEST,
        ErrorClass::Timeout => StatusCode::REQUEST_TIMEOUT,
        ErrorClass::Infrastructure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// An error envelope response: `{"error": {...}}` with the mapped status.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError(pub ErrorBody);

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self(ErrorBody::new(code, message))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.code);
        (status, Json(json!({ "error": self.0 }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let expected = [
            (ErrorCode::BadContentType, 415),
            (ErrorCode::BadBody, 400),
            (ErrorCode::BadScript, 400),
            (ErrorCode::BadEncoding, 400),
            (ErrorCode::BadInput, 400),
            (ErrorCode::ScriptTooLarge, 400),
            (ErrorCode::SyntaxError, 400),
            (ErrorCode::NoMain, 400),
            (ErrorCode::ImportError, 400),
            (ErrorCode::InvalidMain, 400),
            (ErrorCode::Exception, 400),
            (ErrorCode::NonJsonReturn, 400),
            (ErrorCode::Timeout, 408),
            (ErrorCode::EmptyOutput, 500),
            (ErrorCode::BadRunnerOutput, 500),
            (ErrorCode::ExecutionError, 500),
            (ErrorCode::BadInvocation, 500),
        ];
        assert_eq!(expected.len(), ErrorCode::ALL.len());
        for (code, status) in expected {
            assert_eq!(status_for(code).as_u16(), status, "{code}");
        }
    }

    #[test]
    fn test_api_error_response_status() {
        let response = ApiError::new(ErrorCode::Timeout, "slow").into_response();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }
}
