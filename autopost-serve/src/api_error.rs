//! Error responses for the control surface
//!
//! Every failure leaves the server as `{"error": message}` with a 4xx or 5xx
//! status. Messages built from library errors are passed through the
//! credential redactor first.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use libautopost::{AutopostError, Redactor};
use serde_json::json;

#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
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

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Map a library error to its status with credentials removed
    pub fn from_error(err: &AutopostError, redactor: &Redactor) -> Self {
        let status = StatusCode::from_u16(err.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, redactor.redact(&err.to_string()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.status.as_u16(), self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libautopost::error::{ConfigError, PlatformError};

    #[test]
    fn test_status_follows_error_class() {
        let redactor = Redactor::default();

        let err = AutopostError::InvalidInput("Text is empty".to_string());
        assert_eq!(ApiError::from_error(&err, &redactor).status, StatusCode::BAD_REQUEST);

        let err = AutopostError::Config(ConfigError::MissingCredential("gemini_api_key".to_string()));
        assert_eq!(ApiError::from_error(&err, &redactor).status, StatusCode::BAD_REQUEST);

        let err = AutopostError::Platform(PlatformError::Network("reset".to_string()));
        assert_eq!(
            ApiError::from_error(&err, &redactor).status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_message_is_redacted() {
        let redactor = Redactor::new(["tok-abcdef123456"]);
        let err = AutopostError::Platform(PlatformError::Posting(
            "rejected token tok-abcdef123456".to_string(),
        ));
        let api = ApiError::from_error(&err, &redactor);
        assert!(!api.message.contains("tok-abcdef123456"));
        assert!(api.message.contains("***"));
    }
}
