use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Top-level application error for the relay.
/// All variants carry a human-readable message for display/logging.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Database errors ──────────────────────────────────────────────────────
    #[error("Database query failed: {message}")]
    DatabaseQueryFailed {
        message: String,
        #[source]
        source: sqlx::Error,
    },

    // ── Inference backend errors ─────────────────────────────────────────────
    #[error("Inference backend unavailable at {url}: {reason}")]
    BackendUnavailable { url: String, reason: String },

    #[error("Malformed stream event '{event}': {reason}")]
    EventParse { event: String, reason: String },

    // ── Validation errors ────────────────────────────────────────────────────
    #[error("Field '{field_name}' cannot be empty")]
    EmptyField { field_name: String },

    #[error("Field '{field_name}' exceeds max length of {max_length} (actual: {actual_length})")]
    FieldTooLong { field_name: String, max_length: usize, actual_length: usize },

    #[error("Only user turns can be submitted (got '{role}')")]
    InvalidRole { role: String },

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    // ── Auth errors ──────────────────────────────────────────────────────────
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // ── System errors ────────────────────────────────────────────────────────
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn db_query(message: impl Into<String>, source: sqlx::Error) -> Self {
        AppError::DatabaseQueryFailed { message: message.into(), source }
    }

    pub fn backend(url: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::BackendUnavailable { url: url.into(), reason: reason.into() }
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::EmptyField { .. }
                | AppError::FieldTooLong { .. }
                | AppError::InvalidRole { .. }
                | AppError::MalformedRequest(_)
        )
    }

    /// Every failure before the stream starts is reported as a server error,
    /// whether it came from the caller, the request body or the backend.
    pub fn status(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_are_server_errors() {
        let err = AppError::EmptyField { field_name: "content".to_string() };
        assert!(err.is_validation());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            AppError::MalformedRequest("missing field".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_backend_unavailable_is_server_error() {
        let err = AppError::backend("http://localhost:8000/process", "status 502");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("status 502"));
    }

    #[test]
    fn test_unauthorized_is_server_error() {
        assert_eq!(
            AppError::Unauthorized("missing caller".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_response_body_is_json_error() {
        let resp = AppError::InvalidRole { role: "assistant".into() }.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["error"].as_str().unwrap().contains("assistant"));
    }
}
