//! HTTP error responses.
//!
//! Every error leaving a handler is rendered as the standard JSON envelope
//! with a machine-readable code and a human-readable message. Internal
//! errors are logged with their full chain but reach the client as a
//! generic message.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Validation(message) => message.clone(),
            AppError::Internal(_) => "An internal error occurred".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(err) = &self {
            tracing::error!(error = ?err, "internal error");
        }
        let body = json!({
            "data": null,
            "meta": { "timestamp": chrono::Utc::now().to_rfc3339() },
            "errors": [{ "code": self.code(), "message": self.message() }],
        });
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_maps_to_400() {
        let err = AppError::Validation("prompt must not be empty".to_string());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "validation_error");
        assert_eq!(err.message(), "prompt must not be empty");
    }

    #[test]
    fn test_internal_hides_details() {
        let err = AppError::Internal(anyhow::anyhow!("db password rejected"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message().contains("password"));
    }
}
