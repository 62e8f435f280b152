//! Error responses.
//!
//! # Responsibilities
//! - Map gateway failures to HTTP status codes
//! - Render them as `{"detail": "..."}` JSON bodies
//!
//! # Design Decisions
//! - Validation problems are 400 and name the offending value
//! - Upstream connection failures are 502, upstream timeouts 504
//! - Local storage failures are 500

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::download::{TransferError, ValidationError};

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

/// An error rendered as a JSON `detail` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { detail: self.detail })).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::bad_request(e.to_string())
    }
}

impl From<&TransferError> for ApiError {
    fn from(e: &TransferError) -> Self {
        let status = match e {
            _ if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            TransferError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, format!("Failed to download model: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn transfer_errors_map_to_gateway_statuses() {
        let timeout = ApiError::from(&TransferError::Timeout(Duration::from_secs(5)));
        assert_eq!(timeout.status, StatusCode::GATEWAY_TIMEOUT);

        let status = ApiError::from(&TransferError::Status(StatusCode::NOT_FOUND));
        assert_eq!(status.status, StatusCode::BAD_GATEWAY);

        let io = ApiError::from(&TransferError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only",
        )));
        assert_eq!(io.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn renders_detail_body() {
        let response = ApiError::from(ValidationError::MissingField("url")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, serde_json::json!({ "detail": "url is required" }));
    }
}
