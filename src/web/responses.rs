//! HTTP response types and utilities
//!
//! Standardized response envelope and error mapping for the web layer.
//! Every error response carries a stable `code`, a human-readable message
//! and the request's correlation id; validation failures additionally carry
//! a field -> messages map.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::{AppError, AppResult, RepositoryError, TransportError};

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    /// Whether the operation was successful
    pub success: bool,
    /// Response data (present on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Stable error code (present on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Error message (present on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Field -> messages map for validation failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, Vec<String>>>,
    /// Correlation id of the request
    pub request_id: Uuid,
    /// Response timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl<T> ApiResponse<T>
where
    T: Serialize,
{
    /// Create a successful response
    pub fn success(data: T, request_id: Uuid) -> Self {
        Self {
            success: true,
            data: Some(data),
            code: None,
            error: None,
            details: None,
            request_id,
            timestamp: chrono::Utc::now(),
        }
    }
}

impl ApiResponse<()> {
    /// Create an error response
    pub fn error(
        code: &str,
        message: String,
        details: Option<HashMap<String, Vec<String>>>,
        request_id: Uuid,
    ) -> Self {
        Self {
            success: false,
            data: None,
            code: Some(code.to_string()),
            error: Some(message),
            details,
            request_id,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// HTTP status for each error kind
pub fn status_for(error: &AppError) -> StatusCode {
    match error {
        AppError::Validation { .. } => StatusCode::BAD_REQUEST,
        AppError::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
        AppError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
        AppError::NotFound { .. } => StatusCode::NOT_FOUND,
        // Payment-required signals the upsell path to clients at the cap
        AppError::ConcurrentLimit { .. } => StatusCode::PAYMENT_REQUIRED,
        AppError::Expired { .. } => StatusCode::GONE,
        AppError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
        AppError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        AppError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        AppError::Repository(RepositoryError::RecordNotFound { .. }) => StatusCode::NOT_FOUND,
        AppError::Repository(RepositoryError::ConnectionFailed { .. }) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        AppError::Transport(TransportError::CircuitOpen { .. }) => StatusCode::SERVICE_UNAVAILABLE,
        AppError::Transport(TransportError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
        AppError::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert an AppError to its HTTP response
pub fn handle_error(error: AppError, request_id: Uuid) -> Response {
    let status = status_for(&error);
    let details = match &error {
        AppError::Validation { fields, .. } => fields.clone(),
        _ => None,
    };
    let body = ApiResponse::error(error.code(), error.to_string(), details, request_id);
    (status, Json(body)).into_response()
}

/// Convert an AppResult to an HTTP response
pub fn handle_result<T>(result: AppResult<T>, request_id: Uuid) -> Response
where
    T: Serialize,
{
    match result {
        Ok(data) => ok(data, request_id),
        Err(error) => handle_error(error, request_id),
    }
}

/// Success response helper
pub fn ok<T: Serialize>(data: T, request_id: Uuid) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data, request_id))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_map_to_wire_statuses() {
        let cases = [
            (AppError::validation("bad"), StatusCode::BAD_REQUEST),
            (
                AppError::unauthenticated("no token"),
                StatusCode::UNAUTHORIZED,
            ),
            (
                AppError::ConcurrentLimit { current: 1, max: 1 },
                StatusCode::PAYMENT_REQUIRED,
            ),
            (
                AppError::Expired {
                    resource: "session".into(),
                    id: "x".into(),
                },
                StatusCode::GONE,
            ),
            (
                AppError::CircuitOpen {
                    service: "cdn".into(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AppError::Timeout {
                    operation: "fetch".into(),
                },
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                AppError::Unavailable {
                    service: "store".into(),
                    message: "down".into(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (AppError::internal("boom"), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, expected) in cases {
            assert_eq!(status_for(&error), expected, "{error}");
        }
    }
}
