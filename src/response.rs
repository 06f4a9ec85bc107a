//! Response envelope shared by every endpoint.
//!
//! Success: `{"success": true, "data": <payload>, "error": null}`.
//! Failure: `{"success": false, "data": null, "error": {code, message, details?}}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<ApiError>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// One invalid request field, reported under `error.details`.
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Wrap a payload in the success envelope.
pub fn success(status: StatusCode, data: impl Serialize) -> Response {
    let body = ApiResponse {
        success: true,
        data: Some(serde_json::to_value(data).unwrap_or(serde_json::Value::Null)),
        error: None,
    };
    (status, Json(body)).into_response()
}

/// Wrap an error code in the failure envelope.
pub fn failure(
    status: StatusCode,
    code: &str,
    message: &str,
    details: Option<serde_json::Value>,
) -> Response {
    let body = ApiResponse {
        success: false,
        data: None,
        error: Some(ApiError {
            code: code.to_string(),
            message: message.to_string(),
            details,
        }),
    };
    (status, Json(body)).into_response()
}
