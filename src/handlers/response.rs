use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::{AppError, Result};

/// Serialises `value` with sonic-rs into a JSON response.
pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Result<Response> {
    let body = sonic_rs::to_string(value)
        .map_err(|e| AppError::Internal(format!("Response serialization failed: {}", e)))?;
    Ok((status, [(header::CONTENT_TYPE, "application/json")], body).into_response())
}

/// `{"error": message}` with the given status.
pub fn error_json(status: StatusCode, message: &str) -> Response {
    let body = sonic_rs::to_string(&sonic_rs::json!({ "error": message }))
        .unwrap_or_else(|_| r#"{"error":"Internal server error"}"#.to_string());
    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}

/// `{"success": true, "message": message}`.
pub fn success(message: &str) -> Result<Response> {
    json(
        StatusCode::OK,
        &sonic_rs::json!({ "success": true, "message": message }),
    )
}
