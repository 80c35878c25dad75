//! The shared response envelope `{success, message?, data?, errors?}`
//! every HTTP response is wrapped in.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::errors::GateError;

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, message: None, data: Some(data), errors: None }
    }

    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        Self { success: true, message: Some(message.into()), data: Some(data), errors: None }
    }
}

impl Envelope<()> {
    pub fn error(message: impl Into<String>) -> Self {
        Self { success: false, message: Some(message.into()), data: None, errors: None }
    }
}

/// Maps a `GateError` straight to an envelope'd JSON response using
/// `GateError::status_code` for the HTTP status.
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn from_gate_error(err: GateError, debug_mode: bool) -> Self {
        let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = err.public_message(debug_mode);
        Self { status, message }
    }

    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Envelope::<()>::error(self.message);
        (self.status, Json(body)).into_response()
    }
}

/// Convenience wrapper so handlers can return `Result<Json<Envelope<T>>,
/// ApiError>` without repeating the success-path boilerplate.
pub fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope::ok(data))
}
