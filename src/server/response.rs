use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{AppError, AppResult, BAD_REQUEST};

/// Success envelope: `{message, success: true, status, ...fields}`.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    message: String,
    fields: Map<String, Value>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into(), fields: Map::new() }
    }

    pub fn ok(message: impl Into<String>) -> Self { Self::new(StatusCode::OK, message) }

    pub fn created(message: impl Into<String>) -> Self { Self::new(StatusCode::CREATED, message) }

    /// Merge a top-level field into the envelope. Values that fail to serialize become null.
    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        self.fields.insert(key.to_string(), serde_json::to_value(value).unwrap_or(Value::Null));
        self
    }

    pub fn body(&self) -> Value {
        let mut obj = self.fields.clone();
        obj.insert("message".into(), Value::String(self.message.clone()));
        obj.insert("success".into(), Value::Bool(true));
        obj.insert("status".into(), Value::from(self.status.as_u16()));
        Value::Object(obj)
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body())).into_response()
    }
}

/// Unwrap a JSON body, turning axum's rejection into the 400 envelope.
pub fn parse_body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    match payload {
        Ok(Json(v)) => Ok(v),
        Err(rej) => {
            tracing::debug!(target: "http", "rejected body: {}", rej.body_text());
            Err(AppError::user("bad_request", BAD_REQUEST))
        }
    }
}

/// Required, non-blank string field.
pub fn required<'a>(value: &'a Option<String>, message: &str) -> AppResult<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AppError::user("missing_field", message)),
    }
}
