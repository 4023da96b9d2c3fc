//! Unified application error model and mapping helpers.
//! Every route handler returns `AppResult<_>`; the error renders itself as the
//! standard JSON envelope `{message, success: false, status}` with the matching
//! HTTP status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

pub const BAD_REQUEST: &str = "Bad Request, Something Went Wrong!";
pub const UNAUTHORIZED: &str = "Unauthorized, access is denied due to invalid token or token has expired!";
pub const FORBIDDEN: &str = "Forbidden, do not have a permission to access this resource!";
pub const ROUTE_NOT_FOUND: &str = "Route Not Found!";
pub const INTERNAL_SERVER_ERROR: &str = "Internal Server Error!";
pub const INVALID_CREDENTIAL: &str = "Invalid Credential!";
pub const INVALID_ROLE: &str = "Invalid Role!";
pub const SESSION_TERMINATED: &str = "Session terminated";

const SESSION_TERMINATED_CODE: &str = "session_terminated";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    UserInput { code: String, message: String },
    Auth { code: String, message: String },
    Forbidden { code: String, message: String },
    NotFound { code: String, message: String },
    Conflict { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::Auth { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::Auth { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn user<S: Into<String>>(code: S, msg: S) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn auth<S: Into<String>>(code: S, msg: S) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn forbidden<S: Into<String>>(code: S, msg: S) -> Self { AppError::Forbidden { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn conflict<S: Into<String>>(code: S, msg: S) -> Self { AppError::Conflict { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Generic 401 for malformed, unsigned or expired tokens.
    pub fn unauthorized() -> Self { AppError::auth("unauthorized", UNAUTHORIZED) }

    pub fn invalid_credential() -> Self { AppError::user("invalid_credential", INVALID_CREDENTIAL) }

    /// 401 for a correctly signed refresh token that is no longer stored.
    /// Clients must not retry after receiving it.
    pub fn session_terminated() -> Self { AppError::auth(SESSION_TERMINATED_CODE, SESSION_TERMINATED) }

    pub fn is_session_terminated(&self) -> bool {
        matches!(self, AppError::Auth { code, .. } if code == SESSION_TERMINATED_CODE)
    }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::Auth { .. } => 401,
            AppError::Forbidden { .. } => 403,
            AppError::NotFound { .. } => 404,
            AppError::Conflict { .. } => 409,
            AppError::Internal { .. } => 500,
        }
    }

    /// Message safe to hand to clients. Internal details stay in the logs.
    pub fn public_message(&self) -> &str {
        match self {
            AppError::Internal { .. } => INTERNAL_SERVER_ERROR,
            other => other.message(),
        }
    }

    /// Render the `{message, success, status}` envelope.
    pub fn to_body(&self) -> serde_json::Value {
        let status = self.http_status();
        let mut body = serde_json::json!({
            "message": self.public_message(),
            "success": false,
            "status": status,
        });
        if self.is_session_terminated() {
            body["isSessionTerminated"] = serde_json::Value::Bool(true);
        }
        body
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal { code: "internal_error".into(), message: format!("{err:#}") }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal { code, message } = &self {
            tracing::error!(target: "http", code = %code, "internal error: {}", message);
        }
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_body())).into_response()
    }
}
