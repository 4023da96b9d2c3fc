//! Handlers for `/auth/*` and `/health`.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use tracing::info;

use super::response::{parse_body, required, ApiResponse};
use super::AppState;
use crate::error::{AppError, AppResult, INVALID_ROLE};
use crate::identity::{
    client_info, split_bearer, LoginRequest, LoginResponse, RegisterRequest, RequestContext, Role,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    pub role: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginPayload {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Body of `/auth/refresh` and `/auth/logout`: `{"authorization": "Bearer <refreshToken>"}`.
#[derive(Debug, Deserialize)]
pub struct TokenPayload {
    pub authorization: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordPayload {
    pub current_password: Option<String>,
    pub password: Option<String>,
}

/// Run password hashing and other CPU-heavy auth work off the async workers.
async fn blocking<T, F>(f: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::internal("join_error".to_string(), e.to_string()))?
}

fn session_response(resp: ApiResponse, login: LoginResponse) -> ApiResponse {
    resp.with("accessToken", &login.tokens.access_token)
        .with("refreshToken", &login.tokens.refresh_token)
        .with("payload", login.user.to_public_json())
}

fn presented_refresh_token(payload: &TokenPayload) -> AppResult<String> {
    let raw = required(&payload.authorization, "Refresh token is required.")?;
    split_bearer(raw).map(str::to_string).ok_or_else(AppError::unauthorized)
}

pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<RegisterPayload>, JsonRejection>,
) -> AppResult<ApiResponse> {
    let p = parse_body(payload)?;
    let role = required(&p.role, "Role is required.")?;
    let name = required(&p.name, "Name is required.")?;
    let email = required(&p.email, "Email is required.")?;
    let phone_number = required(&p.phone_number, "Phone number is required.")?;
    let password = required(&p.password, "Password is required.")?;
    let role: Role = role.parse().map_err(|_| AppError::user("invalid_role", INVALID_ROLE))?;

    let req = RegisterRequest {
        role,
        name: name.to_string(),
        email: email.to_string(),
        phone_number: phone_number.to_string(),
        password: password.to_string(),
        client: client_info(&headers),
    };
    let auth = state.auth.clone();
    let created = blocking(move || auth.register(&req)).await?;
    Ok(session_response(ApiResponse::created("Registration successful."), created))
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<LoginPayload>, JsonRejection>,
) -> AppResult<ApiResponse> {
    let p = parse_body(payload)?;
    let (Some(email), Some(password)) = (p.email.filter(|s| !s.trim().is_empty()), p.password.filter(|s| !s.is_empty())) else {
        return Err(AppError::invalid_credential());
    };
    let req = LoginRequest { email, password, client: client_info(&headers) };
    let auth = state.auth.clone();
    let session = blocking(move || auth.login(&req)).await?;
    Ok(session_response(ApiResponse::ok("Logged In"), session))
}

pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<TokenPayload>, JsonRejection>,
) -> AppResult<ApiResponse> {
    let p = parse_body(payload)?;
    let presented = presented_refresh_token(&p)?;
    let pair = state.tokens.rotate(&presented, &client_info(&headers))?;
    Ok(ApiResponse::ok("New Access-and-Refresh Tokens has been generated!")
        .with("accessToken", &pair.access_token)
        .with("refreshToken", &pair.refresh_token))
}

/// Revoke the presented session. Succeeds whether or not it was still stored.
pub async fn logout(
    State(state): State<AppState>,
    payload: Result<Json<TokenPayload>, JsonRejection>,
) -> AppResult<ApiResponse> {
    let p = parse_body(payload)?;
    let presented = presented_refresh_token(&p)?;
    state.tokens.revoke(&presented)?;
    Ok(ApiResponse::ok("Logged Out"))
}

pub async fn logout_all_devices(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<ApiResponse> {
    if user_id.trim().is_empty() {
        return Err(AppError::user("missing_field", "User id is required."));
    }
    if state.store.0.lock().user_by_id(&user_id).is_none() {
        return Err(AppError::invalid_credential());
    }
    let removed = state.tokens.revoke_all(&user_id)?;
    if removed == 0 {
        return Ok(ApiResponse::ok("You have already logged out from all devices"));
    }
    Ok(ApiResponse::ok("Logged out from all devices").with("sessions", removed))
}

pub async fn change_password(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(user_id): Path<String>,
    payload: Result<Json<ChangePasswordPayload>, JsonRejection>,
) -> AppResult<ApiResponse> {
    ctx.ensure_self_or_admin(&user_id)?;
    let p = parse_body(payload)?;
    let current = required(&p.current_password, "Current password is required.")?.to_string();
    let password = required(&p.password, "Password is required.")?.to_string();
    let auth = state.auth.clone();
    let uid = user_id.clone();
    blocking(move || auth.change_password(&uid, &current, &password)).await?;
    info!(target: "http", user = %user_id, "password changed");
    Ok(ApiResponse::ok("Password has been changed successfully!"))
}

pub async fn health(State(state): State<AppState>) -> ApiResponse {
    ApiResponse::ok("Api's are Healthy, Server is running!")
        .with("health", "healthy")
        .with("timestamp", chrono::Utc::now().to_rfc3339())
        .with("uptime", state.started_at.elapsed().as_secs_f64())
        .with("service", "fieldtrack-auth")
        .with("version", env!("CARGO_PKG_VERSION"))
}
