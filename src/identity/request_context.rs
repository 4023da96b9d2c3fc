use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, USER_AGENT};
use axum::http::request::Parts;
use axum::http::HeaderMap;

use super::principal::Principal;
use super::session::ClientInfo;
use crate::error::{AppError, AppResult};
use crate::server::AppState;

/// Strip the `Bearer ` scheme. `None` when the scheme is missing or the token is empty.
pub fn split_bearer(raw: &str) -> Option<&str> {
    let raw = raw.trim();
    let (scheme, token) = raw.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") { return None; }
    let token = token.trim();
    if token.is_empty() { None } else { Some(token) }
}

/// Caller address and user agent, preferring the first `X-Forwarded-For` hop.
pub fn client_info(headers: &HeaderMap) -> ClientInfo {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()).map(str::to_string));
    let user_agent = headers.get(USER_AGENT).and_then(|v| v.to_str().ok()).map(str::to_string);
    ClientInfo { ip, user_agent }
}

/// Authenticated caller of a protected route, taken from a valid bearer access token.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub principal: Principal,
    pub client: ClientInfo,
}

impl RequestContext {
    /// Admins may act on anyone; other callers only on themselves.
    pub fn ensure_self_or_admin(&self, user_id: &str) -> AppResult<()> {
        if self.principal.is_admin() || self.principal.user_id == user_id {
            Ok(())
        } else {
            Err(AppError::forbidden("forbidden", crate::error::FORBIDDEN))
        }
    }
}

impl FromRequestParts<AppState> for RequestContext {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(split_bearer)
            .ok_or_else(AppError::unauthorized)?;
        let claims = state.tokens.verify_access(token)?;
        Ok(RequestContext { principal: claims.principal(), client: client_info(&parts.headers) })
    }
}
