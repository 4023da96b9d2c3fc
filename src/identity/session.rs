use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::jwt::{JsonWebToken, TokenKind};
use super::principal::{Claims, Principal};
use crate::error::{AppError, AppResult};
use crate::storage::{AuthTokenRecord, SharedStore};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Where a session was opened from; stored on the refresh-token record.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Mints, rotates and revokes access/refresh token pairs.
///
/// Access tokens are stateless. Every refresh token has exactly one stored
/// record; a refresh token without a live record is dead even if its signature
/// and expiry still check out.
#[derive(Clone, Debug)]
pub struct TokenManager {
    jwt: Arc<JsonWebToken>,
    store: SharedStore,
}

impl TokenManager {
    pub fn new(jwt: JsonWebToken, store: SharedStore) -> Self {
        Self { jwt: Arc::new(jwt), store }
    }

    pub fn jwt(&self) -> &JsonWebToken { &self.jwt }

    pub fn store(&self) -> &SharedStore { &self.store }

    /// Sign a fresh pair and build its stored record without touching the store.
    fn mint(&self, principal: &Principal, client: &ClientInfo) -> AppResult<(TokenPair, AuthTokenRecord)> {
        let now = Utc::now();
        let access_token = self.jwt.sign_at(TokenKind::Access, principal, now)?;
        let refresh_token = self.jwt.sign_at(TokenKind::Refresh, principal, now)?;
        let record = AuthTokenRecord {
            user_id: principal.user_id.clone(),
            refresh_token: refresh_token.clone(),
            expires_at: now + self.jwt.refresh_ttl(),
            ip: client.ip.clone().unwrap_or_else(|| "0.0.0.0".to_string()),
            user_agent: client.user_agent.clone().unwrap_or_else(|| "unknown".to_string()),
            created_at: now,
        };
        Ok((TokenPair { access_token, refresh_token }, record))
    }

    pub fn issue(&self, principal: &Principal, client: &ClientInfo) -> AppResult<TokenPair> {
        let (pair, record) = self.mint(principal, client)?;
        self.store.0.lock().insert_auth_token(record)?;
        debug!(target: "auth", user = %principal.user_id, role = %principal.role, "session.issue");
        Ok(pair)
    }

    /// Exchange a refresh token for a new pair. The presented token is consumed:
    /// a second presentation fails with a session-terminated error. If the new
    /// record cannot be stored the presented token stays valid.
    pub fn rotate(&self, presented: &str, client: &ClientInfo) -> AppResult<TokenPair> {
        let claims = self.jwt.verify_refresh_token(presented).ok_or_else(AppError::unauthorized)?;
        let (pair, record) = self.mint(&claims.principal(), client)?;
        let mut store = self.store.0.lock();
        let owner = match store.find_valid_auth_token(presented, Utc::now()) {
            Some(record) => record.user_id.clone(),
            None => {
                debug!(target: "auth", user = %claims.user_id, "session.rotate: token not stored");
                return Err(AppError::session_terminated());
            }
        };
        if owner != claims.user_id {
            return Err(AppError::unauthorized());
        }
        store.replace_auth_token(presented, record)?;
        debug!(target: "auth", user = %claims.user_id, "session.rotate");
        Ok(pair)
    }

    /// Delete one stored refresh token. Returns whether a record existed.
    pub fn revoke(&self, refresh_token: &str) -> AppResult<bool> {
        let removed = self.store.0.lock().delete_auth_token(refresh_token)?;
        if let Some(r) = &removed {
            debug!(target: "auth", user = %r.user_id, "session.revoke");
        }
        Ok(removed.is_some())
    }

    /// Delete every stored refresh token of `user_id` (logout from all devices).
    pub fn revoke_all(&self, user_id: &str) -> AppResult<usize> {
        let count = self.store.0.lock().delete_auth_tokens_for_user(user_id)?;
        info!(target: "auth", user = %user_id, count, "session.revoke_all");
        Ok(count)
    }

    pub fn verify_access(&self, access_token: &str) -> AppResult<Claims> {
        self.jwt.verify_access_token(access_token).ok_or_else(AppError::unauthorized)
    }

    pub fn cleanup_expired(&self) -> AppResult<usize> {
        Ok(self.store.0.lock().delete_expired_auth_tokens(Utc::now())?)
    }
}
