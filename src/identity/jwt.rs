//! HS256 signing and verification of access and refresh tokens.
//!
//! Access and refresh tokens use separate secrets, so a refresh token never
//! verifies as an access token and vice versa. Verification has zero leeway:
//! a token is rejected the second its `exp` passes.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};

use super::principal::{Claims, Principal};
use crate::error::{AppError, AppResult};

pub const ACCESS_TOKEN_TTL_SECS: i64 = 15 * 60;
pub const REFRESH_TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

pub struct JsonWebToken {
    access: KeyPair,
    refresh: KeyPair,
    access_ttl: Duration,
    refresh_ttl: Duration,
    validation: Validation,
}

impl std::fmt::Debug for JsonWebToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonWebToken")
            .field("access_ttl_secs", &self.access_ttl.num_seconds())
            .field("refresh_ttl_secs", &self.refresh_ttl.num_seconds())
            .finish_non_exhaustive()
    }
}

impl JsonWebToken {
    pub fn new(access_secret: &str, refresh_secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            access: KeyPair::from_secret(access_secret),
            refresh: KeyPair::from_secret(refresh_secret),
            access_ttl: Duration::seconds(ACCESS_TOKEN_TTL_SECS),
            refresh_ttl: Duration::seconds(REFRESH_TOKEN_TTL_SECS),
            validation,
        }
    }

    pub fn with_ttls(mut self, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        self.access_ttl = access_ttl;
        self.refresh_ttl = refresh_ttl;
        self
    }

    pub fn access_ttl(&self) -> Duration { self.access_ttl }
    pub fn refresh_ttl(&self) -> Duration { self.refresh_ttl }

    fn keys(&self, kind: TokenKind) -> &KeyPair {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    /// Sign a token for `principal` as if minted at `issued_at`.
    pub fn sign_at(&self, kind: TokenKind, principal: &Principal, issued_at: DateTime<Utc>) -> AppResult<String> {
        let claims = Claims {
            user_id: principal.user_id.clone(),
            role: principal.role,
            iat: issued_at.timestamp(),
            exp: (issued_at + self.ttl(kind)).timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.keys(kind).encoding)
            .map_err(|e| AppError::internal("token_sign_failed".to_string(), e.to_string()))
    }

    pub fn sign(&self, kind: TokenKind, principal: &Principal) -> AppResult<String> {
        self.sign_at(kind, principal, Utc::now())
    }

    /// `None` for a bad signature, an expired token, or anything that does not decode.
    pub fn verify(&self, kind: TokenKind, token: &str) -> Option<Claims> {
        match jsonwebtoken::decode::<Claims>(token, &self.keys(kind).decoding, &self.validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                tracing::debug!(target: "auth", kind = ?kind, "token rejected: {}", e);
                None
            }
        }
    }

    pub fn generate_access_token(&self, principal: &Principal) -> AppResult<String> {
        self.sign(TokenKind::Access, principal)
    }

    pub fn verify_access_token(&self, token: &str) -> Option<Claims> {
        self.verify(TokenKind::Access, token)
    }

    pub fn generate_refresh_token(&self, principal: &Principal) -> AppResult<String> {
        self.sign(TokenKind::Refresh, principal)
    }

    pub fn verify_refresh_token(&self, token: &str) -> Option<Claims> {
        self.verify(TokenKind::Refresh, token)
    }
}
