//! Identity and token lifecycle: who the caller is, how their tokens are minted,
//! rotated and revoked, and how protected routes recover the caller from a bearer token.

mod principal;
mod jwt;
mod session;
mod provider;
mod request_context;

pub use principal::{Claims, Principal, Role};
pub use jwt::{JsonWebToken, TokenKind, ACCESS_TOKEN_TTL_SECS, REFRESH_TOKEN_TTL_SECS};
pub use session::{ClientInfo, TokenManager, TokenPair};
pub use provider::{AuthProvider, LocalAuthProvider, LoginRequest, LoginResponse, RegisterRequest};
pub use request_context::{client_info, split_bearer, RequestContext};
