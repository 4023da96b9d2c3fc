use thiserror::Error;

/// Errors surfaced by [`ApiClient`](super::ApiClient).
///
/// Payloads are plain strings so one refresh outcome can be cloned out to every
/// request waiting on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The server no longer knows the refresh token. Never retried.
    #[error("Session terminated, please log in again")]
    SessionTerminated,

    #[error("Session expired, please log in again")]
    SessionExpired,

    #[error("No refresh token stored")]
    NoRefreshToken,

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Request cancelled")]
    Cancelled,

    #[error("Credential storage error: {0}")]
    Storage(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// True for the outcomes after which the caller has to log in again.
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            ClientError::SessionTerminated | ClientError::SessionExpired | ClientError::NoRefreshToken | ClientError::NotLoggedIn
        )
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Http(err.to_string())
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::InvalidResponse(err.to_string())
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
