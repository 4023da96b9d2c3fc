//! Rust client for the fieldtrack API: persisted session plus single-flight token refresh.

mod api;
mod error;
mod session;

pub use api::{ApiClient, ClientConfig, RawResponse, RegisterInput};
pub use error::{ClientError, ClientResult};
pub use session::{Credentials, CredentialStore, FileCredentialStore, MemoryCredentialStore, PersistedState, SessionStore, UserProfile};
