//! Client-side persisted session: the token pair plus the logged-in user's profile.

use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{ClientError, ClientResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl Credentials {
    pub fn is_complete(&self) -> bool {
        self.access_token.as_deref().is_some_and(|t| !t.is_empty())
            && self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Public user document as returned in `payload` by the auth routes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub is_activated: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

/// Where the session survives between runs.
pub trait CredentialStore: Send + Sync + Debug {
    fn load(&self) -> ClientResult<PersistedState>;
    fn save(&self, state: &PersistedState) -> ClientResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<PersistedState>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self { Self::default() }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> ClientResult<PersistedState> { Ok(self.inner.lock().clone()) }

    fn save(&self, state: &PersistedState) -> ClientResult<()> {
        *self.inner.lock() = state.clone();
        Ok(())
    }
}

/// JSON file on disk. A missing or empty file loads as an empty session.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }

    pub fn path(&self) -> &Path { &self.path }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> ClientResult<PersistedState> {
        if !self.path.exists() {
            return Ok(PersistedState::default());
        }
        let content = fs::read_to_string(&self.path)
            .map_err(|e| ClientError::Storage(format!("failed to read {}: {}", self.path.display(), e)))?;
        if content.trim().is_empty() {
            return Ok(PersistedState::default());
        }
        serde_json::from_str(&content)
            .map_err(|e| ClientError::Storage(format!("failed to parse {}: {}", self.path.display(), e)))
    }

    fn save(&self, state: &PersistedState) -> ClientResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(state)
            .map_err(|e| ClientError::Storage(format!("failed to serialize session: {}", e)))?;
        fs::write(&self.path, content)
            .map_err(|e| ClientError::Storage(format!("failed to write {}: {}", self.path.display(), e)))
    }
}

/// In-memory view of the persisted session, written through on every change.
#[derive(Debug)]
pub struct SessionStore {
    backend: Arc<dyn CredentialStore>,
    state: RwLock<PersistedState>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn CredentialStore>) -> ClientResult<Self> {
        let state = backend.load()?;
        Ok(Self { backend, state: RwLock::new(state) })
    }

    pub fn in_memory() -> Self {
        Self { backend: Arc::new(MemoryCredentialStore::new()), state: RwLock::new(PersistedState::default()) }
    }

    pub fn credentials(&self) -> Credentials { self.state.read().credentials.clone() }

    pub fn access_token(&self) -> Option<String> { self.state.read().credentials.access_token.clone() }

    pub fn refresh_token(&self) -> Option<String> { self.state.read().credentials.refresh_token.clone() }

    pub fn is_authenticated(&self) -> bool { self.state.read().credentials.is_complete() }

    pub fn is_logged_in(&self) -> bool {
        let state = self.state.read();
        state.credentials.is_complete() && state.user.is_some()
    }

    pub fn user(&self) -> Option<UserProfile> { self.state.read().user.clone() }

    pub fn set_session(&self, access_token: impl Into<String>, refresh_token: impl Into<String>) -> ClientResult<()> {
        self.mutate(|s| {
            s.credentials = Credentials {
                access_token: Some(access_token.into()),
                refresh_token: Some(refresh_token.into()),
            };
        })
    }

    /// Replace only the tokens that are given.
    pub fn update_session(&self, access_token: Option<String>, refresh_token: Option<String>) -> ClientResult<()> {
        self.mutate(|s| {
            if access_token.is_some() {
                s.credentials.access_token = access_token;
            }
            if refresh_token.is_some() {
                s.credentials.refresh_token = refresh_token;
            }
        })
    }

    pub fn set_user(&self, user: UserProfile) -> ClientResult<()> { self.mutate(|s| s.user = Some(user)) }

    /// Edit the stored profile in place. Returns false when no user is stored.
    pub fn update_user<F: FnOnce(&mut UserProfile)>(&self, f: F) -> ClientResult<bool> {
        let mut state = self.state.write();
        let Some(user) = state.user.as_mut() else { return Ok(false); };
        f(user);
        self.backend.save(&state)?;
        Ok(true)
    }

    /// Drop tokens and profile.
    pub fn reset(&self) -> ClientResult<()> { self.mutate(|s| *s = PersistedState::default()) }

    fn mutate<F: FnOnce(&mut PersistedState)>(&self, f: F) -> ClientResult<()> {
        let mut state = self.state.write();
        f(&mut state);
        self.backend.save(&state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authenticated_needs_both_tokens() {
        let s = SessionStore::in_memory();
        assert!(!s.is_authenticated());
        s.update_session(Some("a".into()), None).unwrap();
        assert!(!s.is_authenticated());
        s.update_session(None, Some("r".into())).unwrap();
        assert!(s.is_authenticated());
        assert!(!s.is_logged_in());
        s.set_user(UserProfile { id: "u1".into(), ..Default::default() }).unwrap();
        assert!(s.is_logged_in());
        s.reset().unwrap();
        assert_eq!(s.credentials(), Credentials::default());
        assert!(s.user().is_none());
    }

    #[test]
    fn update_user_without_profile_is_noop() {
        let s = SessionStore::in_memory();
        assert!(!s.update_user(|u| u.name = "x".into()).unwrap());
        s.set_user(UserProfile { id: "u1".into(), ..Default::default() }).unwrap();
        assert!(s.update_user(|u| u.name = "Asha".into()).unwrap());
        assert_eq!(s.user().unwrap().name, "Asha");
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");
        let backend: Arc<dyn CredentialStore> = Arc::new(FileCredentialStore::new(&path));
        let s = SessionStore::new(backend.clone()).unwrap();
        assert!(!s.is_authenticated());
        s.set_session("acc", "ref").unwrap();

        let reopened = SessionStore::new(Arc::new(FileCredentialStore::new(&path))).unwrap();
        assert_eq!(reopened.access_token().as_deref(), Some("acc"));
        assert_eq!(reopened.refresh_token().as_deref(), Some("ref"));

        reopened.reset().unwrap();
        assert_eq!(backend.load().unwrap(), PersistedState::default());
    }

    #[test]
    fn profile_keeps_unknown_fields() {
        let raw = serde_json::json!({"id": "u1", "role": "user", "email": "a@depot.in", "region": "north"});
        let p: UserProfile = serde_json::from_value(raw).unwrap();
        assert_eq!(p.extra["region"], "north");
        assert_eq!(p.email, "a@depot.in");
    }
}
