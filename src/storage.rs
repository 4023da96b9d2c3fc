//!
//! fieldtrack storage module
//! -------------------------
//! Document store for the two collections the auth service owns: `users` and
//! `auth_tokens` (one record per live refresh token).
//!
//! Key responsibilities:
//! - Uniqueness: one user per email and per phone number, one auth-token record
//!   per refresh-token value.
//! - Expiry: auth-token lookups ignore records whose `expires_at` has passed, and
//!   `delete_expired_auth_tokens` garbage-collects them (the background sweeper in
//!   `server` calls it on an interval).
//! - Optional persistence: when opened on a folder, the whole store is snapshotted
//!   to `<folder>/store.json` after every mutation and reloaded on startup. A
//!   mutation only becomes visible in memory once its snapshot is on disk.
//!
//! The public API centers around the `Store` type, usually wrapped in a thread-safe
//! `SharedStore` (`Arc<Mutex<Store>>`). Never hold the lock across an `.await`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::identity::Role;

pub mod pagination;

const SNAPSHOT_FILE: &str = "store.json";

/// Stored user document. `password_hash` never leaves the server; use
/// [`UserRecord::to_public_json`] when rendering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub role: Role,
    pub name: String,
    pub email: String,
    pub phone_number: String,
    pub password_hash: String,
    #[serde(default = "default_true")]
    pub is_activated: bool,
    #[serde(default)]
    pub is_email_verified: bool,
    #[serde(default)]
    pub is_phone_number_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool { true }

/// Keys stripped from every user payload sent to clients.
pub const PRIVATE_USER_KEYS: &[&str] = &["passwordHash"];

impl UserRecord {
    pub fn new(role: Role, name: &str, email: &str, phone_number: &str, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            role,
            name: name.trim().to_string(),
            email: email.trim().to_ascii_lowercase(),
            phone_number: phone_number.trim().to_string(),
            password_hash,
            is_activated: true,
            is_email_verified: false,
            is_phone_number_verified: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn to_public_json(&self) -> serde_json::Value {
        let mut v = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let Some(obj) = v.as_object_mut() {
            for k in PRIVATE_USER_KEYS { obj.remove(*k); }
        }
        v
    }
}

/// Server-side record of one issued refresh token (one device session).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokenRecord {
    pub user_id: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub ip: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
}

impl AuthTokenRecord {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool { self.expires_at > now }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Collections {
    #[serde(default)]
    users: HashMap<String, UserRecord>,
    /// Keyed by refresh-token value, which enforces uniqueness.
    #[serde(default)]
    auth_tokens: HashMap<String, AuthTokenRecord>,
}

#[derive(Debug, Default)]
pub struct Store {
    data: Collections,
    snapshot: Option<PathBuf>,
}

impl Store {
    pub fn in_memory() -> Self { Self::default() }

    /// Open a store persisted under `root`, creating the folder when missing and
    /// loading the last snapshot if one exists.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root)
            .with_context(|| format!("Failed to create or access data folder: {}", root.display()))?;
        let path = root.join(SNAPSHOT_FILE);
        let data = if path.exists() {
            let bytes = fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
            if bytes.iter().all(|b| b.is_ascii_whitespace()) {
                Collections::default()
            } else {
                serde_json::from_slice(&bytes).with_context(|| format!("Failed to parse {}", path.display()))?
            }
        } else {
            Collections::default()
        };
        debug!(target: "fieldtrack::storage", users = data.users.len(), auth_tokens = data.auth_tokens.len(), "opened store at {}", path.display());
        Ok(Self { data, snapshot: Some(path) })
    }

    pub fn snapshot_path(&self) -> Option<&Path> { self.snapshot.as_deref() }

    /// Apply `change` to a copy of the collections, write the copy, then swap it in.
    /// A failed write leaves the in-memory state untouched.
    fn commit<T>(&mut self, change: impl FnOnce(&mut Collections) -> Result<T>) -> Result<T> {
        let Some(path) = &self.snapshot else { return change(&mut self.data); };
        let mut next = self.data.clone();
        let out = change(&mut next)?;
        write_snapshot(path, &next)?;
        self.data = next;
        Ok(out)
    }

    // --- users ---

    pub fn insert_user(&mut self, user: UserRecord) -> Result<()> {
        if self.data.users.contains_key(&user.id) {
            bail!("duplicate user id: {}", user.id);
        }
        if self.user_by_email_or_phone(Some(&user.email), Some(&user.phone_number)).is_some() {
            bail!("email or phone number already registered");
        }
        debug!(target: "fieldtrack::storage", user_id = %user.id, "insert_user");
        self.commit(|data| {
            data.users.insert(user.id.clone(), user);
            Ok(())
        })
    }

    pub fn user_by_id(&self, id: &str) -> Option<&UserRecord> { self.data.users.get(id) }

    pub fn user_by_email(&self, email: &str) -> Option<&UserRecord> {
        let email = email.trim();
        self.data.users.values().find(|u| u.email.eq_ignore_ascii_case(email))
    }

    pub fn user_by_email_or_phone(&self, email: Option<&str>, phone: Option<&str>) -> Option<&UserRecord> {
        let email = email.map(str::trim).filter(|s| !s.is_empty());
        let phone = phone.map(str::trim).filter(|s| !s.is_empty());
        self.data.users.values().find(|u| {
            email.is_some_and(|e| u.email.eq_ignore_ascii_case(e)) || phone.is_some_and(|p| u.phone_number == p)
        })
    }

    /// Returns false when the user does not exist.
    pub fn update_password(&mut self, id: &str, password_hash: String) -> Result<bool> {
        if !self.data.users.contains_key(id) {
            return Ok(false);
        }
        self.commit(|data| {
            if let Some(user) = data.users.get_mut(id) {
                user.password_hash = password_hash;
                user.updated_at = Utc::now();
            }
            Ok(true)
        })
    }

    pub fn users(&self) -> impl Iterator<Item = &UserRecord> { self.data.users.values() }

    pub fn user_count(&self) -> usize { self.data.users.len() }

    // --- auth tokens ---

    pub fn insert_auth_token(&mut self, record: AuthTokenRecord) -> Result<()> {
        if self.data.auth_tokens.contains_key(&record.refresh_token) {
            bail!("duplicate refresh token for user {}", record.user_id);
        }
        self.commit(|data| {
            data.auth_tokens.insert(record.refresh_token.clone(), record);
            Ok(())
        })
    }

    /// Swap `old` for `next` in one write: either both happen or neither does.
    pub fn replace_auth_token(&mut self, old: &str, next: AuthTokenRecord) -> Result<()> {
        if self.data.auth_tokens.contains_key(&next.refresh_token) {
            bail!("duplicate refresh token for user {}", next.user_id);
        }
        self.commit(|data| {
            data.auth_tokens.remove(old);
            data.auth_tokens.insert(next.refresh_token.clone(), next);
            Ok(())
        })
    }

    /// The stored record for `refresh_token`, ignoring expired ones.
    pub fn find_valid_auth_token(&self, refresh_token: &str, now: DateTime<Utc>) -> Option<&AuthTokenRecord> {
        self.data.auth_tokens.get(refresh_token).filter(|r| r.is_live(now))
    }

    pub fn delete_auth_token(&mut self, refresh_token: &str) -> Result<Option<AuthTokenRecord>> {
        if !self.data.auth_tokens.contains_key(refresh_token) {
            return Ok(None);
        }
        self.commit(|data| Ok(data.auth_tokens.remove(refresh_token)))
    }

    pub fn delete_auth_tokens_for_user(&mut self, user_id: &str) -> Result<usize> {
        self.delete_auth_tokens_where(|r| r.user_id == user_id)
    }

    pub fn delete_expired_auth_tokens(&mut self, now: DateTime<Utc>) -> Result<usize> {
        self.delete_auth_tokens_where(|r| !r.is_live(now))
    }

    fn delete_auth_tokens_where(&mut self, doomed: impl Fn(&AuthTokenRecord) -> bool) -> Result<usize> {
        let removed = self.data.auth_tokens.values().filter(|&r| doomed(r)).count();
        if removed == 0 {
            return Ok(0);
        }
        self.commit(|data| {
            data.auth_tokens.retain(|_, r| !doomed(r));
            Ok(removed)
        })
    }

    /// Count of stored records for `user_id`, expired ones included.
    pub fn auth_token_count_for_user(&self, user_id: &str) -> usize {
        self.data.auth_tokens.values().filter(|r| r.user_id == user_id).count()
    }
}

fn write_snapshot(path: &Path, data: &Collections) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(data)?;
    fs::write(&tmp, bytes).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

/// Thread-safe shared handle to the store.
#[derive(Clone, Debug)]
pub struct SharedStore(pub Arc<Mutex<Store>>);

impl SharedStore {
    pub fn in_memory() -> Self { Self(Arc::new(Mutex::new(Store::in_memory()))) }

    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        Ok(Self(Arc::new(Mutex::new(Store::open(root)?))))
    }
}
