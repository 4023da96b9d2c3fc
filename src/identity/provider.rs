use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use super::principal::{Principal, Role};
use super::session::{ClientInfo, TokenManager, TokenPair};
use crate::error::{AppError, AppResult};
use crate::security::{self, MIN_PASSWORD_LEN};
use crate::storage::{SharedStore, UserRecord};

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub client: ClientInfo,
}

#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub role: Role,
    pub name: String,
    pub email: String,
    pub phone_number: String,
    pub password: String,
    pub client: ClientInfo,
}

#[derive(Debug, Clone)]
pub struct LoginResponse {
    pub user: UserRecord,
    pub tokens: TokenPair,
}

pub trait AuthProvider: Send + Sync {
    fn register(&self, req: &RegisterRequest) -> AppResult<LoginResponse>;
    fn login(&self, req: &LoginRequest) -> AppResult<LoginResponse>;
    fn change_password(&self, user_id: &str, current_password: &str, new_password: &str) -> AppResult<()>;
}

/// Password login against the local user collection.
pub struct LocalAuthProvider {
    pub store: SharedStore,
    pub tokens: TokenManager,
}

impl LocalAuthProvider {
    pub fn new(store: SharedStore, tokens: TokenManager) -> Self { Self { store, tokens } }
}

fn check_password_strength(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::user(
            "weak_password".to_string(),
            format!("Password must be at least {} characters long", MIN_PASSWORD_LEN),
        ));
    }
    Ok(())
}

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex"));

fn check_phone_number(phone: &str) -> AppResult<()> {
    let len = phone.trim().chars().count();
    if !(10..=12).contains(&len) || !phone.trim().chars().all(|c| c.is_ascii_digit() || c == '+') {
        return Err(AppError::user("invalid_phone", "Phone number must be 10 to 12 digits long"));
    }
    Ok(())
}

impl AuthProvider for LocalAuthProvider {
    fn register(&self, req: &RegisterRequest) -> AppResult<LoginResponse> {
        check_phone_number(&req.phone_number)?;
        check_password_strength(&req.password)?;
        if !EMAIL_RE.is_match(req.email.trim()) {
            return Err(AppError::user("invalid_email", "Email is invalid."));
        }
        // Hash before taking the lock; Argon2 is deliberately slow.
        let hash = security::hash_password(&req.password)?;
        let user = UserRecord::new(req.role, &req.name, &req.email, &req.phone_number, hash);
        {
            let mut store = self.store.0.lock();
            if store.user_by_email_or_phone(Some(&user.email), Some(&user.phone_number)).is_some() {
                return Err(AppError::user("duplicate_user", "Email or phone number already available."));
            }
            store.insert_user(user.clone())?;
        }
        let tokens = self.tokens.issue(&Principal::new(user.id.clone(), user.role), &req.client)?;
        info!(target: "auth", user = %user.id, role = %user.role, "auth.register");
        Ok(LoginResponse { user, tokens })
    }

    fn login(&self, req: &LoginRequest) -> AppResult<LoginResponse> {
        let user = self.store.0.lock().user_by_email(&req.email).cloned();
        let Some(user) = user else { return Err(AppError::invalid_credential()); };
        if !security::verify_password(&user.password_hash, &req.password) {
            return Err(AppError::invalid_credential());
        }
        if !user.is_activated {
            return Err(AppError::forbidden("account_not_activated", "Forbidden, Account is not activated!"));
        }
        let tokens = self.tokens.issue(&Principal::new(user.id.clone(), user.role), &req.client)?;
        info!(target: "auth", user = %user.id, "auth.login");
        Ok(LoginResponse { user, tokens })
    }

    fn change_password(&self, user_id: &str, current_password: &str, new_password: &str) -> AppResult<()> {
        if current_password == new_password {
            return Err(AppError::user("same_password", "Current password and password are same."));
        }
        check_password_strength(new_password)?;
        let user = self.store.0.lock().user_by_id(user_id).cloned();
        let Some(user) = user else { return Err(AppError::invalid_credential()); };
        if !security::verify_password(&user.password_hash, current_password) {
            return Err(AppError::user("wrong_password", "Current password is incorrect."));
        }
        let hash = security::hash_password(new_password)?;
        if !self.store.0.lock().update_password(user_id, hash)? {
            return Err(AppError::invalid_credential());
        }
        info!(target: "auth", user = %user_id, "auth.change_password");
        Ok(())
    }
}
