//!
//! fieldtrack HTTP server
//! ----------------------
//! Axum-based REST API in front of the token lifecycle.
//!
//! Responsibilities:
//! - Registration and password login, each opening a new refresh-token session.
//! - Refresh with rotation-on-use, single logout, logout from all devices.
//! - Password change and read-only user listing behind a bearer access token.
//! - Background sweep of expired refresh-token records.
//!
//! Every response, success or failure, uses the `{message, success, status, ...}`
//! envelope built in `response`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::{delete, get, post};
use axum::Router;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::{AppError, ROUTE_NOT_FOUND};
use crate::identity::{AuthProvider, JsonWebToken, LocalAuthProvider, TokenManager};
use crate::storage::SharedStore;

pub mod auth;
pub mod response;
pub mod users;

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub tokens: TokenManager,
    pub auth: Arc<dyn AuthProvider>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: &ServerConfig, store: SharedStore) -> Self {
        let jwt = JsonWebToken::new(&config.access_token_secret, &config.refresh_token_secret).with_ttls(
            chrono::Duration::seconds(config.access_ttl_secs),
            chrono::Duration::seconds(config.refresh_ttl_secs),
        );
        let tokens = TokenManager::new(jwt, store.clone());
        let auth: Arc<dyn AuthProvider> = Arc::new(LocalAuthProvider::new(store.clone(), tokens.clone()));
        Self { store, tokens, auth, started_at: Instant::now() }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(auth::health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/logout/all/devices/{user_id}", delete(auth::logout_all_devices))
        .route("/auth/change-password/{user_id}", post(auth::change_password))
        .route("/users", get(users::list_users))
        .route("/users/{user_id}", get(users::get_user))
        .fallback(|| async { AppError::not_found("route_not_found", ROUTE_NOT_FOUND) })
        .with_state(state)
}

/// Periodically delete refresh-token records whose expiry has passed.
pub fn spawn_token_sweeper(tokens: TokenManager, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match tokens.cleanup_expired() {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(target: "auth", removed, "token_sweep"),
                Err(e) => warn!(target: "auth", "token sweep failed: {}", e),
            }
        }
    })
}

/// Serve the API on an already-bound listener until the task is dropped.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Start the fieldtrack HTTP server.
///
/// Opens (or creates) the store, starts the expiry sweeper and mounts all routes.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    config.validate()?;
    if config.uses_dev_secrets() {
        warn!(target: "startup", "using built-in development token secrets; set {} and {}", crate::config::ENV_ACCESS_SECRET, crate::config::ENV_REFRESH_SECRET);
    }

    let store = match &config.data_folder {
        Some(dir) => {
            info!(target: "startup", "data folder: {}", dir.display());
            SharedStore::open(dir)?
        }
        None => {
            warn!(target: "startup", "no data folder configured; sessions and users are kept in memory only");
            SharedStore::in_memory()
        }
    };

    let state = AppState::new(&config, store);
    if config.sweep_interval_secs > 0 {
        spawn_token_sweeper(state.tokens.clone(), Duration::from_secs(config.sweep_interval_secs));
    } else {
        info!(target: "startup", "expired token sweeper disabled");
    }

    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve(listener, state).await
}
