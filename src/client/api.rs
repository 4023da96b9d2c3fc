//! HTTP client for the fieldtrack API with transparent access-token refresh.
//!
//! Every request carries the stored access token. A 401 triggers one refresh
//! against `refresh_path`; concurrent 401s queue behind that refresh instead of
//! starting their own, then replay once with the new token. A failed refresh
//! rejects the whole queue and clears the stored session.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use super::error::{ClientError, ClientResult};
use super::session::{SessionStore, UserProfile};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub refresh_path: String,
    pub login_path: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8081".to_string(),
            timeout_secs: 10,
            refresh_path: "/auth/refresh".to_string(),
            login_path: "/auth/login".to_string(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), ..Default::default() }
    }

    pub fn endpoint_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    pub fn validate(&self) -> ClientResult<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ClientError::Config(format!("base url must be http(s): {}", self.base_url)));
        }
        if self.timeout_secs == 0 {
            return Err(ClientError::Config("timeout must be positive".into()));
        }
        Ok(())
    }

    fn is_auth_endpoint(&self, path: &str) -> bool {
        let p = path.trim_start_matches('/');
        p == self.refresh_path.trim_start_matches('/') || p == self.login_path.trim_start_matches('/')
    }
}

/// Fields accepted by `/auth/register`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInput {
    pub role: String,
    pub name: String,
    pub email: String,
    pub phone_number: String,
    pub password: String,
}

/// Status and decoded body of one HTTP exchange.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Value,
}

impl RawResponse {
    pub fn is_success(&self) -> bool { (200..300).contains(&self.status) }

    pub fn is_session_terminated(&self) -> bool {
        self.status == 401 && self.body.get("isSessionTerminated").and_then(Value::as_bool) == Some(true)
    }

    pub fn message(&self) -> String {
        match &self.body {
            Value::String(s) => s.clone(),
            other => other.get("message").and_then(Value::as_str).unwrap_or("Unknown API error").to_string(),
        }
    }

    pub fn into_result(self) -> ClientResult<Value> {
        if self.is_success() {
            return Ok(self.body);
        }
        let message = self.message();
        if self.status == 401 {
            return Err(ClientError::Unauthorized(message));
        }
        Err(ClientError::Api { status: self.status, message })
    }
}

#[derive(Debug, Default)]
struct RefreshState {
    refreshing: bool,
    queue: VecDeque<oneshot::Sender<ClientResult<String>>>,
}

/// Settles the queue when the leading request finishes its refresh, or is dropped mid-way.
struct RefreshLeader<'a> {
    state: &'a Mutex<RefreshState>,
    settled: bool,
}

impl RefreshLeader<'_> {
    fn settle(mut self, outcome: &ClientResult<String>) {
        self.settled = true;
        release_waiters(self.state, outcome);
    }
}

impl Drop for RefreshLeader<'_> {
    fn drop(&mut self) {
        if !self.settled {
            release_waiters(self.state, &Err(ClientError::Cancelled));
        }
    }
}

fn release_waiters(state: &Mutex<RefreshState>, outcome: &ClientResult<String>) {
    let waiters = {
        let mut st = state.lock();
        st.refreshing = false;
        std::mem::take(&mut st.queue)
    };
    if !waiters.is_empty() {
        debug!(target: "client", waiters = waiters.len(), ok = outcome.is_ok(), "refresh queue released");
    }
    for tx in waiters {
        let _ = tx.send(outcome.clone());
    }
}

#[derive(Debug)]
struct Inner {
    http: Client,
    config: ClientConfig,
    session: Arc<SessionStore>,
    refresh: Mutex<RefreshState>,
    abort: watch::Sender<u64>,
}

/// Cheap to clone; clones share the session, the refresh queue and the abort signal.
#[derive(Debug, Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

impl ApiClient {
    pub fn new(config: ClientConfig, session: Arc<SessionStore>) -> ClientResult<Self> {
        config.validate()?;
        let http = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
        let (abort, _) = watch::channel(0u64);
        Ok(Self {
            inner: Arc::new(Inner { http, config, session, refresh: Mutex::new(RefreshState::default()), abort }),
        })
    }

    pub fn config(&self) -> &ClientConfig { &self.inner.config }

    pub fn session(&self) -> &Arc<SessionStore> { &self.inner.session }

    pub async fn get(&self, path: &str) -> ClientResult<Value> { self.request::<Value>(Method::GET, path, None).await }

    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ClientResult<Value> {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ClientResult<Value> {
        self.request(Method::PUT, path, Some(body)).await
    }

    pub async fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ClientResult<Value> {
        self.request(Method::PATCH, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> ClientResult<Value> { self.request::<Value>(Method::DELETE, path, None).await }

    /// Authenticated request. Retried at most once, after a token refresh.
    pub async fn request<B: Serialize + ?Sized>(&self, method: Method, path: &str, body: Option<&B>) -> ClientResult<Value> {
        let body = body.map(serde_json::to_value).transpose()?;
        let sent_with = self.inner.session.access_token();
        let first = self.send(&method, path, body.as_ref(), sent_with.as_deref()).await?;
        if first.status != 401 || self.inner.config.is_auth_endpoint(path) {
            return first.into_result();
        }
        if first.is_session_terminated() {
            warn!(target: "client", path, "session terminated by server");
            self.discard_session();
            return Err(ClientError::SessionTerminated);
        }

        let token = self.fresh_access_token(sent_with.as_deref()).await?;
        debug!(target: "client", path, "replaying after refresh");
        self.send(&method, path, body.as_ref(), Some(&token)).await?.into_result()
    }

    /// Cancel every in-flight HTTP call made through this client or its clones.
    pub fn abort_requests(&self) {
        self.inner.abort.send_modify(|gen| *gen = gen.wrapping_add(1));
    }

    /// Forget tokens and profile, then abort whatever is still in flight.
    pub fn clear_credentials(&self) -> ClientResult<()> {
        let reset = self.inner.session.reset();
        self.abort_requests();
        reset
    }

    pub async fn login(&self, email: &str, password: &str) -> ClientResult<UserProfile> {
        let path = self.inner.config.login_path.clone();
        let body = json!({ "email": email, "password": password });
        let resp = self.send(&Method::POST, &path, Some(&body), None).await?.into_result()?;
        let user = self.store_session(&resp)?;
        info!(target: "client", user = %user.id, "logged in");
        Ok(user)
    }

    pub async fn register(&self, input: &RegisterInput) -> ClientResult<UserProfile> {
        let body = serde_json::to_value(input)?;
        let resp = self.send(&Method::POST, "/auth/register", Some(&body), None).await?.into_result()?;
        let user = self.store_session(&resp)?;
        info!(target: "client", user = %user.id, "registered");
        Ok(user)
    }

    /// Revoke the current refresh token server-side, then clear local state.
    /// The local session is cleared even if the server call fails.
    pub async fn logout(&self) -> ClientResult<()> {
        if let Some(refresh) = self.inner.session.refresh_token() {
            let body = json!({ "authorization": format!("Bearer {}", refresh) });
            match self.send(&Method::POST, "/auth/logout", Some(&body), None).await.and_then(RawResponse::into_result) {
                Ok(_) => {}
                Err(e) => warn!(target: "client", "logout request failed: {}", e),
            }
        }
        self.clear_credentials()
    }

    /// Revoke every session of the logged-in user and clear local state.
    pub async fn logout_all_devices(&self) -> ClientResult<String> {
        let user = self.inner.session.user().ok_or(ClientError::NotLoggedIn)?;
        let path = format!("/auth/logout/all/devices/{}", user.id);
        let resp = self.send(&Method::DELETE, &path, None, None).await?;
        let message = resp.message();
        resp.into_result()?;
        self.clear_credentials()?;
        Ok(message)
    }

    fn store_session(&self, resp: &Value) -> ClientResult<UserProfile> {
        let (Some(access), Some(refresh)) = (
            resp.get("accessToken").and_then(Value::as_str),
            resp.get("refreshToken").and_then(Value::as_str),
        ) else {
            return Err(ClientError::InvalidResponse("missing token pair".into()));
        };
        let user: UserProfile = serde_json::from_value(resp.get("payload").cloned().unwrap_or(Value::Null))?;
        self.inner.session.set_session(access, refresh)?;
        self.inner.session.set_user(user.clone())?;
        Ok(user)
    }

    fn discard_session(&self) {
        if let Err(e) = self.clear_credentials() {
            warn!(target: "client", "failed to clear stored session: {}", e);
        }
    }

    /// Access token to replay with after a 401 on `failed_with`.
    ///
    /// If a refresh already finished since `failed_with` was read, the current token is
    /// returned directly. If one is running, wait for its outcome. Otherwise lead a new one.
    async fn fresh_access_token(&self, failed_with: Option<&str>) -> ClientResult<String> {
        let waiter = {
            let mut st = self.inner.refresh.lock();
            if st.refreshing {
                let (tx, rx) = oneshot::channel();
                st.queue.push_back(tx);
                Some(rx)
            } else {
                if let Some(current) = self.inner.session.access_token() {
                    if failed_with != Some(current.as_str()) {
                        return Ok(current);
                    }
                }
                st.refreshing = true;
                None
            }
        };
        if let Some(rx) = waiter {
            return rx.await.unwrap_or(Err(ClientError::Cancelled));
        }

        let leader = RefreshLeader { state: &self.inner.refresh, settled: false };
        let outcome = self.refresh_tokens().await;
        leader.settle(&outcome);
        outcome
    }

    async fn refresh_tokens(&self) -> ClientResult<String> {
        let Some(refresh) = self.inner.session.refresh_token() else {
            self.discard_session();
            return Err(ClientError::NoRefreshToken);
        };
        let body = json!({ "authorization": format!("Bearer {}", refresh) });
        let path = self.inner.config.refresh_path.clone();
        let resp = match self.send(&Method::POST, &path, Some(&body), None).await {
            Ok(r) => r,
            Err(ClientError::Cancelled) => return Err(ClientError::Cancelled),
            Err(e) => {
                warn!(target: "client", "token refresh failed: {}", e);
                self.discard_session();
                return Err(e);
            }
        };

        if !resp.is_success() {
            let terminated = resp.is_session_terminated();
            warn!(target: "client", status = resp.status, terminated, "token refresh rejected");
            self.discard_session();
            return Err(if terminated { ClientError::SessionTerminated } else { ClientError::SessionExpired });
        }

        match (
            resp.body.get("accessToken").and_then(Value::as_str),
            resp.body.get("refreshToken").and_then(Value::as_str),
        ) {
            (Some(access), Some(refresh)) => {
                self.inner.session.set_session(access, refresh)?;
                debug!(target: "client", "tokens refreshed");
                Ok(access.to_string())
            }
            _ => {
                self.discard_session();
                Err(ClientError::InvalidResponse("refresh response without token pair".into()))
            }
        }
    }

    async fn send(&self, method: &Method, path: &str, body: Option<&Value>, bearer: Option<&str>) -> ClientResult<RawResponse> {
        let mut abort = self.inner.abort.subscribe();
        let url = self.inner.config.endpoint_url(path);
        let mut builder = self.inner.http.request(method.clone(), &url).header(CONTENT_TYPE, "application/json");
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(b) = body {
            builder = builder.json(b);
        }

        let call = async {
            let response = builder.send().await?;
            let status = response.status().as_u16();
            let text = response.text().await?;
            let body = if text.trim().is_empty() {
                Value::Null
            } else {
                serde_json::from_str(&text).unwrap_or(Value::String(text))
            };
            Ok::<_, ClientError>(RawResponse { status, body })
        };

        tokio::select! {
            result = call => result,
            _ = abort.changed() => {
                debug!(target: "client", %url, "request aborted");
                Err(ClientError::Cancelled)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_url_joins_slashes() {
        let c = ClientConfig::new("http://localhost:8081/");
        assert_eq!(c.endpoint_url("/auth/refresh"), "http://localhost:8081/auth/refresh");
        assert_eq!(c.endpoint_url("users"), "http://localhost:8081/users");
        assert!(c.is_auth_endpoint("auth/refresh"));
        assert!(!c.is_auth_endpoint("/users"));
        assert!(ClientConfig::new("localhost").validate().is_err());
    }

    #[test]
    fn raw_response_mapping() {
        let terminated = RawResponse { status: 401, body: json!({"message": "Session terminated", "isSessionTerminated": true}) };
        assert!(terminated.is_session_terminated());
        assert_eq!(terminated.into_result(), Err(ClientError::Unauthorized("Session terminated".into())));

        let plain = RawResponse { status: 401, body: json!({"message": "nope"}) };
        assert!(!plain.is_session_terminated());

        let bad = RawResponse { status: 400, body: json!({"message": "Invalid Credential!"}) };
        assert_eq!(bad.into_result(), Err(ClientError::Api { status: 400, message: "Invalid Credential!".into() }));
    }

    #[tokio::test]
    async fn waiters_are_released_when_leader_is_dropped() {
        let state = Mutex::new(RefreshState { refreshing: true, queue: VecDeque::new() });
        let (tx, rx) = oneshot::channel();
        state.lock().queue.push_back(tx);
        drop(RefreshLeader { state: &state, settled: false });
        assert_eq!(rx.await.unwrap(), Err(ClientError::Cancelled));
        assert!(!state.lock().refreshing);
    }

    #[tokio::test]
    async fn abort_cancels_in_flight_calls() {
        // Accepts connections but never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((sock, _)) = listener.accept().await {
                held.push(sock);
            }
        });

        let client = ApiClient::new(ClientConfig::new(format!("http://{}", addr)), Arc::new(SessionStore::in_memory())).unwrap();
        let pending = {
            let c = client.clone();
            tokio::spawn(async move { c.get("/users").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        client.abort_requests();
        assert_eq!(pending.await.unwrap(), Err(ClientError::Cancelled));
    }
}
