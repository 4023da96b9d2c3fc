//! REST integration tests: the real router on an ephemeral port, driven over HTTP.

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tempfile::tempdir;

use fieldtrack::config::ServerConfig;
use fieldtrack::server::{self, AppState};
use fieldtrack::storage::SharedStore;

const PASSWORD: &str = "pump-station-7";

async fn spawn_app(store: SharedStore) -> Result<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = AppState::new(&ServerConfig::default(), store);
    tokio::spawn(server::serve(listener, state));
    Ok(format!("http://{}", addr))
}

async fn post(base: &str, path: &str, body: Value) -> Result<(StatusCode, Value)> {
    let resp = reqwest::Client::new().post(format!("{base}{path}")).json(&body).send().await?;
    Ok((resp.status(), resp.json().await?))
}

async fn register(base: &str, email: &str, phone: &str) -> Result<Value> {
    let (status, body) = post(
        base,
        "/auth/register",
        json!({"role": "user", "name": "Ravi Kumar", "email": email, "phoneNumber": phone, "password": PASSWORD}),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    Ok(body)
}

async fn refresh(base: &str, token: &str) -> Result<(StatusCode, Value)> {
    post(base, "/auth/refresh", json!({"authorization": format!("Bearer {token}")})).await
}

fn token(body: &Value, key: &str) -> String {
    body[key].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn register_and_login() -> Result<()> {
    let base = spawn_app(SharedStore::in_memory()).await?;

    let body = register(&base, "Ravi@Depot.in", "9876543210").await?;
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], 201);
    assert_eq!(body["payload"]["email"], "ravi@depot.in");
    assert!(body["payload"].get("passwordHash").is_none());
    assert!(!token(&body, "accessToken").is_empty());

    let (status, dup) = post(
        &base,
        "/auth/register",
        json!({"role": "user", "name": "Other", "email": "other@depot.in", "phoneNumber": "9876543210", "password": PASSWORD}),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(dup["message"], "Email or phone number already available.");

    let (status, missing) = post(&base, "/auth/register", json!({"role": "user", "email": "x@depot.in"})).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(missing["message"], "Name is required.");
    assert_eq!(missing["success"], false);

    let (status, bad_role) = post(
        &base,
        "/auth/register",
        json!({"role": "root", "name": "R", "email": "r@depot.in", "phoneNumber": "9876500000", "password": PASSWORD}),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(bad_role["message"], "Invalid Role!");

    let (status, wrong) = post(&base, "/auth/login", json!({"email": "ravi@depot.in", "password": "not-it-at-all"})).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(wrong["message"], "Invalid Credential!");

    let (status, ok) = post(&base, "/auth/login", json!({"email": "ravi@depot.in", "password": PASSWORD})).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ok["message"], "Logged In");
    assert_eq!(ok["payload"]["id"], body["payload"]["id"]);
    Ok(())
}

#[tokio::test]
async fn refresh_token_rotates_exactly_once() -> Result<()> {
    let base = spawn_app(SharedStore::in_memory()).await?;
    let body = register(&base, "a@depot.in", "9876543210").await?;
    let first = token(&body, "refreshToken");

    let (status, rotated) = refresh(&base, &first).await?;
    assert_eq!(status, StatusCode::OK);
    let second = token(&rotated, "refreshToken");
    assert_ne!(first, second);
    assert!(!token(&rotated, "accessToken").is_empty());

    let (status, replay) = refresh(&base, &first).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(replay["isSessionTerminated"], true);

    let (status, _) = refresh(&base, &second).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn refresh_rejects_bad_input() -> Result<()> {
    let base = spawn_app(SharedStore::in_memory()).await?;

    let (status, body) = post(&base, "/auth/refresh", json!({})).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Refresh token is required.");

    let (status, _) = post(&base, "/auth/refresh", json!({"authorization": "no-scheme"})).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = refresh(&base, "garbage.token.value").await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.get("isSessionTerminated").is_none());

    // An access token is signed with the other secret.
    let reg = register(&base, "a@depot.in", "9876543210").await?;
    let (status, _) = refresh(&base, &token(&reg, "accessToken")).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn logout_is_a_noop_when_already_revoked() -> Result<()> {
    let base = spawn_app(SharedStore::in_memory()).await?;
    let body = register(&base, "a@depot.in", "9876543210").await?;
    let rt = token(&body, "refreshToken");
    let logout = json!({"authorization": format!("Bearer {rt}")});

    let (status, out) = post(&base, "/auth/logout", logout.clone()).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(out["message"], "Logged Out");

    let (status, _) = post(&base, "/auth/logout", logout).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = refresh(&base, &rt).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["isSessionTerminated"], true);
    Ok(())
}

#[tokio::test]
async fn logout_all_devices_revokes_every_session() -> Result<()> {
    let base = spawn_app(SharedStore::in_memory()).await?;
    let reg = register(&base, "a@depot.in", "9876543210").await?;
    let (_, login) = post(&base, "/auth/login", json!({"email": "a@depot.in", "password": PASSWORD})).await?;
    let user_id = reg["payload"]["id"].as_str().unwrap_or_default().to_string();
    let http = reqwest::Client::new();

    let resp = http.delete(format!("{base}/auth/logout/all/devices/{user_id}")).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.json::<Value>().await?["message"], "Logged out from all devices");

    for rt in [token(&reg, "refreshToken"), token(&login, "refreshToken")] {
        let (status, _) = refresh(&base, &rt).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let again = http.delete(format!("{base}/auth/logout/all/devices/{user_id}")).send().await?;
    assert_eq!(again.status(), StatusCode::OK);
    assert_eq!(again.json::<Value>().await?["message"], "You have already logged out from all devices");

    let unknown = http.delete(format!("{base}/auth/logout/all/devices/nobody")).send().await?;
    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);
    assert_eq!(unknown.json::<Value>().await?["message"], "Invalid Credential!");
    Ok(())
}

#[tokio::test]
async fn change_password_then_login() -> Result<()> {
    let base = spawn_app(SharedStore::in_memory()).await?;
    let reg = register(&base, "a@depot.in", "9876543210").await?;
    let other = register(&base, "b@depot.in", "9876543211").await?;
    let user_id = reg["payload"]["id"].as_str().unwrap_or_default().to_string();
    let url = format!("{base}/auth/change-password/{user_id}");
    let http = reqwest::Client::new();
    let change = |bearer: String, body: Value| {
        let req = http.post(&url).bearer_auth(bearer).json(&body);
        async move {
            let resp = req.send().await?;
            Ok::<_, anyhow::Error>((resp.status(), resp.json::<Value>().await?))
        }
    };

    let (status, _) = post(&base, &format!("/auth/change-password/{user_id}"), json!({"currentPassword": PASSWORD, "password": "new-password-1"})).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = change(token(&other, "accessToken"), json!({"currentPassword": PASSWORD, "password": "new-password-1"})).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let access = token(&reg, "accessToken");
    let (status, same) = change(access.clone(), json!({"currentPassword": PASSWORD, "password": PASSWORD})).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(same["message"], "Current password and password are same.");

    let (status, _) = change(access.clone(), json!({"password": "new-password-1"})).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = change(access, json!({"currentPassword": PASSWORD, "password": "new-password-1"})).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = post(&base, "/auth/login", json!({"email": "a@depot.in", "password": "new-password-1"})).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn users_routes_require_bearer_and_hide_hashes() -> Result<()> {
    let base = spawn_app(SharedStore::in_memory()).await?;
    let reg = register(&base, "asha@depot.in", "9876543210").await?;
    register(&base, "ravi@depot.in", "9876543211").await?;
    register(&base, "meera@depot.in", "9876543212").await?;
    let access = token(&reg, "accessToken");
    let http = reqwest::Client::new();

    let anon = http.get(format!("{base}/users")).send().await?;
    assert_eq!(anon.status(), StatusCode::UNAUTHORIZED);

    let listed: Value = http
        .get(format!("{base}/users?limit=2&orderBy=asc"))
        .bearer_auth(&access)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(listed["status"], 200);
    assert_eq!(listed["pagination"]["counts"], 3);
    assert_eq!(listed["pagination"]["pages"], 2);
    assert_eq!(listed["pagination"]["hasNextPage"], true);
    let data = listed["data"].as_array().cloned().unwrap_or_default();
    assert_eq!(data.len(), 2);
    assert!(data.iter().all(|u| u.get("passwordHash").is_none()));

    let searched: Value = http
        .get(format!("{base}/users?search=MEERA"))
        .bearer_auth(&access)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(searched["pagination"]["counts"], 1);
    assert_eq!(searched["data"][0]["email"], "meera@depot.in");

    let user_id = reg["payload"]["id"].as_str().unwrap_or_default();
    let one: Value = http.get(format!("{base}/users/{user_id}")).bearer_auth(&access).send().await?.json().await?;
    assert_eq!(one["payload"]["email"], "asha@depot.in");

    let missing = http.get(format!("{base}/users/nobody")).bearer_auth(&access).send().await?;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    assert_eq!(missing.json::<Value>().await?["message"], "Invalid Credential!");

    let far: Value = http
        .get(format!("{base}/users?page={}", u64::MAX))
        .bearer_auth(&access)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(far["status"], 200);
    assert_eq!(far["pagination"]["counts"], 3);
    assert_eq!(far["data"].as_array().map(Vec::len), Some(0));
    Ok(())
}

#[tokio::test]
async fn health_and_unknown_routes() -> Result<()> {
    let base = spawn_app(SharedStore::in_memory()).await?;
    let health: Value = reqwest::get(format!("{base}/health")).await?.json().await?;
    assert_eq!(health["success"], true);
    assert_eq!(health["status"], 200);
    assert_eq!(health["health"], "healthy");
    assert_eq!(health["message"], "Api's are Healthy, Server is running!");
    assert_eq!(health["service"], "fieldtrack-auth");

    let resp = reqwest::get(format!("{base}/nowhere")).await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(resp.json::<Value>().await?["message"], "Route Not Found!");
    Ok(())
}

#[tokio::test]
async fn sessions_survive_restart_with_data_folder() -> Result<()> {
    let tmp = tempdir()?;
    let base = spawn_app(SharedStore::open(tmp.path())?).await?;
    let reg = register(&base, "a@depot.in", "9876543210").await?;

    let restarted = spawn_app(SharedStore::open(tmp.path())?).await?;
    let (status, _) = refresh(&restarted, &token(&reg, "refreshToken")).await?;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = post(&restarted, "/auth/login", json!({"email": "a@depot.in", "password": PASSWORD})).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}
