use crate::api::{create_router, AppState, UserResponse};
use crate::config::Config;
use crate::store::DataStore;
use axum::http::{header, HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::{json, Value};
use tempfile::TempDir;

pub const ADMIN_PASSWORD: &str = "Adm1n!pass";

pub fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {token}")).unwrap()
}

pub async fn setup_test_state() -> (TempDir, AppState) {
    let dir = TempDir::new().unwrap();
    let store = DataStore::open(dir.path()).await.unwrap();
    let config = Config::for_data_dir(dir.path());
    (dir, AppState::new(store, config))
}

/// An initialized server and the admin's bearer token.
async fn admin_server() -> (TempDir, TestServer, String) {
    let (dir, state) = setup_test_state().await;
    let server = TestServer::new(create_router(state)).unwrap();

    server
        .post("/system/init")
        .json(&json!({ "name": "Root", "password": ADMIN_PASSWORD }))
        .await
        .assert_status(StatusCode::CREATED);
    let login: Value = server
        .post("/auth/login")
        .json(&json!({ "username": "admin", "password": ADMIN_PASSWORD }))
        .await
        .json();
    let token = login["token"].as_str().unwrap().to_string();
    (dir, server, token)
}

#[tokio::test]
async fn test_gate_rejects_missing_and_malformed_tokens() {
    let (_dir, server, token) = admin_server().await;

    let missing = server.get("/auth/me").await;
    missing.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(
        missing.headers().get(header::WWW_AUTHENTICATE).unwrap(),
        "Bearer"
    );

    server
        .get("/auth/me")
        .add_header(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Token {token}")).unwrap(),
        )
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    server
        .get("/auth/me")
        .add_header(header::AUTHORIZATION, bearer("not-a-session"))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    let me: UserResponse = server
        .get("/auth/me")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .await
        .json();
    assert_eq!(me.username, "admin");
}

#[tokio::test]
async fn test_password_hash_is_never_serialized() {
    let (_dir, server, token) = admin_server().await;
    let body = server
        .get("/users")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .await
        .text();
    assert!(!body.contains("password_hash"));
    assert!(!body.contains("$2"));
}

#[tokio::test]
async fn test_system_can_only_be_initialized_once() {
    let (_dir, server, _token) = admin_server().await;
    let status: Value = server.get("/system/status").await.json();
    assert_eq!(status["initialized"], true);

    server
        .post("/system/init")
        .json(&json!({ "name": "Again", "password": ADMIN_PASSWORD }))
        .await
        .assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_login_before_init_is_unavailable() {
    let (_dir, state) = setup_test_state().await;
    let server = TestServer::new(create_router(state)).unwrap();
    server
        .post("/auth/login")
        .json(&json!({ "username": "admin", "password": ADMIN_PASSWORD }))
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_logout_ends_the_session() {
    let (_dir, server, token) = admin_server().await;
    server
        .post("/auth/logout")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    server
        .get("/dashboard")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}
