mod common;

use std::collections::BTreeSet;

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{Duration, Utc};
use common::*;
use harvestify::{
    error::AuthError,
    harvest::Session,
    management::TokenManager,
    spotify::auth::TokenRefresher,
};
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string_contains, header, method, path},
};

fn refresher(server: &MockServer) -> TokenRefresher {
    TokenRefresher::new(reqwest::Client::new(), &test_config(server))
}

#[tokio::test]
async fn refresh_extends_expiry_and_replaces_access_token() {
    let server = MockServer::start().await;
    let basic = format!("Basic {}", STANDARD.encode(format!("{CLIENT_ID}:{CLIENT_SECRET}")));
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .and(header("authorization", basic.as_str()))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=r1"))
        .respond_with(json_response(token_json("a2", None)))
        .expect(1)
        .mount(&server)
        .await;

    let before = Session::new("a1", Some("r1".into()), Utc::now() + Duration::seconds(30), BTreeSet::new());
    let after = refresher(&server).refresh("r1").await.unwrap();

    assert!(after.expires_at > before.expires_at);
    assert_ne!(after.access_token, before.access_token);
    assert_eq!(after.refresh_token.as_deref(), Some("r1"));
    assert!(after.scopes.contains("user-top-read"));
}

#[tokio::test]
async fn rotated_refresh_token_is_adopted() {
    let server = MockServer::start().await;
    mount_grant(&server, "refresh_token", json_response(token_json("a2", Some("r2"))), 1).await;

    let session = refresher(&server).refresh("r1").await.unwrap();
    assert_eq!(session.refresh_token.as_deref(), Some("r2"));
}

#[tokio::test]
async fn rejected_refresh_is_denied() {
    let server = MockServer::start().await;
    mount_grant(
        &server,
        "refresh_token",
        ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_grant" })),
        1,
    )
    .await;

    let err = refresher(&server).refresh("revoked").await.unwrap_err();
    assert!(matches!(err, AuthError::RefreshDenied(msg) if msg.contains("invalid_grant")));
}

#[tokio::test]
async fn empty_access_token_is_a_denial() {
    let server = MockServer::start().await;
    mount_grant(&server, "refresh_token", json_response(token_json("", None)), 1).await;

    let err = refresher(&server).refresh("r1").await.unwrap_err();
    assert!(matches!(err, AuthError::RefreshDenied(_)));
}

#[tokio::test]
async fn client_credentials_carry_no_user_scope() {
    let server = MockServer::start().await;
    mount_grant(&server, "client_credentials", json_response(token_json("app", Some("ignored"))), 1).await;

    let app = refresher(&server).client_credentials().await.unwrap();
    assert_eq!(app.access_token, "app");
    assert!(app.scopes.is_empty());
    assert!(!app.has_refresh_token());
}

#[tokio::test]
async fn code_exchange_sends_verifier() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=the-code"))
        .and(body_string_contains("code_verifier=the-verifier"))
        .respond_with(json_response(token_json("a1", Some("r1"))))
        .expect(1)
        .mount(&server)
        .await;

    let session = refresher(&server)
        .exchange_code("the-code", "the-verifier")
        .await
        .unwrap();
    assert_eq!(session.access_token, "a1");
    assert_eq!(session.refresh_token.as_deref(), Some("r1"));
}

#[tokio::test]
async fn token_manager_round_trips_session() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("cache").join("session.json");
    let session = user_session("a1", "r1");

    TokenManager::at(&file, session.clone()).persist().await.unwrap();
    let loaded = TokenManager::load_from(&file).await.unwrap();

    assert_eq!(loaded.session(), &session);
}

#[tokio::test]
async fn token_manager_refreshes_expiring_session_and_persists_it() {
    let server = MockServer::start().await;
    mount_grant(&server, "refresh_token", json_response(token_json("a2", None)), 1).await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("session.json");
    let expiring = Session::new("a1", Some("r1".into()), Utc::now() + Duration::seconds(60), BTreeSet::new());

    let mut manager = TokenManager::at(&file, expiring);
    manager.ensure_fresh(&refresher(&server)).await.unwrap();
    assert_eq!(manager.session().access_token, "a2");

    let stored = TokenManager::load_from(&file).await.unwrap();
    assert_eq!(stored.session().access_token, "a2");
    assert_eq!(stored.session().refresh_token.as_deref(), Some("r1"));
}

#[tokio::test]
async fn token_manager_leaves_fresh_session_alone() {
    let server = MockServer::start().await;
    mount_grant(&server, "refresh_token", json_response(token_json("a2", None)), 0).await;

    let dir = tempfile::tempdir().unwrap();
    let mut manager = TokenManager::at(dir.path().join("session.json"), user_session("a1", "r1"));
    manager.ensure_fresh(&refresher(&server)).await.unwrap();

    assert_eq!(manager.session().access_token, "a1");
}

#[tokio::test]
async fn cleared_token_manager_removes_the_session_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("session.json");
    let mut manager = TokenManager::at(&file, user_session("a1", "r1"));
    manager.persist().await.unwrap();

    manager.clear().await.unwrap();

    assert!(!manager.session().is_authenticated());
    assert!(!file.exists());
    assert!(TokenManager::load_from(&file).await.is_err());
    // clearing twice is harmless
    manager.clear().await.unwrap();
}

#[tokio::test]
async fn rejected_refresh_of_stored_session_can_be_cleared() {
    let server = MockServer::start().await;
    mount_grant(&server, "refresh_token", ResponseTemplate::new(400), 1).await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("session.json");
    let expiring = Session::new("a1", Some("r1".into()), Utc::now(), BTreeSet::new());
    let mut manager = TokenManager::at(&file, expiring);
    manager.persist().await.unwrap();

    let err = manager.ensure_fresh(&refresher(&server)).await.unwrap_err();
    assert!(matches!(err, AuthError::RefreshDenied(_)));

    manager.clear().await.unwrap();
    assert!(!file.exists());
}
