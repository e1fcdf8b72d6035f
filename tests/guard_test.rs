mod common;

use common::*;
use harvestify::{
    error::{AuthError, HarvestError, UpstreamError},
    harvest::{AuthState, Harvester, Session, SharedSession},
};
use tokio_util::sync::CancellationToken;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path},
};

#[tokio::test]
async fn valid_token_passes_probe_without_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("authorization", bearer("a1").as_str()))
        .respond_with(json_response(profile_json("user-1")))
        .expect(1)
        .mount(&server)
        .await;
    mount_grant(&server, "refresh_token", ResponseTemplate::new(500), 0).await;

    let harvester = Harvester::new(&test_config(&server)).unwrap();
    let mut session = user_session("a1", "r1");
    let before = session.clone();

    let profile = harvester.guard().ensure(&mut session).await.unwrap();
    assert_eq!(profile.id, "user-1");
    assert_eq!(session, before);
    assert_eq!(AuthState::of(&session), AuthState::Authenticated);
}

#[tokio::test]
async fn rejected_probe_refreshes_once_and_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("authorization", bearer("stale").as_str()))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("authorization", bearer("fresh").as_str()))
        .respond_with(json_response(profile_json("user-1")))
        .expect(1)
        .mount(&server)
        .await;
    mount_grant(
        &server,
        "refresh_token",
        json_response(token_json("fresh", None)),
        1,
    )
    .await;

    let harvester = Harvester::new(&test_config(&server)).unwrap();
    let mut session = user_session("stale", "r1");
    let old_expiry = session.expires_at;

    harvester.guard().ensure(&mut session).await.unwrap();

    assert_eq!(session.access_token, "fresh");
    assert_eq!(session.refresh_token.as_deref(), Some("r1"));
    assert!(session.expires_at >= old_expiry);
}

#[tokio::test]
async fn invalid_refresh_token_expires_session_before_any_resource_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/me/top/tracks"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    mount_grant(
        &server,
        "refresh_token",
        ResponseTemplate::new(400).set_body_json(serde_json::json!({ "error": "invalid_grant" })),
        1,
    )
    .await;

    let harvester = Harvester::new(&test_config(&server)).unwrap();
    let mut session = user_session("stale", "revoked");

    let err = harvester
        .harvest(&mut session, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, HarvestError::Auth(AuthError::SessionExpired)));
    assert!(err.requires_reauth());
    assert!(!session.is_authenticated());
    assert!(!session.has_refresh_token());
}

#[tokio::test]
async fn unauthenticated_session_makes_no_requests() {
    let server = MockServer::start().await;
    let harvester = Harvester::new(&test_config(&server)).unwrap();
    let mut session = Session::default();

    let err = harvester.guard().ensure(&mut session).await.unwrap_err();

    assert!(matches!(err, HarvestError::Auth(AuthError::NotAuthenticated)));
    let requests = server.received_requests().await.unwrap_or_default();
    assert!(requests.is_empty());
}

#[tokio::test]
async fn server_errors_on_probe_keep_the_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    mount_grant(&server, "refresh_token", ResponseTemplate::new(500), 0).await;

    let harvester = Harvester::new(&test_config(&server)).unwrap();
    let mut session = user_session("a1", "r1");
    let before = session.clone();

    let err = harvester.guard().ensure(&mut session).await.unwrap_err();

    assert!(matches!(err, HarvestError::Upstream(UpstreamError::ServerError(_))));
    assert_eq!(session, before);
}

#[tokio::test]
async fn refresh_without_refresh_token_expires_session() {
    let server = MockServer::start().await;
    let harvester = Harvester::new(&test_config(&server)).unwrap();
    let mut session = user_session("a1", "r1");
    session.refresh_token = None;

    let err = harvester.guard().refresh(&mut session).await.unwrap_err();

    assert_eq!(err, AuthError::SessionExpired);
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn concurrent_operations_on_one_session_refresh_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("authorization", bearer("stale").as_str()))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("authorization", bearer("fresh").as_str()))
        .respond_with(json_response(profile_json("user-1")))
        .expect(2)
        .mount(&server)
        .await;
    mount_grant(
        &server,
        "refresh_token",
        json_response(token_json("fresh", None)),
        1,
    )
    .await;

    let harvester = Harvester::new(&test_config(&server)).unwrap();
    let shared = SharedSession::new(user_session("stale", "r1"));

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let harvester = harvester.clone();
            let shared = shared.clone();
            tokio::spawn(async move {
                let mut session = shared.lock().await;
                harvester.guard().ensure(&mut session).await.map(|p| p.id)
            })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), "user-1");
    }

    assert_eq!(shared.snapshot().await.access_token, "fresh");
}
