#![allow(dead_code)]

use std::{collections::BTreeSet, time::Duration};

use chrono::{Duration as ChronoDuration, Utc};
use harvestify::{config::Config, harvest::Session};
use serde_json::{Value, json};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string_contains, method, path},
};

pub const CLIENT_ID: &str = "client-id";
pub const CLIENT_SECRET: &str = "client-secret";

/// Configuration pointing every endpoint at the mock server, without pacing.
pub fn test_config(server: &MockServer) -> Config {
    let mut config = Config::new(CLIENT_ID, CLIENT_SECRET);
    config.token_url = format!("{}/api/token", server.uri());
    config.auth_url = format!("{}/authorize", server.uri());
    config.api_url = server.uri();
    config.pacer_interval = Duration::ZERO;
    config.request_timeout = Duration::from_secs(5);
    config
}

pub fn user_session(access: &str, refresh: &str) -> Session {
    Session::new(
        access,
        Some(refresh.to_string()),
        Utc::now() + ChronoDuration::hours(1),
        BTreeSet::from(["user-top-read".to_string()]),
    )
}

pub fn ids(range: std::ops::RangeInclusive<usize>) -> Vec<String> {
    range.map(|i| i.to_string()).collect()
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

pub fn token_json(access: &str, refresh: Option<&str>) -> Value {
    let mut body = json!({
        "access_token": access,
        "token_type": "Bearer",
        "scope": "user-top-read user-library-read",
        "expires_in": 3600
    });
    if let Some(refresh) = refresh {
        body["refresh_token"] = json!(refresh);
    }
    body
}

pub fn profile_json(id: &str) -> Value {
    json!({ "id": id, "display_name": "Test User", "email": null, "country": "DE", "product": "premium" })
}

pub fn artist_json(id: &str) -> Value {
    json!({ "id": id, "name": format!("Artist {id}"), "genres": [format!("genre-{id}")] })
}

pub fn track_json(id: &str, artist_ids: &[&str]) -> Value {
    let artists: Vec<Value> = artist_ids
        .iter()
        .map(|a| json!({ "id": a, "name": format!("Artist {a}") }))
        .collect();
    json!({
        "id": id,
        "name": format!("Track {id}"),
        "artists": artists,
        "album": { "id": format!("album-{id}"), "name": format!("Album {id}"), "images": [{ "url": format!("https://img/{id}.jpg") }] },
        "duration_ms": 180000,
        "popularity": 50
    })
}

pub fn features_json(id: &str) -> Value {
    json!({
        "id": id,
        "danceability": 0.5,
        "energy": 0.7,
        "valence": 0.3,
        "tempo": 120.0,
        "acousticness": 0.1,
        "instrumentalness": 0.0
    })
}

pub fn artists_body(ids: &[String]) -> Value {
    json!({ "artists": ids.iter().map(|id| artist_json(id)).collect::<Vec<_>>() })
}

/// Token endpoint answering one grant type.
pub async fn mount_grant(server: &MockServer, grant: &str, response: ResponseTemplate, times: u64) {
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .and(body_string_contains(format!("grant_type={grant}")))
        .respond_with(response)
        .expect(times)
        .mount(server)
        .await;
}

pub fn json_response(body: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(body)
}
