use axum::{
    extract::{Query, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;

use crate::{spotify::auth::authorize_url, utils};

use super::{ApiError, AppState, cookies};

/// Redirects to the provider's consent page with a fresh PKCE pair.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), ApiError> {
    let verifier = utils::generate_code_verifier();
    let challenge = utils::generate_code_challenge(&verifier);
    let csrf = utils::generate_state();

    let url = authorize_url(&state.config, &challenge, &csrf)?;
    let jar = cookies::add_pkce(jar, &verifier, &csrf, state.config.secure_cookies);

    Ok((jar, Redirect::to(url.as_str())))
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

pub async fn callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Response {
    if let Some(error) = params.error {
        tracing::warn!(%error, "provider denied authorization");
        return failure(jar, &error);
    }

    let expected = cookies::pkce_state(&jar);
    if expected.is_none() || expected != params.state {
        tracing::warn!("authorization state mismatch");
        return failure(jar, "state_mismatch");
    }

    let (Some(code), Some(verifier)) = (params.code, cookies::pkce_verifier(&jar)) else {
        return failure(jar, "missing_code");
    };

    let session = match state
        .harvester
        .guard()
        .refresher()
        .exchange_code(&code, &verifier)
        .await
    {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(error = %e, "token exchange failed");
            return failure(jar, "auth_failed");
        }
    };

    state.sessions.insert(session.clone()).await;
    *state.last_login.lock().await = Some(session.clone());
    tracing::info!(expires_at = %session.expires_at, "user logged in");

    let jar = cookies::clear_pkce(jar);
    let jar = cookies::add_session(jar, &session, state.config.secure_cookies);
    (jar, Redirect::to(&state.post_login_path)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct IndexParams {
    error: Option<String>,
}

/// Landing page; shows the reason of a failed login, if any.
pub async fn index(Query(params): Query<IndexParams>) -> Html<String> {
    let notice = match params.error {
        Some(error) => format!("<p>Login failed: {}</p>", error_code(&error)),
        None => String::new(),
    };
    Html(format!(
        "<h2>harvestify</h2>{notice}<p><a href=\"/login\">Log in with Spotify</a></p>"
    ))
}

pub async fn authorized() -> Html<&'static str> {
    Html("<h2>Authentication successful.</h2><p>Close this browser window.</p>")
}

fn failure(jar: CookieJar, reason: &str) -> Response {
    (
        cookies::clear_pkce(jar),
        Redirect::to(&format!("/?error={}", error_code(reason))),
    )
        .into_response()
}

/// Provider error codes are `snake_case` words; anything else is dropped.
fn error_code(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}
