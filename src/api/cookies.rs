use axum_extra::extract::{
    CookieJar,
    cookie::{Cookie, SameSite},
};
use time::Duration;

use crate::harvest::Session;

pub const ACCESS_TOKEN_COOKIE: &str = "spotify_access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "spotify_refresh_token";
const PKCE_COOKIE_NAME: &str = "harvestify_pkce";
const STATE_COOKIE_NAME: &str = "harvestify_state";

/// Lifetime of the access token cookie; matches the provider's token lifetime.
const ACCESS_TOKEN_MAX_AGE: Duration = Duration::hours(1);

/// PKCE verifier + state cookies for the authorization request.
pub(super) fn add_pkce(jar: CookieJar, code_verifier: &str, state: &str, secure: bool) -> CookieJar {
    let verifier = Cookie::build((PKCE_COOKIE_NAME, code_verifier.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(Duration::minutes(5))
        .build();

    let state = Cookie::build((STATE_COOKIE_NAME, state.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(Duration::minutes(5))
        .build();

    jar.add(verifier).add(state)
}

pub(super) fn clear_pkce(jar: CookieJar) -> CookieJar {
    jar.add(removal(PKCE_COOKIE_NAME)).add(removal(STATE_COOKIE_NAME))
}

pub(super) fn pkce_verifier(jar: &CookieJar) -> Option<String> {
    value(jar, PKCE_COOKIE_NAME)
}

pub(super) fn pkce_state(jar: &CookieJar) -> Option<String> {
    value(jar, STATE_COOKIE_NAME)
}

/// Writes both token cookies for an authenticated session.
pub(super) fn add_session(jar: CookieJar, session: &Session, secure: bool) -> CookieJar {
    let access = Cookie::build((ACCESS_TOKEN_COOKIE, session.access_token.clone()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(ACCESS_TOKEN_MAX_AGE)
        .build();
    let jar = jar.add(access);

    match session.refresh_token.as_deref() {
        Some(refresh) if !refresh.is_empty() => jar.add(
            Cookie::build((REFRESH_TOKEN_COOKIE, refresh.to_string()))
                .http_only(true)
                .secure(secure)
                .same_site(SameSite::Lax)
                .path("/")
                .build(),
        ),
        _ => jar,
    }
}

pub(super) fn clear_session(jar: CookieJar) -> CookieJar {
    jar.add(removal(ACCESS_TOKEN_COOKIE))
        .add(removal(REFRESH_TOKEN_COOKIE))
}

pub(super) fn access_token(jar: &CookieJar) -> Option<String> {
    value(jar, ACCESS_TOKEN_COOKIE)
}

pub(super) fn refresh_token(jar: &CookieJar) -> Option<String> {
    value(jar, REFRESH_TOKEN_COOKIE)
}

fn value(jar: &CookieJar, name: &str) -> Option<String> {
    jar.get(name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

fn removal(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, ""))
        .path("/")
        .max_age(Duration::ZERO)
        .build()
}
