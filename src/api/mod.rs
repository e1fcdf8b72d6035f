//! # API Module
//!
//! HTTP endpoints of the local harvestify web server.
//!
//! ## Endpoints
//!
//! - [`index`] - landing page, shows login errors
//! - [`login`] - starts the PKCE authorization code flow
//! - [`callback`] - completes it, sets the token cookies and registers the session
//! - [`authorized`] - landing page used by the CLI `auth` command
//! - [`dashboard`] - runs a harvest for the cookie session and writes a snapshot
//! - [`run_algorithm`] - runs the recommendation engine on a snapshot
//! - [`me`] - guarded profile passthrough
//! - [`health`] - status and version
//!
//! ## Sessions
//!
//! Token pairs live in http-only cookies. The [`SessionRegistry`] maps each
//! refresh token to one [`SharedSession`]; a handler holds that session's
//! lock for its whole guarded operation, so concurrent requests of one user
//! never race on a refresh. Whatever the operation did to the session
//! (refresh, rotation, clearing) is written back to the cookies by
//! [`sync_session`].
//!
//! ```rust,ignore
//! use harvestify::{api::AppState, config::Config, server};
//!
//! let state = AppState::new(Config::from_env()?)?;
//! let app = server::router(state);
//! ```

use std::sync::Arc;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use serde_json::json;
use tokio::sync::Mutex;

use crate::{
    config::Config,
    error::{ConfigError, FetchError, HarvestError, PersistenceError, UpstreamError},
    harvest::{Harvester, Session, SessionRegistry, SharedSession},
    management::SnapshotManager,
    recommend::Recommender,
    types::Snapshot,
};

mod callback;
mod cookies;
mod dashboard;
mod health;
mod recommend;

pub use callback::{authorized, callback, index, login};
pub use cookies::{ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};
pub use dashboard::{dashboard, me};
pub use health::health;
pub use recommend::run_algorithm;

/// Where the callback sends the browser after a successful login.
pub const DEFAULT_POST_LOGIN_PATH: &str = "/dashboard";

/// Shared state of the web server.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub harvester: Harvester,
    pub sessions: SessionRegistry,
    pub snapshots: SnapshotManager,
    pub recommender: Recommender,
    /// Most recent harvest result, kept even when writing it to disk failed.
    pub last_snapshot: Arc<Mutex<Option<Snapshot>>>,
    /// Session of the most recent successful login.
    pub last_login: Arc<Mutex<Option<Session>>>,
    pub post_login_path: String,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, UpstreamError> {
        let harvester = Harvester::new(&config)?;
        Ok(Self {
            harvester,
            sessions: SessionRegistry::new(),
            snapshots: SnapshotManager::new(config.snapshot_dir.clone()),
            recommender: Recommender::from_config(&config),
            last_snapshot: Arc::new(Mutex::new(None)),
            last_login: Arc::new(Mutex::new(None)),
            post_login_path: DEFAULT_POST_LOGIN_PATH.to_string(),
            config: Arc::new(config),
        })
    }

    pub fn with_post_login_path(mut self, path: impl Into<String>) -> Self {
        self.post_login_path = path.into();
        self
    }

    /// The shared session belonging to the request's token cookies.
    pub(crate) async fn session_for(&self, jar: &CookieJar) -> SharedSession {
        self.sessions
            .resolve(cookies::access_token(jar), cookies::refresh_token(jar))
            .await
    }
}

/// Writes session changes made during a guarded operation back to the
/// registry and the cookies.
///
/// `verified` means the provider accepted the session during the operation
/// (the guard's probe passed). Only verified or freshly issued sessions are
/// registered.
pub(crate) async fn sync_session(
    state: &AppState,
    jar: CookieJar,
    shared: &SharedSession,
    before: &Session,
    after: &Session,
    verified: bool,
) -> CookieJar {
    if !after.is_authenticated() {
        if let Some(old) = before.refresh_token.as_deref() {
            state.sessions.remove(old).await;
        }
        return if before == after {
            jar
        } else {
            cookies::clear_session(jar)
        };
    }

    if before == after {
        if verified {
            state.sessions.register(shared, after).await;
        }
        return jar;
    }

    if let Some(old) = before.refresh_token.as_deref() {
        if after.refresh_token.as_deref() != Some(old) {
            state.sessions.rekey(old, shared, after).await;
        }
    }
    state.sessions.register(shared, after).await;
    cookies::add_session(jar, after, state.config.secure_cookies)
}

/// Error type of the HTTP handlers.
#[derive(Debug)]
pub enum ApiError {
    Harvest(HarvestError),
    Config(ConfigError),
    NotFound(&'static str),
}

impl From<HarvestError> for ApiError {
    fn from(err: HarvestError) -> Self {
        ApiError::Harvest(err)
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::Config(err)
    }
}

impl From<PersistenceError> for ApiError {
    fn from(err: PersistenceError) -> Self {
        ApiError::Harvest(err.into())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Harvest(err) => match err {
                HarvestError::Auth(_) => StatusCode::UNAUTHORIZED,
                HarvestError::Upstream(UpstreamError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
                HarvestError::Upstream(_) => StatusCode::BAD_GATEWAY,
                HarvestError::Fetch(FetchError::NoDataAvailable) => StatusCode::NOT_FOUND,
                HarvestError::Fetch(FetchError::DeadlineExceeded(_)) => {
                    StatusCode::GATEWAY_TIMEOUT
                }
                HarvestError::Fetch(FetchError::Cancelled) => StatusCode::SERVICE_UNAVAILABLE,
                HarvestError::Downstream(_) => StatusCode::BAD_GATEWAY,
                HarvestError::Persistence(PersistenceError::NoSnapshot(_)) => {
                    StatusCode::NOT_FOUND
                }
                HarvestError::Persistence(PersistenceError::InvalidName(_)) => {
                    StatusCode::BAD_REQUEST
                }
                HarvestError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Harvest(err) => err.to_string(),
            ApiError::Config(err) => err.to_string(),
            ApiError::NotFound(msg) => msg.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self.message(), "request failed");
        } else {
            tracing::debug!(status = %status, error = %self.message(), "request rejected");
        }
        (status, Json(json!({ "error": self.message() }))).into_response()
    }
}
