use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};

use crate::types::TokenResponse;

/// Lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Tokens are treated as expiring this long before their real expiry.
pub const EXPIRY_SKEW_SECS: i64 = 240;

/// Access/refresh token pair of one user.
///
/// An empty `access_token` means the session is unauthenticated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub scopes: BTreeSet<String>,
}

impl Session {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: DateTime<Utc>,
        scopes: BTreeSet<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at,
            scopes,
        }
    }

    /// Builds a session from a token endpoint response received at `now`.
    ///
    /// Providers don't always rotate the refresh token; when the response
    /// carries none, `previous_refresh` is kept.
    pub fn from_token_response(
        response: TokenResponse,
        previous_refresh: Option<&str>,
        now: DateTime<Utc>,
    ) -> Self {
        let lifetime = response
            .expires_in
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        let refresh_token = response
            .refresh_token
            .filter(|t| !t.is_empty())
            .or_else(|| previous_refresh.map(str::to_string));
        let scopes = response
            .scope
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect();

        Self {
            access_token: response.access_token,
            refresh_token,
            expires_at: now + Duration::seconds(lifetime),
            scopes,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        !self.access_token.is_empty()
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn is_expiring(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at - Duration::seconds(EXPIRY_SKEW_SECS)
    }

    /// Seconds until expiry, never negative.
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }

    /// Drops all credentials, returning to the unauthenticated state.
    pub fn clear(&mut self) {
        *self = Session::default();
    }
}

/// A session shared between concurrent requests of one user.
///
/// Holding the lock for a whole guarded operation gives every user a
/// single writer, so two harvests can't both refresh and overwrite each
/// other's newer token.
#[derive(Debug, Clone, Default)]
pub struct SharedSession(Arc<Mutex<Session>>);

impl SharedSession {
    pub fn new(session: Session) -> Self {
        Self(Arc::new(Mutex::new(session)))
    }

    pub async fn lock(&self) -> MutexGuard<'_, Session> {
        self.0.lock().await
    }

    pub async fn snapshot(&self) -> Session {
        self.0.lock().await.clone()
    }
}

/// Live sessions of the web server, keyed by refresh token.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<String, SharedSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: Session) -> SharedSession {
        let shared = SharedSession::new(session.clone());
        if let Some(key) = session.refresh_token.filter(|t| !t.is_empty()) {
            self.sessions.lock().await.insert(key, shared.clone());
        }
        shared
    }

    /// Finds the shared session for the given cookie values.
    ///
    /// Unknown refresh tokens (e.g. after a restart) get a transient session
    /// with an already expired access token, which the guard probes before
    /// use. It only enters the registry through [`SessionRegistry::register`]
    /// once the provider has vouched for it, so arbitrary cookie values can't
    /// grow the map.
    pub async fn resolve(
        &self,
        access_token: Option<String>,
        refresh_token: Option<String>,
    ) -> SharedSession {
        let access_token = access_token.unwrap_or_default();
        let refresh = refresh_token.filter(|t| !t.is_empty());
        if let Some(key) = &refresh {
            if let Some(shared) = self.sessions.lock().await.get(key) {
                return shared.clone();
            }
        }

        SharedSession::new(Session::new(
            access_token,
            refresh,
            DateTime::<Utc>::default(),
            BTreeSet::new(),
        ))
    }

    /// Registers a verified session under its refresh token. An existing
    /// entry for the same token wins.
    pub async fn register(&self, shared: &SharedSession, session: &Session) {
        let Some(key) = session.refresh_token.as_ref().filter(|t| !t.is_empty()) else {
            return;
        };
        self.sessions
            .lock()
            .await
            .entry(key.clone())
            .or_insert_with(|| shared.clone());
    }

    /// Re-registers a session whose refresh token was rotated.
    pub async fn rekey(&self, old_refresh: &str, shared: &SharedSession, session: &Session) {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(old_refresh);
        if let Some(key) = session.refresh_token.as_ref().filter(|t| !t.is_empty()) {
            sessions.insert(key.clone(), shared.clone());
        }
    }

    pub async fn remove(&self, refresh_token: &str) {
        self.sessions.lock().await.remove(refresh_token);
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}
