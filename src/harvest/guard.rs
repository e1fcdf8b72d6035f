use std::future::Future;

use crate::{
    error::{AuthError, HarvestError, UpstreamError},
    spotify::{SpotifyClient, auth::TokenRefresher},
    types::UserProfile,
};

use super::session::Session;

/// Authentication state of a session as seen by the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticated,
    Refreshing,
}

impl AuthState {
    pub fn of(session: &Session) -> Self {
        if session.is_authenticated() {
            AuthState::Authenticated
        } else {
            AuthState::Unauthenticated
        }
    }
}

/// Gate in front of every operation that needs a valid user token.
///
/// Protocol: reject unauthenticated sessions, probe `/me`, and on a 401
/// refresh exactly once and probe again. A failed refresh clears the
/// session and ends in [`AuthError::SessionExpired`].
#[derive(Debug, Clone)]
pub struct AuthGuard {
    client: SpotifyClient,
    refresher: TokenRefresher,
}

impl AuthGuard {
    pub fn new(client: SpotifyClient, refresher: TokenRefresher) -> Self {
        Self { client, refresher }
    }

    pub fn refresher(&self) -> &TokenRefresher {
        &self.refresher
    }

    /// Validates the session, refreshing it once if the probe is rejected.
    ///
    /// Probe failures other than 401 (timeouts, 5xx) are returned as
    /// [`UpstreamError`]s and leave the session untouched.
    pub async fn ensure(&self, session: &mut Session) -> Result<UserProfile, HarvestError> {
        if !session.is_authenticated() {
            return Err(AuthError::NotAuthenticated.into());
        }

        match self.client.current_user(&session.access_token).await {
            Ok(profile) => return Ok(profile),
            Err(UpstreamError::Unauthorized) => {}
            Err(err) => return Err(err.into()),
        }

        self.refresh(session).await?;

        match self.client.current_user(&session.access_token).await {
            Ok(profile) => Ok(profile),
            Err(UpstreamError::Unauthorized) => {
                tracing::warn!("refreshed token was rejected by the identity probe");
                session.clear();
                Err(AuthError::SessionExpired.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Replaces the session's tokens using its refresh token.
    ///
    /// On any failure the session is cleared.
    pub async fn refresh(&self, session: &mut Session) -> Result<(), AuthError> {
        let Some(refresh_token) = session.refresh_token.clone().filter(|t| !t.is_empty()) else {
            session.clear();
            return Err(AuthError::SessionExpired);
        };

        tracing::debug!(
            from = ?AuthState::Authenticated,
            to = ?AuthState::Refreshing,
            "refreshing access token"
        );
        match self.refresher.refresh(&refresh_token).await {
            Ok(fresh) => {
                *session = fresh;
                tracing::info!(expires_at = %session.expires_at, "access token refreshed");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "token refresh failed, clearing session");
                session.clear();
                Err(AuthError::SessionExpired)
            }
        }
    }

    /// Runs a user-token call, refreshing once if it comes back 401.
    pub async fn with_refresh<T, F, Fut>(
        &self,
        session: &mut Session,
        call: F,
    ) -> Result<T, HarvestError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        match call(session.access_token.clone()).await {
            Err(UpstreamError::Unauthorized) => {
                self.refresh(session).await?;
                Ok(call(session.access_token.clone()).await?)
            }
            other => Ok(other?),
        }
    }
}
