//! Error taxonomy for the harvest pipeline.
//!
//! Each concern gets its own enum so callers can tell "must re-authorize"
//! apart from "upstream hiccup" or "the model crashed". [`HarvestError`]
//! is the umbrella used at the edges (CLI commands and HTTP handlers).

use std::{path::PathBuf, time::Duration};

use reqwest::StatusCode;
use thiserror::Error;

/// Failures that end the current operation and invalidate the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("refresh token was rejected: {0}")]
    RefreshDenied(String),
    #[error("client credentials were rejected: {0}")]
    ClientAuthDenied(String),
    #[error("session expired, re-authorization required")]
    SessionExpired,
    #[error("authorization code exchange failed: {0}")]
    CodeExchangeDenied(String),
    #[error("authorization state mismatch")]
    StateMismatch,
}

/// Failures of a single upstream call. Recovered locally by refresh or
/// tier escalation whenever possible.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    #[error("request timed out")]
    Timeout,
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },
    #[error("unauthorized (401)")]
    Unauthorized,
    #[error("server error ({0})")]
    ServerError(StatusCode),
    #[error("client error ({0})")]
    ClientError(StatusCode),
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl UpstreamError {
    /// Maps a non-success status to its error kind.
    pub fn from_status(status: StatusCode, retry_after: Option<Duration>) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => UpstreamError::Unauthorized,
            StatusCode::TOO_MANY_REQUESTS => UpstreamError::RateLimited { retry_after },
            s if s.is_server_error() => UpstreamError::ServerError(s),
            s => UpstreamError::ClientError(s),
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout
        } else if err.is_decode() {
            UpstreamError::MalformedPayload(err.to_string())
        } else if let Some(status) = err.status() {
            UpstreamError::from_status(status, None)
        } else {
            UpstreamError::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("no data available: every tier failed before any row was resolved")]
    NoDataAvailable,
    #[error("fetch cancelled")]
    Cancelled,
    #[error("harvest deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
}

/// Failures of the external recommendation engine.
#[derive(Debug, Error)]
pub enum DownstreamError {
    #[error("failed to start recommender: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("recommender exited with {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },
    #[error("recommender timed out after {0:?}")]
    Timeout(Duration),
    #[error("recommender output is not a JSON array of ids: {0}")]
    UnparsableOutput(String),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("snapshot io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("no snapshot found in {0}")]
    NoSnapshot(PathBuf),
    #[error("invalid snapshot name: {0}")]
    InvalidName(String),
}

/// Umbrella error for a whole harvest or recommendation run.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Downstream(#[from] DownstreamError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl HarvestError {
    /// True when the caller has to send the user through authorization again.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, HarvestError::Auth(_))
    }
}

/// Raised when required configuration is missing or malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            UpstreamError::from_status(StatusCode::UNAUTHORIZED, None),
            UpstreamError::Unauthorized
        );
        assert_eq!(
            UpstreamError::from_status(StatusCode::BAD_GATEWAY, None),
            UpstreamError::ServerError(StatusCode::BAD_GATEWAY)
        );
        assert_eq!(
            UpstreamError::from_status(StatusCode::TOO_MANY_REQUESTS, Some(Duration::from_secs(3))),
            UpstreamError::RateLimited {
                retry_after: Some(Duration::from_secs(3))
            }
        );
        assert_eq!(
            UpstreamError::from_status(StatusCode::FORBIDDEN, None),
            UpstreamError::ClientError(StatusCode::FORBIDDEN)
        );
    }

    #[test]
    fn only_auth_errors_require_reauth() {
        assert!(HarvestError::from(AuthError::SessionExpired).requires_reauth());
        assert!(!HarvestError::from(FetchError::NoDataAvailable).requires_reauth());
        assert!(!HarvestError::from(UpstreamError::Timeout).requires_reauth());
    }
}
