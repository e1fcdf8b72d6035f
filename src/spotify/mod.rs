//! # Spotify Integration Module
//!
//! Thin HTTP layer over the Spotify Web API used by the harvest engine.
//!
//! ```text
//! Harvest Layer (AuthGuard, BatchFetcher, PaginationWalker)
//!          ↓
//! Spotify Integration Layer
//!     ├── Authentication (token endpoint, three grants)
//!     ├── Library (profile probe, top tracks, saved tracks)
//!     └── Catalog (ID batches: artists, tracks, audio features)
//!          ↓
//! HTTP Layer (reqwest, JSON)
//! ```
//!
//! Every call goes through [`SpotifyClient::get_json`], which applies the
//! configured per-call timeout and turns anything other than a 2xx with a
//! parseable body into an [`UpstreamError`]. Retrying, refreshing and tier
//! escalation are the caller's business; this layer makes exactly one
//! request per call.

use std::time::Duration;

use reqwest::{Client, Response, header::RETRY_AFTER};
use serde::de::DeserializeOwned;

use crate::{config::Config, error::UpstreamError};

pub mod auth;
pub mod catalog;
pub mod library;

/// Shared HTTP client bound to one API base URL.
#[derive(Debug, Clone)]
pub struct SpotifyClient {
    http: Client,
    api_url: String,
}

impl SpotifyClient {
    /// Builds the client with the configured per-call timeout.
    pub fn new(config: &Config) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;
        Ok(Self::with_http(http, &config.api_url))
    }

    pub fn with_http(http: Client, api_url: &str) -> Self {
        Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Absolute URL for an API path. Absolute inputs (cursor links) pass through.
    pub fn endpoint(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.api_url, path.trim_start_matches('/'))
        }
    }

    /// Issues one authenticated GET and decodes the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        token: &str,
    ) -> Result<T, UpstreamError> {
        let url = self.endpoint(path);
        let mut request = self.http.get(&url).bearer_auth(token);
        if !query.is_empty() {
            request = request.query(query);
        }

        let response = request.send().await?;
        let response = check_status(response)?;
        let body = response.text().await?;

        serde_json::from_str(&body).map_err(|e| UpstreamError::MalformedPayload(e.to_string()))
    }
}

fn check_status(response: Response) -> Result<Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);

    tracing::debug!(status = %status, url = %response.url(), "upstream call failed");
    Err(UpstreamError::from_status(status, retry_after))
}
