//! Configuration management for harvestify.
//!
//! This module handles loading and accessing configuration values from environment
//! variables and `.env` files. It provides a centralized way to manage application
//! configuration including Spotify API credentials, server settings, harvest tuning
//! and the recommendation engine command.
//!
//! The configuration system follows a hierarchical approach:
//! 1. Environment variables (highest priority)
//! 2. `.env` file in the local data directory
//! 3. Application defaults (everything except the client credentials)

use std::{env, path::PathBuf, time::Duration};

use crate::error::ConfigError;

pub const DEFAULT_AUTH_URL: &str = "https://accounts.spotify.com/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const DEFAULT_API_URL: &str = "https://api.spotify.com/v1";
pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1:3000";

/// Largest number of IDs the provider accepts in one batch call.
pub const PROVIDER_MAX_BATCH: usize = 50;

/// Scopes requested at login.
pub const DEFAULT_SCOPES: &[&str] = &[
    "user-library-read",
    "user-library-modify",
    "user-top-read",
    "user-read-private",
    "user-read-email",
    "user-read-recently-played",
    "user-read-playback-state",
];

/// Loads environment variables from a `.env` file in the local data directory.
///
/// Creates the necessary directory structure if it doesn't exist and loads
/// environment variables from `harvestify/.env` inside the platform-specific
/// local data directory. A missing file is not an error: the process
/// environment alone is enough to run.
///
/// # Directory Structure
///
/// - Linux: `~/.local/share/harvestify/.env`
/// - macOS: `~/Library/Application Support/harvestify/.env`
/// - Windows: `%LOCALAPPDATA%/harvestify/.env`
///
/// # Errors
///
/// Returns an error string if the parent directory cannot be created.
pub async fn load_env() -> Result<(), String> {
    let path = data_dir().join(".env");
    if let Some(parent) = path.parent() {
        async_fs::create_dir_all(parent)
            .await
            .map_err(|e| e.to_string())?;
    }

    if dotenv::from_path(&path).is_err() {
        // fall back to a .env in the working directory, if any
        dotenv::dotenv().ok();
    }
    Ok(())
}

/// Base directory for all locally stored application data.
pub fn data_dir() -> PathBuf {
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("harvestify");
    path
}

/// Typed runtime configuration.
///
/// Built once at startup by [`Config::from_env`] and shared by reference.
/// Tests construct it with [`Config::new`] and point the URLs at a mock
/// server.
#[derive(Debug, Clone)]
pub struct Config {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
    pub api_url: String,
    pub server_address: String,
    pub scopes: Vec<String>,
    /// Timeout applied to every single upstream call.
    pub request_timeout: Duration,
    /// Minimum delay between two consecutive batch or page calls.
    pub pacer_interval: Duration,
    pub batch_size: usize,
    /// Upper bound for a whole harvest.
    pub harvest_deadline: Duration,
    /// Upper bound for the number of pages a collection walk may request.
    pub max_pages: usize,
    pub snapshot_dir: PathBuf,
    /// Program and leading arguments of the recommendation engine.
    pub recommender_command: Vec<String>,
    pub recommender_model: PathBuf,
    pub recommender_timeout: Duration,
    pub secure_cookies: bool,
}

impl Config {
    /// Creates a configuration with defaults for everything but the client credentials.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: format!("http://{DEFAULT_SERVER_ADDRESS}/callback"),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            server_address: DEFAULT_SERVER_ADDRESS.to_string(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            request_timeout: Duration::from_secs(10),
            pacer_interval: Duration::from_millis(200),
            batch_size: PROVIDER_MAX_BATCH,
            harvest_deadline: Duration::from_secs(300),
            max_pages: 200,
            snapshot_dir: data_dir().join("snapshots"),
            recommender_command: vec!["python3".to_string(), "run_model.py".to_string()],
            recommender_model: PathBuf::from("model.pkl"),
            recommender_timeout: Duration::from_secs(120),
            secure_cookies: false,
        }
    }

    /// Reads the configuration from the process environment.
    ///
    /// `SPOTIFY_CLIENT_ID` and `SPOTIFY_CLIENT_SECRET` are required; every
    /// other variable falls back to its default.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] for absent credentials and
    /// [`ConfigError::Invalid`] for values that don't parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let client_id = required("SPOTIFY_CLIENT_ID")?;
        let client_secret = required("SPOTIFY_CLIENT_SECRET")?;
        let mut config = Config::new(client_id, client_secret);

        if let Some(v) = optional("SPOTIFY_REDIRECT_URI") {
            config.redirect_uri = v;
        }
        if let Some(v) = optional("SPOTIFY_AUTH_URL") {
            config.auth_url = v;
        }
        if let Some(v) = optional("SPOTIFY_TOKEN_URL") {
            config.token_url = v;
        }
        if let Some(v) = optional("SPOTIFY_API_URL") {
            config.api_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = optional("SERVER_ADDRESS") {
            config.server_address = v;
        }
        if let Some(v) = optional("SPOTIFY_SCOPES") {
            config.scopes = v.split_whitespace().map(str::to_string).collect();
        }
        if let Some(ms) = parsed::<u64>("REQUEST_TIMEOUT_MS")? {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parsed::<u64>("PACER_INTERVAL_MS")? {
            config.pacer_interval = Duration::from_millis(ms);
        }
        if let Some(size) = parsed::<usize>("BATCH_SIZE")? {
            if size == 0 || size > PROVIDER_MAX_BATCH {
                return Err(ConfigError::Invalid {
                    name: "BATCH_SIZE",
                    value: size.to_string(),
                });
            }
            config.batch_size = size;
        }
        if let Some(secs) = parsed::<u64>("HARVEST_DEADLINE_SECS")? {
            config.harvest_deadline = Duration::from_secs(secs);
        }
        if let Some(pages) = parsed::<usize>("MAX_PAGES")? {
            config.max_pages = pages;
        }
        if let Some(v) = optional("SNAPSHOT_DIR") {
            config.snapshot_dir = PathBuf::from(v);
        }
        if let Some(v) = optional("RECOMMENDER_COMMAND") {
            let parts: Vec<String> = v.split_whitespace().map(str::to_string).collect();
            if parts.is_empty() {
                return Err(ConfigError::Invalid {
                    name: "RECOMMENDER_COMMAND",
                    value: v,
                });
            }
            config.recommender_command = parts;
        }
        if let Some(v) = optional("RECOMMENDER_MODEL") {
            config.recommender_model = PathBuf::from(v);
        }
        if let Some(secs) = parsed::<u64>("RECOMMENDER_TIMEOUT_SECS")? {
            config.recommender_timeout = Duration::from_secs(secs);
        }
        if let Some(flag) = parsed::<bool>("SECURE_COOKIES")? {
            config.secure_cookies = flag;
        }

        Ok(config)
    }

    /// Space separated scope string as sent to the authorization endpoint.
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match optional(name) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_provider_limits() {
        let config = Config::new("id", "secret");
        assert_eq!(config.batch_size, PROVIDER_MAX_BATCH);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.pacer_interval, Duration::from_millis(200));
        assert!(config.scope_string().contains("user-top-read"));
        assert!(config.scope_string().contains("user-read-recently-played"));
    }
}
