use chrono::Utc;
use reqwest::{Client, Url};

use crate::{
    config::Config,
    error::{AuthError, ConfigError},
    harvest::session::Session,
    types::TokenResponse,
};

/// Talks to the provider's token endpoint.
///
/// Every method makes a single attempt; retrying a rejected grant is never
/// the refresher's decision.
#[derive(Debug, Clone)]
pub struct TokenRefresher {
    http: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl TokenRefresher {
    pub fn new(http: Client, config: &Config) -> Self {
        Self {
            http,
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
        }
    }

    /// Exchanges an authorization code (plus its PKCE verifier) for a user session.
    pub async fn exchange_code(&self, code: &str, verifier: &str) -> Result<Session, AuthError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("code_verifier", verifier),
        ];
        let response = self
            .request_token(&form)
            .await
            .map_err(AuthError::CodeExchangeDenied)?;

        if response.refresh_token.is_none() {
            tracing::warn!("authorization code exchange returned no refresh token");
        }
        Ok(Session::from_token_response(response, None, Utc::now()))
    }

    /// Exchanges a refresh token for a fresh access token.
    ///
    /// The returned session keeps `refresh_token` when the provider didn't
    /// rotate it.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Session, AuthError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        let response = self
            .request_token(&form)
            .await
            .map_err(AuthError::RefreshDenied)?;

        Ok(Session::from_token_response(
            response,
            Some(refresh_token),
            Utc::now(),
        ))
    }

    /// Obtains an application-level token. It never carries user scopes.
    pub async fn client_credentials(&self) -> Result<Session, AuthError> {
        let form = [("grant_type", "client_credentials")];
        let response = self
            .request_token(&form)
            .await
            .map_err(AuthError::ClientAuthDenied)?;

        let mut session = Session::from_token_response(response, None, Utc::now());
        session.scopes.clear();
        session.refresh_token = None;
        Ok(session)
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse, String> {
        let res = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(form)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(format!("token endpoint returned {status}: {text}"));
        }

        let token: TokenResponse = res.json().await.map_err(|e| e.to_string())?;
        if token.access_token.is_empty() {
            return Err("token endpoint returned an empty access token".to_string());
        }
        Ok(token)
    }
}

/// Builds the provider authorization URL for the PKCE authorization code flow.
pub fn authorize_url(config: &Config, code_challenge: &str, state: &str) -> Result<Url, ConfigError> {
    let scope = config.scope_string();
    Url::parse_with_params(
        &config.auth_url,
        &[
            ("response_type", "code"),
            ("client_id", config.client_id.as_str()),
            ("scope", scope.as_str()),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("code_challenge_method", "S256"),
            ("code_challenge", code_challenge),
            ("state", state),
            ("show_dialog", "true"),
        ],
    )
    .map_err(|_| ConfigError::Invalid {
        name: "SPOTIFY_AUTH_URL",
        value: config.auth_url.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorize_url_carries_scopes_and_pkce() {
        let config = Config::new("client-123", "secret");
        let url = authorize_url(&config, "challenge-abc", "state-xyz").unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        let get = |k: &str| {
            pairs
                .iter()
                .find(|(key, _)| key == k)
                .map(|(_, v)| v.clone())
        };
        assert_eq!(get("client_id").as_deref(), Some("client-123"));
        assert_eq!(get("code_challenge").as_deref(), Some("challenge-abc"));
        assert_eq!(get("code_challenge_method").as_deref(), Some("S256"));
        assert_eq!(get("state").as_deref(), Some("state-xyz"));
        assert!(get("scope").unwrap().contains("user-top-read"));
    }
}
