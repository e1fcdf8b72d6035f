use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{error::AuthError, spotify::auth::TokenRefresher};

use super::session::Session;

/// Authorization tier a batch is served at, in escalation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    UserToken,
    ClientCredentials,
    PerItem,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::UserToken, Tier::ClientCredentials, Tier::PerItem];

    /// How the credential for this tier is obtained.
    pub fn acquire(self) -> Acquire {
        match self {
            Tier::UserToken => Acquire::Reprobe,
            Tier::ClientCredentials => Acquire::ClientCredentials,
            Tier::PerItem => Acquire::PerItem,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::UserToken => "user-token",
            Tier::ClientCredentials => "client-credentials",
            Tier::PerItem => "per-item",
        };
        f.write_str(name)
    }
}

/// Credential acquisition mode of a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    /// Keep using the (already probed) user token.
    Reprobe,
    /// Obtain an application token with the client credentials grant.
    ClientCredentials,
    /// Keep the strongest token at hand and request IDs one by one.
    PerItem,
}

/// Ordered fallback tiers for one fetch operation.
///
/// The pointer only ever moves forward: once a chunk forced an escalation,
/// every later chunk of the same operation is served at the higher tier.
#[derive(Debug)]
pub struct FallbackEscalator {
    tiers: Vec<Tier>,
    position: usize,
    app_token: Option<String>,
    app_denied: bool,
}

impl Default for FallbackEscalator {
    fn default() -> Self {
        Self::new()
    }
}

impl FallbackEscalator {
    pub fn new() -> Self {
        Self::with_tiers(Tier::ALL.to_vec())
    }

    /// Uses a subset of the tiers. Order is normalized and duplicates dropped.
    pub fn with_tiers(mut tiers: Vec<Tier>) -> Self {
        tiers.sort();
        tiers.dedup();
        if tiers.is_empty() {
            tiers.push(Tier::PerItem);
        }
        Self {
            tiers,
            position: 0,
            app_token: None,
            app_denied: false,
        }
    }

    pub fn tier(&self) -> Tier {
        self.tiers[self.position]
    }

    pub fn is_terminal(&self) -> bool {
        self.position + 1 >= self.tiers.len()
    }

    /// Every tier has been tried; nothing is left to escalate to.
    pub fn is_exhausted(&self) -> bool {
        self.is_terminal()
    }

    /// Moves one tier up (a no-op at the terminal tier) and returns the new
    /// tier with its acquisition mode.
    pub fn advance(&mut self) -> (Tier, Acquire) {
        let from = self.tier();
        if !self.is_terminal() {
            self.position += 1;
        }
        let to = self.tier();
        if from != to {
            tracing::debug!(%from, %to, "escalating fetch tier");
        }
        (to, to.acquire())
    }

    /// Bearer token for the current tier.
    ///
    /// The application token is obtained at most once per operation; a
    /// denial is remembered so later chunks don't hammer the token endpoint.
    pub async fn credential(
        &mut self,
        session: &Session,
        refresher: &TokenRefresher,
    ) -> Result<String, AuthError> {
        match self.tier().acquire() {
            Acquire::Reprobe => user_token(session),
            Acquire::ClientCredentials => {
                if let Some(token) = &self.app_token {
                    return Ok(token.clone());
                }
                if self.app_denied {
                    return Err(AuthError::ClientAuthDenied(
                        "application token was already denied".to_string(),
                    ));
                }
                match refresher.client_credentials().await {
                    Ok(app) => {
                        self.app_token = Some(app.access_token.clone());
                        Ok(app.access_token)
                    }
                    Err(err) => {
                        self.app_denied = true;
                        Err(err)
                    }
                }
            }
            Acquire::PerItem => match &self.app_token {
                Some(token) => Ok(token.clone()),
                None => user_token(session),
            },
        }
    }
}

fn user_token(session: &Session) -> Result<String, AuthError> {
    if session.is_authenticated() {
        Ok(session.access_token.clone())
    } else {
        Err(AuthError::NotAuthenticated)
    }
}
