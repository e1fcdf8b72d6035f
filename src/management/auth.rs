use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::{
    config,
    error::{AuthError, PersistenceError},
    harvest::Session,
    spotify::auth::TokenRefresher,
};

/// Keeps the CLI's session on disk between runs.
pub struct TokenManager {
    path: PathBuf,
    session: Session,
}

impl TokenManager {
    pub fn new(session: Session) -> Self {
        Self::at(Self::session_path(), session)
    }

    pub fn at(path: impl Into<PathBuf>, session: Session) -> Self {
        TokenManager {
            path: path.into(),
            session,
        }
    }

    pub async fn load() -> Result<Self, PersistenceError> {
        Self::load_from(Self::session_path()).await
    }

    pub async fn load_from(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        let content = async_fs::read_to_string(&path)
            .await
            .map_err(|source| PersistenceError::Io {
                path: path.clone(),
                source,
            })?;
        let session: Session = serde_json::from_str(&content)?;
        Ok(Self { path, session })
    }

    pub async fn persist(&self) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            async_fs::create_dir_all(parent)
                .await
                .map_err(|source| io_error(parent, source))?;
        }

        let json = serde_json::to_string_pretty(&self.session)?;
        async_fs::write(&self.path, json)
            .await
            .map_err(|source| io_error(&self.path, source))
    }

    /// Refreshes the stored session ahead of expiry and persists the result.
    ///
    /// A rejected refresh leaves the file alone; the caller decides whether
    /// to send the user through `auth` again.
    pub async fn ensure_fresh(&mut self, refresher: &TokenRefresher) -> Result<(), AuthError> {
        if !self.session.is_expiring(Utc::now()) {
            return Ok(());
        }
        let Some(refresh_token) = self.session.refresh_token.clone() else {
            return Err(AuthError::SessionExpired);
        };

        self.session = refresher.refresh(&refresh_token).await?;
        if let Err(e) = self.persist().await {
            tracing::warn!(error = %e, "could not persist refreshed session");
        }
        Ok(())
    }

    /// Stores a session that changed while in use (e.g. refreshed by the guard).
    pub async fn update(&mut self, session: Session) -> Result<(), PersistenceError> {
        if session == self.session {
            return Ok(());
        }
        self.session = session;
        self.persist().await
    }

    /// Forgets the session and deletes its file, so a dead login isn't
    /// reported as valid later. A missing file is fine.
    pub async fn clear(&mut self) -> Result<(), PersistenceError> {
        self.session.clear();
        match async_fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(io_error(&self.path, source)),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn session_path() -> PathBuf {
        config::data_dir().join("cache").join("session.json")
    }
}

fn io_error(path: &Path, source: std::io::Error) -> PersistenceError {
    PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    }
}
