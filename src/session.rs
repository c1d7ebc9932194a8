//! Session store: the auth token, its durable copy, and login/logout.
//!
//! The token is read from the store exactly once, when the session is
//! created. Every later change is written through immediately.

use crate::api::UsersApi;
use crate::error::AuthError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Durable storage for the session token.
pub trait TokenStore {
    fn load(&self) -> Result<Option<String>>;
    fn save(&self, token: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

#[derive(Serialize, Deserialize)]
struct PersistedSession {
    token: String,
}

/// Token persisted as `{"token": "..."}` in a JSON file.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// `~/.userdesk/session.json`, or `.userdesk/session.json` without a home.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_default()
            .join(".userdesk")
            .join("session.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let persisted: PersistedSession = serde_json::from_str(&content)
            .with_context(|| format!("Invalid session file {}", self.path.display()))?;
        Ok(Some(persisted.token).filter(|t| !t.is_empty()))
    }

    fn save(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string(&PersistedSession {
            token: token.to_string(),
        })?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", self.path.display())),
        }
    }
}

pub struct Session<S: TokenStore> {
    token: Option<String>,
    store: S,
}

impl<S: TokenStore> Session<S> {
    /// Restore the session from durable storage. An unreadable store
    /// starts the session logged out.
    pub fn restore(store: S) -> Self {
        let token = match store.load() {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "ignoring unreadable session store");
                None
            }
        };
        Self { token, store }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Exchange credentials for a token. The token is only adopted once it
    /// is durably stored; on any failure the prior session is left untouched.
    pub fn login(
        &mut self,
        api: &dyn UsersApi,
        email: &str,
        password: &str,
    ) -> Result<(), AuthError> {
        if email.trim().is_empty() {
            return Err(AuthError::MissingField("email"));
        }
        if password.is_empty() {
            return Err(AuthError::MissingField("password"));
        }

        let resp = api.login(email, password).map_err(|e| {
            warn!(status = ?e.status(), error = %e, "login rejected");
            AuthError::InvalidCredentials
        })?;
        if resp.token.is_empty() {
            warn!("login returned an empty token");
            return Err(AuthError::InvalidCredentials);
        }

        self.store.save(&resp.token).map_err(|e| {
            warn!(error = %e, "failed to persist session token");
            AuthError::StorageFailed
        })?;
        self.token = Some(resp.token);
        info!(email, "logged in");
        Ok(())
    }

    /// Forget the token. Always succeeds; repeated calls are no-ops.
    pub fn logout(&mut self) {
        if self.token.take().is_some() {
            info!("logged out");
        }
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "failed to clear persisted session token");
        }
    }
}
