//! Session token storage and retrieval.
//!
//! Stores the session bearer token in `<base>/session.json` with restricted
//! permissions (0600). Tokens are never logged or displayed in full.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::paths;

/// Key the session token is persisted under.
pub const TOKEN_KEY: &str = "aipanel_token";

/// Source of the bearer token attached to outbound requests.
///
/// `None` is a valid answer: unauthenticated deployments send no
/// `Authorization` header at all.
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Option<String>;
}

/// A fixed token (or none), mostly for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }
}

impl TokenProvider for StaticToken {
    fn token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Provider for servers running without authentication.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoToken;

impl TokenProvider for NoToken {
    fn token(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionFile {
    #[serde(rename = "aipanel_token", default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
}

/// Persisted session state, written at login and cleared on logout or
/// when the server rejects the token.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `$AIPANEL_HOME/session.json`.
    pub fn default_location() -> Self {
        Self::new(paths::session_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored token.
    /// Returns `None` if the file doesn't exist or holds no token.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_token(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read session from {}", self.path.display()))?;
        let file: SessionFile = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse session from {}", self.path.display()))?;

        Ok(file.token.filter(|t| !t.trim().is_empty()))
    }

    /// Persists a new session token.
    ///
    /// # Errors
    /// Returns an error if the token is blank or the file cannot be written.
    pub fn set_token(&self, token: &str) -> Result<()> {
        let token = token.trim();
        if token.is_empty() {
            anyhow::bail!("Session token must not be empty");
        }
        self.save(&SessionFile {
            token: Some(token.to_string()),
        })
    }

    /// Removes the stored session. Returns whether a session existed.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be removed.
    pub fn clear(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        fs::remove_file(&self.path)
            .with_context(|| format!("Failed to remove {}", self.path.display()))?;
        Ok(true)
    }

    fn save(&self, file: &SessionFile) -> Result<()> {
        let path = &self.path;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let contents = serde_json::to_string_pretty(file).context("Failed to serialize session")?;

        // Write with restricted permissions
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(path)
                .with_context(|| format!("Failed to open {} for writing", path.display()))?;
            file.write_all(contents.as_bytes())
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }

        #[cfg(not(unix))]
        {
            fs::write(path, contents)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }

        Ok(())
    }
}

/// Reads the file on every call, synchronously. Callers take one snapshot
/// per request; the file is a few bytes.
impl TokenProvider for SessionStore {
    fn token(&self) -> Option<String> {
        match self.load_token() {
            Ok(token) => token,
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "ignoring unreadable session file");
                None
            }
        }
    }
}

/// What happens when the server answers 401: the stored token is dropped
/// and the front-end is sent back to its login entry point.
#[derive(Clone, Default)]
pub struct SessionInvalidation {
    store: Option<SessionStore>,
    on_login_required: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl SessionInvalidation {
    pub fn new(store: SessionStore) -> Self {
        Self {
            store: Some(store),
            on_login_required: None,
        }
    }

    /// Registers the hook that sends the user to the login entry point.
    #[must_use]
    pub fn on_login_required<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_login_required = Some(Arc::new(hook));
        self
    }

    pub fn invalidate(&self) {
        if let Some(store) = &self.store {
            match store.clear() {
                Ok(true) => tracing::info!("session token rejected; cleared stored session"),
                Ok(false) => {}
                Err(err) => tracing::warn!(error = %format!("{err:#}"), "failed to clear session"),
            }
        }
        if let Some(hook) = &self.on_login_required {
            hook();
        }
    }
}

impl std::fmt::Debug for SessionInvalidation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionInvalidation")
            .field("store", &self.store)
            .field("on_login_required", &self.on_login_required.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_missing_file_means_no_token() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));

        assert_eq!(store.load_token().unwrap(), None);
        assert_eq!(store.token(), None);
    }

    #[test]
    fn test_set_then_clear_token() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("nested").join("session.json"));

        store.set_token("  secret-token \n").unwrap();
        assert_eq!(store.token().as_deref(), Some("secret-token"));

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains(TOKEN_KEY));

        assert!(store.clear().unwrap());
        assert_eq!(store.token(), None);
        assert!(!store.clear().unwrap());
    }

    #[test]
    fn test_blank_token_rejected() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));

        assert!(store.set_token("   ").is_err());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_corrupt_file_reads_as_no_token() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));
        fs::write(store.path(), "{not json").unwrap();

        assert!(store.load_token().is_err());
        assert_eq!(store.token(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_session_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));
        store.set_token("t").unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_invalidation_clears_store_and_runs_hook() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));
        store.set_token("stale").unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let invalidation = SessionInvalidation::new(store.clone()).on_login_required(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        invalidation.invalidate();

        assert_eq!(store.token(), None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_static_and_no_token() {
        assert_eq!(StaticToken::new("abc").token().as_deref(), Some("abc"));
        assert_eq!(StaticToken::default().token(), None);
        assert_eq!(NoToken.token(), None);
    }
}
