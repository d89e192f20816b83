//! Configuration management for aipanel.
//!
//! Loads configuration from ${AIPANEL_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Environment variable overriding the configured server URL.
pub const SERVER_URL_ENV: &str = "AIPANEL_SERVER_URL";

/// Returns the default config template with comments.
///
/// Embedded from default_config.toml at compile time.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

pub mod paths {
    //! Path resolution for aipanel configuration and data directories.
    //!
    //! AIPANEL_HOME resolution order:
    //! 1. AIPANEL_HOME environment variable (if set)
    //! 2. ~/.config/aipanel (default)

    use std::path::PathBuf;

    /// Returns the aipanel home directory.
    pub fn aipanel_home() -> PathBuf {
        if let Ok(home) = std::env::var("AIPANEL_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".aipanel"),
            |h| h.join(".config").join("aipanel"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        aipanel_home().join("config.toml")
    }

    /// Returns the path to the persisted session (token) file.
    pub fn session_path() -> PathBuf {
        aipanel_home().join("session.json")
    }

    /// Returns the directory log files are written to.
    pub fn logs_dir() -> PathBuf {
        aipanel_home().join("logs")
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive when RUST_LOG is unset.
    pub level: String,
    /// Whether to write log files under `logs_dir()`.
    pub file: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: true,
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the aipanel server
    pub server_url: String,

    /// Connection establishment timeout in seconds (0 disables)
    pub connect_timeout_secs: u32,

    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    pub const DEFAULT_SERVER_URL: &'static str = "http://127.0.0.1:8080";
    const DEFAULT_CONNECT_TIMEOUT_SECS: u32 = 10;

    /// Loads configuration from the default config path.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Writes the commented default config to `path`.
    ///
    /// # Errors
    /// Fails if the file already exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, default_config_template())
    }

    /// Returns the connect timeout, or None when disabled.
    pub fn connect_timeout(&self) -> Option<Duration> {
        if self.connect_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(u64::from(self.connect_timeout_secs)))
        }
    }

    /// Resolves the server URL with precedence: flag > env > config.
    ///
    /// # Errors
    /// Returns an error if the winning value is not a valid http(s) URL.
    pub fn server_url(&self, flag: Option<&str>) -> Result<Url> {
        let env = std::env::var(SERVER_URL_ENV).ok();
        resolve_server_url(flag, env.as_deref(), &self.server_url)
    }

    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: Self::DEFAULT_SERVER_URL.to_string(),
            connect_timeout_secs: Self::DEFAULT_CONNECT_TIMEOUT_SECS,
            log: LogConfig::default(),
        }
    }
}

/// Picks the first non-blank candidate among flag, env and config, falling
/// back to the default, and validates it.
///
/// # Errors
/// Returns an error if the chosen URL does not parse or is not http(s).
pub fn resolve_server_url(flag: Option<&str>, env: Option<&str>, config: &str) -> Result<Url> {
    let chosen = [flag, env, Some(config)]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(Config::DEFAULT_SERVER_URL);

    let url = Url::parse(chosen).with_context(|| format!("Invalid server URL: {chosen}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        anyhow::bail!("Server URL must use http or https: {chosen}");
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    /// Config loading: missing file returns defaults.
    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("nonexistent.toml");

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.server_url, "http://127.0.0.1:8080");
    }

    /// Config loading: partial config merges with defaults.
    #[test]
    fn test_load_partial_config_merges_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        fs::write(&config_path, "[log]\nlevel = \"debug\"\n").unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.log.level, "debug");
        assert!(config.log.file);
        assert_eq!(config.connect_timeout_secs, 10);
    }

    #[test]
    fn test_load_rejects_invalid_toml() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "server_url = [").unwrap();

        assert!(Config::load_from(&config_path).is_err());
    }

    /// The shipped template must parse back to the Rust defaults.
    #[test]
    fn test_template_matches_defaults() {
        let parsed: Config = toml::from_str(default_config_template()).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_init_creates_config_with_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("subdir").join("config.toml");

        Config::init(&config_path).unwrap();

        let contents = fs::read_to_string(&config_path).unwrap();
        assert!(contents.contains("server_url = \"http://127.0.0.1:8080\""));
    }

    /// Config init: fails if file exists (no silent overwrite).
    #[test]
    fn test_init_fails_if_exists() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        fs::write(&config_path, "").unwrap();

        assert!(Config::init(&config_path).is_err());
    }

    #[test]
    fn test_connect_timeout_zero_disables() {
        let config = Config {
            connect_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.connect_timeout(), None);
        assert_eq!(
            Config::default().connect_timeout(),
            Some(Duration::from_secs(10))
        );
    }

    #[test]
    fn test_server_url_precedence() {
        let url = resolve_server_url(Some("http://flag:1"), Some("http://env:2"), "http://cfg:3");
        assert_eq!(url.unwrap().as_str(), "http://flag:1/");

        let url = resolve_server_url(Some("  "), Some("http://env:2"), "http://cfg:3");
        assert_eq!(url.unwrap().as_str(), "http://env:2/");

        let url = resolve_server_url(None, None, "http://cfg:3");
        assert_eq!(url.unwrap().as_str(), "http://cfg:3/");

        let url = resolve_server_url(None, None, "");
        assert_eq!(url.unwrap().as_str(), "http://127.0.0.1:8080/");
    }

    #[test]
    fn test_server_url_rejects_non_http() {
        assert!(resolve_server_url(Some("ftp://host"), None, "").is_err());
        assert!(resolve_server_url(Some("not a url"), None, "").is_err());
    }
}
