//! Client configuration.
//!
//! Stored as JSON at `<config dir>/qumail/config.json`. A missing file means
//! defaults. Environment variables override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::error::{Error, Result};

/// Overrides [`ClientConfig::api_base_url`].
pub const ENV_API_URL: &str = "QUMAIL_API_URL";

/// Overrides [`ClientConfig::persist_credentials`].
pub const ENV_PERSIST_CREDENTIALS: &str = "QUMAIL_PERSIST_CREDENTIALS";

const DEFAULT_API_URL: &str = "http://localhost:8000/api/";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend API root; every endpoint path is joined onto it.
    pub api_base_url: String,
    /// Per-request timeout. Zero disables it.
    pub request_timeout_secs: u64,
    /// Keyring service name for the session token.
    pub keyring_service: String,
    /// Keyring account name for the session token.
    pub keyring_account: String,
    /// Keep the session token across runs. When false it lives in memory only.
    pub persist_credentials: bool,
    /// Backend endpoint to call on logout, if the backend has one.
    pub logout_path: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            keyring_service: "qumail".to_string(),
            keyring_account: crate::credential::DEFAULT_ACCOUNT.to_string(),
            persist_credentials: true,
            logout_path: None,
        }
    }
}

impl ClientConfig {
    /// Default config file location.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("qumail")
            .join("config.json")
    }

    /// Loads the config at `path`, or defaults if there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(?path, "No config file, using defaults");
            return Ok(Self::default());
        }
        let contents = tokio::fs::read_to_string(path).await?;
        let config: Self = serde_json::from_str(&contents)?;
        info!(?path, "Loaded config");
        Ok(config)
    }

    /// Loads the default config file and applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable or an override is invalid.
    pub async fn load_default() -> Result<Self> {
        let mut config = Self::load(&Self::default_path()).await?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Writes the config to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, contents).await?;
        info!(?path, "Saved config");
        Ok(())
    }

    /// Applies overrides looked up through `var`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a boolean override is not recognized.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = var(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url;
        }
        if let Some(raw) = var(ENV_PERSIST_CREDENTIALS) {
            self.persist_credentials = parse_bool(&raw).ok_or_else(|| {
                Error::Config(format!("{ENV_PERSIST_CREDENTIALS} must be true or false, got '{raw}'"))
            })?;
        }
        Ok(())
    }

    /// Parsed API root, always ending in `/` so endpoint paths join under it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL is invalid or not http(s).
    pub fn base_url(&self) -> Result<Url> {
        let mut raw = self.api_base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let url = Url::parse(&raw)
            .map_err(|e| Error::Config(format!("invalid API URL '{}': {e}", self.api_base_url)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(Error::Config(format!(
                "unsupported API URL scheme '{other}'"
            ))),
        }
    }

    /// Request timeout, if any.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        match self.request_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
