//! Configuration management for the Spotify library exporter.
//!
//! This module loads configuration values from environment variables and
//! `.env` files and collects them into a [`Settings`] value that is passed
//! to the rest of the application.
//!
//! The configuration system follows a hierarchical approach:
//! 1. Environment variables (highest priority)
//! 2. `.env` file in the local data directory
//! 3. `.env` file in the current working directory
//! 4. Application defaults (where applicable)

use std::{env, net::SocketAddr, path::PathBuf, time::Duration};

use crate::{error::ConfigError, utils};

pub const DEFAULT_SCOPE: &str = "user-library-read playlist-read-private playlist-read-collaborative";
pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8888/callback";
pub const DEFAULT_AUTH_URL: &str = "https://accounts.spotify.com/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const DEFAULT_API_URL: &str = "https://api.spotify.com/v1";
pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 50;
pub const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 120;

/// Loads environment variables from `.env` files.
///
/// The file in the platform-specific local data directory is read first,
/// then the one in the current working directory. Neither is required and
/// variables that are already set are never overridden.
///
/// # Directory Structure
///
/// - Linux: `~/.local/share/spotexport/.env`
/// - macOS: `~/Library/Application Support/spotexport/.env`
/// - Windows: `%LOCALAPPDATA%/spotexport/.env`
///
/// # Errors
///
/// Returns an error if the data directory cannot be created or an existing
/// `.env` file cannot be parsed.
pub async fn load_env() -> Result<(), String> {
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("spotexport/.env");
    if let Some(parent) = path.parent() {
        async_fs::create_dir_all(parent)
            .await
            .map_err(|e| e.to_string())?;
    }

    if path.is_file() {
        dotenv::from_path(&path).map_err(|e| format!("{}: {}", path.display(), e))?;
    }

    match dotenv::dotenv() {
        Ok(_) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(e.to_string()),
    }
}

/// Runtime configuration for one invocation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scope: String,
    pub auth_url: String,
    pub token_url: String,
    pub api_url: String,
    pub page_size: u32,
    pub callback_timeout: Duration,
    pub token_cache: PathBuf,
}

impl Settings {
    /// Settings for the given credentials with every other value at its default.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            scope: DEFAULT_SCOPE.to_string(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            callback_timeout: Duration::from_secs(DEFAULT_CALLBACK_TIMEOUT_SECS),
            token_cache: default_token_cache(),
        }
    }

    /// Reads the settings from the process environment.
    ///
    /// The `SPOTIPY_*` names are accepted as fallbacks for the credential
    /// variables so existing `.env` files keep working. Blank values count
    /// as unset.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Missing`] when the client id or secret is not set
    /// - [`ConfigError::Invalid`] when a numeric variable does not parse or
    ///   the redirect URI cannot be served by the local callback server
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the settings from any variable source; see [`Settings::from_env`].
    ///
    /// # Example
    ///
    /// ```
    /// let vars: HashMap<&str, &str> = HashMap::from([
    ///     ("SPOTIFY_CLIENT_ID", "id"),
    ///     ("SPOTIFY_CLIENT_SECRET", "secret"),
    /// ]);
    /// let settings = Settings::from_lookup(|key| vars.get(key).map(|v| v.to_string()))?;
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let var_with_fallback = |key: &str, fallback: &str| var(key).or_else(|| var(fallback));

        let client_id = var_with_fallback("SPOTIFY_CLIENT_ID", "SPOTIPY_CLIENT_ID")
            .ok_or(ConfigError::Missing("SPOTIFY_CLIENT_ID"))?;
        let client_secret = var_with_fallback("SPOTIFY_CLIENT_SECRET", "SPOTIPY_CLIENT_SECRET")
            .ok_or(ConfigError::Missing("SPOTIFY_CLIENT_SECRET"))?;
        let redirect_uri = var_with_fallback("SPOTIFY_REDIRECT_URI", "SPOTIPY_REDIRECT_URI")
            .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());

        let mut settings = Settings::new(client_id, client_secret, redirect_uri);

        if let Some(scope) = var("SPOTIFY_SCOPE") {
            settings.scope = scope;
        }
        if let Some(url) = var("SPOTIFY_AUTH_URL") {
            settings.auth_url = url;
        }
        if let Some(url) = var("SPOTIFY_TOKEN_URL") {
            settings.token_url = url;
        }
        if let Some(url) = var("SPOTIFY_API_URL") {
            settings.api_url = url.trim_end_matches('/').to_string();
        }
        if let Some(size) = var("SPOTEXPORT_PAGE_SIZE") {
            let size = size.trim().parse::<u32>().map_err(|e| ConfigError::Invalid {
                key: "SPOTEXPORT_PAGE_SIZE",
                message: e.to_string(),
            })?;
            settings.page_size = clamp_page_size(size);
        }
        if let Some(secs) = var("SPOTEXPORT_CALLBACK_TIMEOUT") {
            let secs = secs.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
                key: "SPOTEXPORT_CALLBACK_TIMEOUT",
                message: e.to_string(),
            })?;
            settings.callback_timeout = Duration::from_secs(secs);
        }
        if let Some(path) = var("SPOTEXPORT_TOKEN_CACHE") {
            settings.token_cache = PathBuf::from(path);
        }

        // fail early on a redirect URI the callback server cannot bind
        settings.callback_address()?;

        Ok(settings)
    }

    /// Address and route of the local callback server derived from the redirect URI.
    pub fn callback_address(&self) -> Result<(SocketAddr, String), ConfigError> {
        utils::callback_address(&self.redirect_uri)
    }
}

pub fn clamp_page_size(size: u32) -> u32 {
    size.clamp(1, MAX_PAGE_SIZE)
}

/// Returns the default location of the token cache.
///
/// - Linux: `~/.local/share/spotexport/cache/token.json`
pub fn default_token_cache() -> PathBuf {
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("spotexport/cache/token.json");
    path
}
