//! Configuration and storage paths
//!
//! OAuth application settings live in `config.toml` under the platform
//! config directory; the token record is a separate JSON file next to it.
//! `SPOTIFY_CLIENT_ID` overrides the file.

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

use crate::auth::{FileTokenStore, OAuthSettings};

const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8888/callback";

const DEFAULT_SCOPES: &[&str] = &[
    "user-read-playback-state",
    "user-modify-playback-state",
    "user-read-private",
];

/// Application configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// OAuth2 client ID of the registered Spotify application
    pub client_id: Option<String>,
    /// Override for the loopback redirect URI
    pub redirect_uri: Option<String>,
    /// Override for the requested scopes
    pub scopes: Option<Vec<String>>,
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "spotify-cli", "spotify-cli")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Load configuration from disk, falling back to defaults.
    pub fn load() -> Result<Self> {
        let path = Self::config_dir()?.join("config.toml");

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    /// OAuth app settings with env/file/default precedence applied.
    pub fn oauth_settings(&self) -> Result<OAuthSettings> {
        let client_id = resolve_client_id(
            std::env::var("SPOTIFY_CLIENT_ID").ok(),
            self.client_id.as_deref(),
        )?;

        Ok(OAuthSettings {
            client_id,
            redirect_uri: self
                .redirect_uri
                .clone()
                .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string()),
            scopes: self.scopes.clone().unwrap_or_else(|| {
                DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
            }),
        })
    }

    /// File-backed token store under the config directory. Ensures the
    /// directory exists so saves cannot fail on a missing parent.
    pub fn token_store(&self) -> Result<FileTokenStore> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir).context("Failed to create config directory")?;
        Ok(FileTokenStore::new(dir.join("tokens.json")))
    }
}

fn resolve_client_id(env: Option<String>, file: Option<&str>) -> Result<String> {
    let from_env = env.filter(|v| !v.trim().is_empty());
    let from_file = file.filter(|v| !v.trim().is_empty()).map(str::to_string);
    match from_env.or(from_file) {
        Some(id) => Ok(id),
        None => bail!(
            "No client ID configured. Set SPOTIFY_CLIENT_ID or add client_id to config.toml."
        ),
    }
}
