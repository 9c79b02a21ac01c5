/*
    spotify-insights-rs | Personal Spotify listening analytics with local AI summaries.
    Copyright (C) 2025  Israel Alberto Roldan Vega

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_API_BASE_URL: &str = "https://api.spotify.com/v1/";
pub const DEFAULT_AUTH_BASE_URL: &str = "https://accounts.spotify.com/";
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama:latest";
pub const DEFAULT_APP_URL: &str = "/";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Credentials and endpoints for the Spotify accounts service and Web API.
#[derive(Debug, Clone)]
pub struct SpotifySettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub api_base_url: String,
    pub auth_base_url: String,
}

impl SpotifySettings {
    /// Builds the `rspotify` configuration. Token caching and automatic
    /// refreshing are both off: persistence belongs to the session store and
    /// an expired token means signing in again.
    pub fn rspotify_config(&self) -> rspotify::Config {
        rspotify::Config {
            api_base_url: self.api_base_url.clone(),
            auth_base_url: self.auth_base_url.clone(),
            token_cached: false,
            token_refreshing: false,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct OllamaSettings {
    pub base_url: String,
    pub model: String,
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_OLLAMA_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub spotify: SpotifySettings,
    pub ollama: OllamaSettings,
    /// Directory holding the local session channels.
    pub session_dir: PathBuf,
    /// Where the browser lands after signing in or out.
    pub app_url: String,
    pub secure_cookies: bool,
}

impl Settings {
    /// Reads settings from the process environment.
    ///
    /// Required: `SPOTIFY_CLIENT_ID`, `SPOTIFY_CLIENT_SECRET`, `SPOTIFY_REDIRECT_URI`.
    /// Everything else falls back to a local-development default.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let required = |key: &'static str| var(key).ok_or(ConfigError::Missing(key));

        let redirect_uri = required("SPOTIFY_REDIRECT_URI")?;
        if !redirect_uri.starts_with("http://") && !redirect_uri.starts_with("https://") {
            return Err(ConfigError::Invalid {
                key: "SPOTIFY_REDIRECT_URI",
                reason: "expected an absolute http(s) URL".to_string(),
            });
        }

        let spotify = SpotifySettings {
            client_id: required("SPOTIFY_CLIENT_ID")?,
            client_secret: required("SPOTIFY_CLIENT_SECRET")?,
            redirect_uri,
            api_base_url: with_trailing_slash(
                var("SPOTIFY_API_BASE_URL").unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            ),
            auth_base_url: with_trailing_slash(
                var("SPOTIFY_AUTH_BASE_URL").unwrap_or_else(|| DEFAULT_AUTH_BASE_URL.to_string()),
            ),
        };

        let ollama = OllamaSettings {
            base_url: var("OLLAMA_API_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            model: var("OLLAMA_MODEL").unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string()),
        };

        let session_dir = var("INSIGHTS_SESSION_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_session_dir);

        let secure_cookies = matches!(
            var("INSIGHTS_SECURE_COOKIES").as_deref(),
            Some("1") | Some("true")
        );

        Ok(Self {
            spotify,
            ollama,
            session_dir,
            app_url: var("INSIGHTS_APP_URL").unwrap_or_else(|| DEFAULT_APP_URL.to_string()),
            secure_cookies,
        })
    }
}

fn default_session_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("spotify-insights")
}

// rspotify joins endpoint paths onto the base URL, so it has to end in '/'.
fn with_trailing_slash(mut url: String) -> String {
    if !url.ends_with('/') {
        url.push('/');
    }
    url
}
