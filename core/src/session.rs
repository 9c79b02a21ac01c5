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

//! Session persistence over two storage channels.
//!
//! The primary channel is readable by the client (a local state file for the
//! terminal, the same file for the local web server). The secondary channel
//! mirrors the access token and profile and is the only place the refresh
//! token is written, always with [`Visibility::HttpOnly`]. Loading prefers the
//! primary channel and falls back to the secondary one.

use crate::models::{Session, TokenPair, UserProfile};
use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

pub const ACCESS_TOKEN_KEY: &str = "spotify_access_token";
pub const TOKEN_ISSUED_AT_KEY: &str = "spotify_token_issued_at";
pub const TOKEN_EXPIRES_IN_KEY: &str = "spotify_token_expires_in";
pub const REFRESH_TOKEN_KEY: &str = "spotify_refresh_token";
pub const USER_KEY: &str = "spotify_user";

const SESSION_KEYS: [&str; 5] = [
    ACCESS_TOKEN_KEY,
    TOKEN_ISSUED_AT_KEY,
    TOKEN_EXPIRES_IN_KEY,
    REFRESH_TOKEN_KEY,
    USER_KEY,
];

pub const REFRESH_TOKEN_TTL_DAYS: i64 = 30;
pub const PROFILE_TTL_SECS: i64 = 3600;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Session data could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Who may read a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    /// Readable by client code.
    Client,
    /// Only sent back to the server; never exposed to client code.
    HttpOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WritePolicy {
    pub visibility: Visibility,
    pub max_age: Option<Duration>,
}

impl WritePolicy {
    pub fn persistent() -> Self {
        Self {
            visibility: Visibility::Client,
            max_age: None,
        }
    }

    pub fn expiring(max_age: Duration) -> Self {
        Self {
            visibility: Visibility::Client,
            max_age: Some(max_age),
        }
    }

    pub fn http_only(max_age: Duration) -> Self {
        Self {
            visibility: Visibility::HttpOnly,
            max_age: Some(max_age),
        }
    }
}

/// A key/value place session data can be written to.
pub trait StorageChannel {
    fn name(&self) -> &'static str;

    fn read(&self, key: &str) -> Option<String>;

    fn write(&mut self, key: &str, value: &str, policy: WritePolicy) -> Result<(), SessionError>;

    /// Removes `key`, leaving behind an already-expired form where the
    /// channel has one, even if the key was never written.
    fn expire(&mut self, key: &str) -> Result<(), SessionError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    value: String,
    visibility: Visibility,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct LocalState {
    entries: BTreeMap<String, StoredEntry>,
    path: Option<PathBuf>,
}

/// In-process key/value channel, optionally backed by a JSON file.
///
/// Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct LocalChannel {
    inner: Arc<Mutex<LocalState>>,
}

impl LocalChannel {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens (or lazily creates) a file-backed channel at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let path = path.into();
        let entries = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            BTreeMap::new()
        };
        debug!("Opened session channel at {}", path.display());

        Ok(Self {
            inner: Arc::new(Mutex::new(LocalState {
                entries,
                path: Some(path),
            })),
        })
    }

    fn state(&self) -> MutexGuard<'_, LocalState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(state: &LocalState) -> Result<(), SessionError> {
        let Some(path) = &state.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(&state.entries)?)?;
        Ok(())
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.state().path.clone()
    }

    pub fn visibility(&self, key: &str) -> Option<Visibility> {
        self.state().entries.get(key).map(|e| e.visibility)
    }
}

impl StorageChannel for LocalChannel {
    fn name(&self) -> &'static str {
        "local"
    }

    fn read(&self, key: &str) -> Option<String> {
        let state = self.state();
        let entry = state.entries.get(key)?;
        match entry.expires_at {
            Some(expires_at) if Utc::now() >= expires_at => None,
            _ => Some(entry.value.clone()),
        }
    }

    fn write(&mut self, key: &str, value: &str, policy: WritePolicy) -> Result<(), SessionError> {
        let mut state = self.state();
        state.entries.insert(
            key.to_string(),
            StoredEntry {
                value: value.to_string(),
                visibility: policy.visibility,
                expires_at: policy.max_age.and_then(|age| Utc::now().checked_add_signed(age)),
            },
        );
        Self::persist(&state)
    }

    fn expire(&mut self, key: &str) -> Result<(), SessionError> {
        let mut state = self.state();
        state.entries.remove(key);
        Self::persist(&state)
    }
}

/// Primary channel file under `dir`, shared by the terminal and the web server.
pub fn primary_channel(dir: &Path) -> Result<LocalChannel, SessionError> {
    LocalChannel::open(dir.join("session.json"))
}

/// Both channels for the terminal client, under `dir`.
pub fn local_channels(dir: &Path) -> Result<(LocalChannel, LocalChannel), SessionError> {
    Ok((primary_channel(dir)?, LocalChannel::open(dir.join("cookies.json"))?))
}

/// `save` / `load` / `clear` over a primary and a secondary channel.
///
/// The store does not judge expiry: an expired token loads like any other,
/// and callers check [`TokenPair::is_expired`].
pub struct SessionStore<P, S> {
    primary: P,
    secondary: S,
}

impl<P: StorageChannel, S: StorageChannel> SessionStore<P, S> {
    pub fn new(primary: P, secondary: S) -> Self {
        Self { primary, secondary }
    }

    pub fn save(&mut self, session: &Session) -> Result<(), SessionError> {
        let token = &session.token;
        let issued_at = token.issued_at.to_rfc3339();
        let expires_in = token.expires_in.to_string();
        let user = session
            .profile
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let persistent = WritePolicy::persistent();
        self.primary.write(ACCESS_TOKEN_KEY, &token.access_token, persistent)?;
        self.primary.write(TOKEN_ISSUED_AT_KEY, &issued_at, persistent)?;
        self.primary.write(TOKEN_EXPIRES_IN_KEY, &expires_in, persistent)?;
        match &user {
            Some(user) => self.primary.write(USER_KEY, user, persistent)?,
            None => self.primary.expire(USER_KEY)?,
        }

        let token_age = WritePolicy::expiring(Duration::seconds(
            i64::try_from(token.expires_in).unwrap_or(i64::MAX / 1000).min(i64::MAX / 1000),
        ));
        self.secondary.write(ACCESS_TOKEN_KEY, &token.access_token, token_age)?;
        self.secondary.write(TOKEN_ISSUED_AT_KEY, &issued_at, token_age)?;
        self.secondary.write(TOKEN_EXPIRES_IN_KEY, &expires_in, token_age)?;
        match &user {
            Some(user) => self.secondary.write(
                USER_KEY,
                user,
                WritePolicy::expiring(Duration::seconds(PROFILE_TTL_SECS)),
            )?,
            None => self.secondary.expire(USER_KEY)?,
        }
        match &token.refresh_token {
            Some(refresh_token) => self.secondary.write(
                REFRESH_TOKEN_KEY,
                refresh_token,
                WritePolicy::http_only(Duration::days(REFRESH_TOKEN_TTL_DAYS)),
            )?,
            None => self.secondary.expire(REFRESH_TOKEN_KEY)?,
        }

        debug!(
            "Session saved to {} and {} channels",
            self.primary.name(),
            self.secondary.name()
        );
        Ok(())
    }

    pub fn load(&self) -> Option<Session> {
        let mut session = read_session(&self.primary).or_else(|| read_session(&self.secondary))?;
        session.token.refresh_token = self.secondary.read(REFRESH_TOKEN_KEY);
        Some(session)
    }

    /// Expires every session key on both channels. Keeps going after a
    /// failure and reports the first one.
    pub fn clear(&mut self) -> Result<(), SessionError> {
        let mut first_error = None;
        for key in SESSION_KEYS {
            for result in [self.primary.expire(key), self.secondary.expire(key)] {
                if let Err(e) = result {
                    warn!("Failed to clear {}: {}", key, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        debug!("Session cleared");
        first_error.map_or(Ok(()), Err)
    }

    pub fn into_channels(self) -> (P, S) {
        (self.primary, self.secondary)
    }
}

fn read_session(channel: &dyn StorageChannel) -> Option<Session> {
    let access_token = channel.read(ACCESS_TOKEN_KEY).filter(|t| !t.is_empty())?;

    let issued_at = channel
        .read(TOKEN_ISSUED_AT_KEY)
        .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
        .map(|at| at.with_timezone(&Utc));
    let expires_in = channel
        .read(TOKEN_EXPIRES_IN_KEY)
        .and_then(|raw| raw.parse::<u64>().ok());

    // No known lifetime means the token is treated as expired.
    let token = match (issued_at, expires_in) {
        (Some(issued_at), Some(expires_in)) => TokenPair::new(access_token, expires_in, issued_at),
        _ => {
            warn!("Stored access token has no expiry; treating it as expired");
            TokenPair::without_expiry(access_token)
        }
    };

    let profile = channel
        .read(USER_KEY)
        .and_then(|raw| match serde_json::from_str::<UserProfile>(&raw) {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!("Error parsing stored user data: {}", e);
                None
            }
        });

    debug!("Session loaded from {} channel", channel.name());
    Some(Session { token, profile })
}
