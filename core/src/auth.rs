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

use crate::config::SpotifySettings;
use crate::models::{TokenPair, DEFAULT_TOKEN_LIFETIME_SECS};
use crate::spotify::status_and_body;
use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info};
use rand::{distributions::Alphanumeric, Rng};
use rspotify::{prelude::*, AuthCodeSpotify, Credentials, OAuth};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// Permissions requested on the authorize page.
/// - user-read-private / user-read-email: profile header.
/// - user-top-read: top tracks and artists.
/// - user-read-recently-played: recent listening.
/// - playlist-read-private / playlist-read-collaborative / user-library-read: library access.
pub const SCOPES: [&str; 7] = [
    "user-read-private",
    "user-read-email",
    "user-top-read",
    "user-read-recently-played",
    "playlist-read-private",
    "playlist-read-collaborative",
    "user-library-read",
];

pub const STATE_LENGTH: usize = 16;

/// Spotify authorization codes are single-use and expire after ten minutes.
pub const CODE_LIFETIME_SECS: i64 = 600;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Spotify authorization was denied: {0}")]
    Denied(String),
    #[error("No authorization code received from Spotify")]
    MissingCode,
    #[error("Authorization code was already used; start the sign-in again")]
    CodeReused,
    #[error("Authorization state did not match the sign-in request")]
    StateMismatch,
    #[error("Token exchange failed: {status} - {body}")]
    TokenExchange { status: u16, body: String },
    #[error("Token exchange returned no token")]
    TokenUnavailable,
    #[error("Failed to read the authorization response: {0}")]
    Prompt(String),
    #[error("Spotify authentication failed: {0}")]
    Spotify(#[from] rspotify::ClientError),
}

impl AuthError {
    /// Value of the `error` query parameter used when redirecting home.
    pub fn redirect_code(&self) -> &'static str {
        match self {
            AuthError::Denied(_) => "access_denied",
            AuthError::MissingCode => "no_code",
            AuthError::StateMismatch => "state_mismatch",
            _ => "token_exchange_failed",
        }
    }
}

/// Authorize URL plus the anti-CSRF state embedded in it.
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    pub url: String,
    pub state: String,
}

/// Random alphanumeric value for the `state` parameter.
pub fn generate_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(STATE_LENGTH)
        .map(char::from)
        .collect()
}

/// Trades authorization codes for tokens with the client credentials.
///
/// A code is only ever submitted once per process; a second attempt with the
/// same code fails locally with [`AuthError::CodeReused`]. Submitted codes are
/// remembered for [`CODE_LIFETIME_SECS`], after which the provider rejects
/// them anyway.
pub struct TokenExchanger {
    creds: Credentials,
    redirect_uri: String,
    config: rspotify::Config,
    consumed: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl TokenExchanger {
    pub fn new(settings: &SpotifySettings) -> Self {
        Self {
            creds: Credentials::new(&settings.client_id, &settings.client_secret),
            redirect_uri: settings.redirect_uri.clone(),
            config: settings.rspotify_config(),
            consumed: Mutex::new(HashMap::new()),
        }
    }

    fn client(&self, state: String) -> AuthCodeSpotify {
        let oauth = OAuth {
            redirect_uri: self.redirect_uri.clone(),
            scopes: SCOPES.iter().map(|s| s.to_string()).collect(),
            state,
            ..Default::default()
        };
        AuthCodeSpotify::with_config(self.creds.clone(), oauth, self.config.clone())
    }

    /// Builds the provider's authorize URL with a fresh state value.
    pub fn authorize(&self) -> Result<AuthorizeRequest, AuthError> {
        let state = generate_state();
        let url = self.client(state.clone()).get_authorize_url(false)?;
        Ok(AuthorizeRequest { url, state })
    }

    /// Terminal sign-in: opens (or prints) the authorize URL and reads the
    /// redirected URL back from stdin. rspotify checks the returned state.
    pub fn prompt_for_code(&self, request: &AuthorizeRequest) -> Result<String, AuthError> {
        self.client(request.state.clone())
            .get_code_from_user(&request.url)
            .map_err(|e| AuthError::Prompt(e.to_string()))
    }

    /// POSTs the code to the token endpoint. No retry: a failure means the
    /// whole authorization flow has to start over.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenPair, AuthError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AuthError::MissingCode);
        }

        let first_use = remember_code(
            &mut self.consumed.lock().unwrap_or_else(PoisonError::into_inner),
            code,
            Utc::now(),
        );
        if !first_use {
            return Err(AuthError::CodeReused);
        }

        debug!("Exchanging authorization code for tokens");
        let spotify = self.client(String::new());
        if let Err(err) = spotify.request_token(code).await {
            return Err(match status_and_body(err).await {
                Ok((status, body)) => {
                    error!("Token exchange error: {} {}", status, body);
                    AuthError::TokenExchange { status, body }
                }
                Err(other) => AuthError::Spotify(other),
            });
        }

        let token = spotify
            .token
            .lock()
            .await
            .map_err(|_| AuthError::TokenUnavailable)?
            .clone()
            .ok_or(AuthError::TokenUnavailable)?;

        let expires_in = u64::try_from(token.expires_in.num_seconds())
            .ok()
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);

        info!("Token exchange successful (expires in {}s)", expires_in);
        Ok(TokenPair {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_in,
            issued_at: Utc::now(),
        })
    }
}

/// Records `code` as submitted at `now` and forgets codes older than their
/// lifetime. Returns false when `code` was already submitted.
fn remember_code(
    consumed: &mut HashMap<String, DateTime<Utc>>,
    code: &str,
    now: DateTime<Utc>,
) -> bool {
    let cutoff = now - Duration::seconds(CODE_LIFETIME_SECS);
    consumed.retain(|_, submitted_at| *submitted_at > cutoff);
    if consumed.contains_key(code) {
        return false;
    }
    consumed.insert(code.to_string(), now);
    true
}
