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

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use insights_core::session::{SessionError, StorageChannel, Visibility, WritePolicy};
use time::{Duration, OffsetDateTime};

const STATE_COOKIE_NAME: &str = "spotify_auth_state";
const STATE_TTL_MINUTES: i64 = 10;

/// Browser cookies as a session channel.
///
/// Values are percent-encoded since profile JSON is not a valid cookie value.
/// Every expiry writes an explicit removal cookie, whether or not the
/// browser sent the cookie with this request.
pub struct CookieChannel {
    jar: CookieJar,
    secure: bool,
}

impl CookieChannel {
    pub fn new(jar: CookieJar, secure: bool) -> Self {
        Self { jar, secure }
    }

    pub fn into_jar(self) -> CookieJar {
        self.jar
    }
}

impl StorageChannel for CookieChannel {
    fn name(&self) -> &'static str {
        "cookie"
    }

    fn read(&self, key: &str) -> Option<String> {
        let cookie = self.jar.get(key)?;
        let value = urlencoding::decode(cookie.value()).ok()?.into_owned();
        (!value.is_empty()).then_some(value)
    }

    fn write(&mut self, key: &str, value: &str, policy: WritePolicy) -> Result<(), SessionError> {
        let mut cookie = Cookie::build((key.to_string(), urlencoding::encode(value).into_owned()))
            .http_only(policy.visibility == Visibility::HttpOnly)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .path("/".to_string());
        if let Some(max_age) = policy.max_age {
            cookie = cookie.max_age(Duration::seconds(max_age.num_seconds()));
        }
        self.jar = self.jar.clone().add(cookie.build());
        Ok(())
    }

    fn expire(&mut self, key: &str) -> Result<(), SessionError> {
        self.jar = self.jar.clone().add(removal_cookie(key));
        Ok(())
    }
}

fn removal_cookie(name: &str) -> Cookie<'static> {
    Cookie::build((name.to_string(), ""))
        .path("/".to_string())
        .max_age(Duration::ZERO)
        .expires(OffsetDateTime::UNIX_EPOCH)
        .build()
}

/// Cookie carrying the `state` sent to the authorize page.
pub fn state_cookie(state: &str, secure: bool) -> Cookie<'static> {
    Cookie::build((STATE_COOKIE_NAME, state.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/".to_string())
        .max_age(Duration::minutes(STATE_TTL_MINUTES))
        .build()
}

pub fn clear_state_cookie() -> Cookie<'static> {
    removal_cookie(STATE_COOKIE_NAME)
}

pub fn stored_state(jar: &CookieJar) -> Option<String> {
    jar.get(STATE_COOKIE_NAME)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}
