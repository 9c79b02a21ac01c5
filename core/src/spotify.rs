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
use crate::models::{
    Album, Artist, ArtistRef, Image, Page, PlayedTrack, RecentlyPlayed, TimeWindow, TopArtists,
    TopTracks, Track, UserProfile,
};
use async_trait::async_trait;
use log::{debug, warn};
use rspotify::{
    http::HttpError,
    model::{FullArtist, FullTrack, PlayHistory, PrivateUser},
    prelude::*,
    AuthCodeSpotify, ClientError, Credentials, OAuth, Token,
};
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;

/// Largest page the Web API hands out for the endpoints used here.
pub const MAX_PAGE_SIZE: u32 = 50;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Spotify API error: {status} {message}")]
    Status { status: u16, message: String },
    #[error("Spotify API request failed: {0}")]
    Transport(String),
    #[error("Unexpected Spotify response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Any failure here may mean the token is no longer accepted.
    pub fn user_message(&self) -> String {
        match self.status() {
            Some(401) => "Your Spotify session is no longer valid. Please sign in again.".to_string(),
            _ => format!("Could not load your Spotify data ({self}). Please try again."),
        }
    }
}

/// Authenticated reads against the Web API, one request per call.
///
/// Implementations neither retry, cache nor refresh tokens.
#[async_trait]
pub trait ResourceApi: Send + Sync {
    async fn current_user(&self, access_token: &str) -> Result<UserProfile, ApiError>;

    async fn top_tracks(
        &self,
        access_token: &str,
        window: TimeWindow,
        limit: u32,
    ) -> Result<TopTracks, ApiError>;

    async fn top_artists(
        &self,
        access_token: &str,
        window: TimeWindow,
        limit: u32,
    ) -> Result<TopArtists, ApiError>;

    async fn recently_played(&self, access_token: &str, limit: u32)
        -> Result<RecentlyPlayed, ApiError>;
}

/// `ResourceApi` backed by `rspotify`.
#[derive(Clone)]
pub struct SpotifyApi {
    config: rspotify::Config,
}

impl SpotifyApi {
    pub fn new(settings: &SpotifySettings) -> Self {
        Self {
            config: settings.rspotify_config(),
        }
    }

    /// Builds a client carrying `access_token` as its bearer credential.
    async fn client(&self, access_token: &str) -> Result<AuthCodeSpotify, ApiError> {
        let spotify =
            AuthCodeSpotify::with_config(Credentials::new("", ""), OAuth::default(), self.config.clone());

        let token = Token {
            access_token: access_token.to_string(),
            expires_in: chrono::Duration::seconds(0),
            expires_at: None,
            refresh_token: None,
            scopes: HashSet::new(),
        };
        *spotify
            .token
            .lock()
            .await
            .map_err(|_| ApiError::Transport("token lock poisoned".to_string()))? = Some(token);

        Ok(spotify)
    }
}

#[async_trait]
impl ResourceApi for SpotifyApi {
    async fn current_user(&self, access_token: &str) -> Result<UserProfile, ApiError> {
        debug!("Fetching current user profile");
        let spotify = self.client(access_token).await?;
        let user = resolve(spotify.current_user().await).await?;
        Ok(UserProfile::from(user))
    }

    async fn top_tracks(
        &self,
        access_token: &str,
        window: TimeWindow,
        limit: u32,
    ) -> Result<TopTracks, ApiError> {
        debug!("Fetching top tracks ({}, limit {})", window, limit);
        let spotify = self.client(access_token).await?;
        let page = resolve(
            spotify
                .current_user_top_tracks_manual(Some(window.into()), Some(limit), None)
                .await,
        )
        .await?;
        Ok(convert_page(page, Track::from))
    }

    async fn top_artists(
        &self,
        access_token: &str,
        window: TimeWindow,
        limit: u32,
    ) -> Result<TopArtists, ApiError> {
        debug!("Fetching top artists ({}, limit {})", window, limit);
        let spotify = self.client(access_token).await?;
        let page = resolve(
            spotify
                .current_user_top_artists_manual(Some(window.into()), Some(limit), None)
                .await,
        )
        .await?;
        Ok(convert_page(page, Artist::from))
    }

    async fn recently_played(
        &self,
        access_token: &str,
        limit: u32,
    ) -> Result<RecentlyPlayed, ApiError> {
        debug!("Fetching recently played (limit {})", limit);
        let spotify = self.client(access_token).await?;
        let page = resolve(spotify.current_user_recently_played(Some(limit), None).await).await?;
        Ok(RecentlyPlayed {
            items: page.items.into_iter().map(PlayedTrack::from).collect(),
            limit: page.limit,
            next: page.next,
            total: page.total,
        })
    }
}

/// Splits an HTTP status failure out of an `rspotify` error, reading the
/// response body. Any other error is handed back untouched.
pub(crate) async fn status_and_body(err: ClientError) -> Result<(u16, String), ClientError> {
    match err {
        ClientError::Http(http) => match *http {
            HttpError::StatusCode(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                Ok((status, body))
            }
            other => Err(ClientError::Http(Box::new(other))),
        },
        other => Err(other),
    }
}

async fn resolve<T>(result: Result<T, ClientError>) -> Result<T, ApiError> {
    match result {
        Ok(value) => Ok(value),
        Err(err) => Err(match status_and_body(err).await {
            Ok((status, body)) => {
                warn!("Spotify API error: {} {}", status, body);
                ApiError::Status {
                    status,
                    message: error_message(&body),
                }
            }
            Err(ClientError::ParseJson(e)) => ApiError::Decode(e.to_string()),
            Err(other) => ApiError::Transport(other.to_string()),
        }),
    }
}

/// Web API errors look like `{"error": {"status": 401, "message": "..."}}`.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

fn convert_page<S, T>(page: rspotify::model::Page<S>, f: impl FnMut(S) -> T) -> Page<T> {
    Page {
        items: page.items.into_iter().map(f).collect(),
        total: page.total,
        limit: page.limit,
        offset: page.offset,
        next: page.next,
        previous: page.previous,
    }
}

// Enum-valued model fields (country, product tier) as their wire strings.
fn wire_name<T: Serialize>(value: &T) -> Option<String> {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
}

fn convert_images(images: Vec<rspotify::model::Image>) -> Vec<Image> {
    images
        .into_iter()
        .map(|i| Image {
            url: i.url,
            height: i.height,
            width: i.width,
        })
        .collect()
}

impl From<PrivateUser> for UserProfile {
    fn from(user: PrivateUser) -> Self {
        Self {
            id: user.id.id().to_string(),
            display_name: user.display_name,
            email: user.email,
            images: convert_images(user.images.unwrap_or_default()),
            followers: user.followers.map(|f| f.total).unwrap_or_default(),
            country: user.country.as_ref().and_then(wire_name),
            product: user.product.as_ref().and_then(wire_name),
        }
    }
}

impl From<FullTrack> for Track {
    fn from(track: FullTrack) -> Self {
        Self {
            id: track.id.as_ref().map(|id| id.id().to_string()),
            name: track.name,
            artists: track
                .artists
                .into_iter()
                .map(|a| ArtistRef {
                    id: a.id.as_ref().map(|id| id.id().to_string()),
                    name: a.name,
                })
                .collect(),
            album: Album {
                id: track.album.id.as_ref().map(|id| id.id().to_string()),
                name: track.album.name,
                images: convert_images(track.album.images),
                release_date: track.album.release_date,
            },
            duration_ms: u64::try_from(track.duration.num_milliseconds()).unwrap_or_default(),
            popularity: track.popularity,
            preview_url: track.preview_url,
            external_url: track.external_urls.get("spotify").cloned(),
        }
    }
}

impl From<FullArtist> for Artist {
    fn from(artist: FullArtist) -> Self {
        Self {
            id: artist.id.id().to_string(),
            name: artist.name,
            genres: artist.genres,
            images: convert_images(artist.images),
            followers: artist.followers.total,
            popularity: artist.popularity,
            external_url: artist.external_urls.get("spotify").cloned(),
        }
    }
}

impl From<PlayHistory> for PlayedTrack {
    fn from(item: PlayHistory) -> Self {
        Self {
            track: Track::from(item.track),
            played_at: item.played_at,
            context_uri: item.context.map(|c| c.uri),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde_json::{json, Value};

    pub fn track(id: &str, name: &str, artist: &str) -> Value {
        json!({
            "album": {
                "album_type": "album",
                "artists": [artist_ref(artist)],
                "available_markets": ["US"],
                "external_urls": { "spotify": format!("https://open.spotify.com/album/{id}") },
                "href": format!("https://api.spotify.com/v1/albums/{id}"),
                "id": id,
                "images": [{ "height": 640, "url": "https://i.scdn.co/image/cover", "width": 640 }],
                "name": format!("{name} (Album)"),
                "release_date": "2021-03-05",
                "release_date_precision": "day",
                "total_tracks": 10,
                "type": "album",
                "uri": format!("spotify:album:{id}")
            },
            "artists": [artist_ref(artist)],
            "available_markets": ["US"],
            "disc_number": 1,
            "duration_ms": 215000,
            "explicit": false,
            "external_ids": { "isrc": "USUM72100001" },
            "external_urls": { "spotify": format!("https://open.spotify.com/track/{id}") },
            "href": format!("https://api.spotify.com/v1/tracks/{id}"),
            "id": id,
            "is_local": false,
            "name": name,
            "popularity": 71,
            "preview_url": null,
            "track_number": 1,
            "type": "track",
            "uri": format!("spotify:track:{id}")
        })
    }

    fn artist_ref(name: &str) -> Value {
        let id = artist_id(name);
        json!({
            "external_urls": { "spotify": format!("https://open.spotify.com/artist/{id}") },
            "href": format!("https://api.spotify.com/v1/artists/{id}"),
            "id": id,
            "name": name,
            "type": "artist",
            "uri": format!("spotify:artist:{id}")
        })
    }

    fn artist_id(name: &str) -> String {
        name.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
    }

    pub fn artist(name: &str, genres: &[&str]) -> Value {
        let id = artist_id(name);
        json!({
            "external_urls": { "spotify": format!("https://open.spotify.com/artist/{id}") },
            "followers": { "href": null, "total": 12500 },
            "genres": genres,
            "href": format!("https://api.spotify.com/v1/artists/{id}"),
            "id": id,
            "images": [],
            "name": name,
            "popularity": 64,
            "type": "artist",
            "uri": format!("spotify:artist:{id}")
        })
    }

    pub fn page(items: Vec<Value>, href: &str) -> Value {
        json!({
            "href": href,
            "items": items,
            "limit": 50,
            "next": null,
            "offset": 0,
            "previous": null,
            "total": items.len()
        })
    }

    pub fn recently_played(tracks: Vec<Value>) -> Value {
        let items: Vec<Value> = tracks
            .into_iter()
            .map(|track| {
                json!({
                    "track": track,
                    "played_at": "2025-06-01T18:30:00.000Z",
                    "context": null
                })
            })
            .collect();
        json!({
            "href": "https://api.spotify.com/v1/me/player/recently-played?limit=50",
            "items": items,
            "limit": 50,
            "next": null,
            "cursors": { "after": "1748802600000", "before": "1748802600000" },
            "total": items.len()
        })
    }

    pub fn user(id: &str, display_name: &str) -> Value {
        json!({
            "country": "US",
            "display_name": display_name,
            "email": format!("{id}@example.com"),
            "explicit_content": { "filter_enabled": false, "filter_locked": false },
            "external_urls": { "spotify": format!("https://open.spotify.com/user/{id}") },
            "followers": { "href": null, "total": 42 },
            "href": format!("https://api.spotify.com/v1/users/{id}"),
            "id": id,
            "images": [],
            "product": "premium",
            "type": "user",
            "uri": format!("spotify:user:{id}")
        })
    }
}
