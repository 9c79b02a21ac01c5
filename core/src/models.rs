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

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lifetime assumed when a token's lifetime is unknown, in seconds.
pub const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

/// Look-back period for "top" analytics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeWindow {
    #[serde(rename = "short_term")]
    Short,
    #[default]
    #[serde(rename = "medium_term")]
    Medium,
    #[serde(rename = "long_term")]
    Long,
}

impl TimeWindow {
    pub const ALL: [TimeWindow; 3] = [TimeWindow::Short, TimeWindow::Medium, TimeWindow::Long];

    /// Wire value used by the Web API `time_range` parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeWindow::Short => "short_term",
            TimeWindow::Medium => "medium_term",
            TimeWindow::Long => "long_term",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TimeWindow::Short => "4 Weeks",
            TimeWindow::Medium => "6 Months",
            TimeWindow::Long => "1 Year",
        }
    }

    /// Phrase used when describing the window in prose ("over the past 4 weeks").
    pub fn period_phrase(&self) -> &'static str {
        match self {
            TimeWindow::Short => "past 4 weeks",
            TimeWindow::Medium => "past 6 months",
            TimeWindow::Long => "past year",
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Unknown time window '{0}' (expected short, medium or long)")]
pub struct ParseWindowError(String);

impl FromStr for TimeWindow {
    type Err = ParseWindowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "short" | "short_term" => Ok(TimeWindow::Short),
            "medium" | "medium_term" => Ok(TimeWindow::Medium),
            "long" | "long_term" => Ok(TimeWindow::Long),
            _ => Err(ParseWindowError(s.to_string())),
        }
    }
}

impl From<TimeWindow> for rspotify::model::TimeRange {
    fn from(window: TimeWindow) -> Self {
        match window {
            TimeWindow::Short => rspotify::model::TimeRange::ShortTerm,
            TimeWindow::Medium => rspotify::model::TimeRange::MediumTerm,
            TimeWindow::Long => rspotify::model::TimeRange::LongTerm,
        }
    }
}

/// Access/refresh token pair returned by the token endpoint.
///
/// The access token is only valid until `issued_at + expires_in`; every
/// consumer goes through [`TokenPair::is_expired_at`] rather than trusting a
/// token indefinitely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_in: u64,
    pub issued_at: DateTime<Utc>,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, expires_in: u64, issued_at: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_in,
            issued_at,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// A token whose timing is unknown. It is already expired.
    pub fn without_expiry(access_token: impl Into<String>) -> Self {
        let epoch = DateTime::<Utc>::from_timestamp(0, 0).unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self::new(access_token, 0, epoch)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        let lifetime = i64::try_from(self.expires_in).unwrap_or(i64::MAX);
        self.issued_at
            .checked_add_signed(Duration::seconds(lifetime.min(i64::MAX / 1000)))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub url: String,
    pub height: Option<u32>,
    pub width: Option<u32>,
}

/// Snapshot of the signed-in account, fetched once per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub followers: u32,
    pub country: Option<String>,
    pub product: Option<String>,
}

impl UserProfile {
    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }

    pub fn is_premium(&self) -> bool {
        self.product.as_deref() == Some("premium")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistRef {
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub images: Vec<Image>,
    pub release_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: Option<String>,
    pub name: String,
    pub artists: Vec<ArtistRef>,
    pub album: Album,
    pub duration_ms: u64,
    pub popularity: u32,
    pub preview_url: Option<String>,
    pub external_url: Option<String>,
}

impl Track {
    pub fn artist_names(&self) -> String {
        self.artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<&str>>()
            .join(", ")
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} ({})", self.name, self.artist_names(), self.album.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub images: Vec<Image>,
    pub followers: u32,
    pub popularity: u32,
    pub external_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayedTrack {
    pub track: Track,
    pub played_at: DateTime<Utc>,
    pub context_uri: Option<String>,
}

/// One offset-paginated page. Only the first page is ever fetched; the
/// cursors are carried for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u32,
    pub limit: u32,
    pub offset: u32,
    pub next: Option<String>,
    pub previous: Option<String>,
}

impl<T> Page<T> {
    pub fn single(items: Vec<T>) -> Self {
        let len = u32::try_from(items.len()).unwrap_or(u32::MAX);
        Self {
            items,
            total: len,
            limit: len,
            offset: 0,
            next: None,
            previous: None,
        }
    }
}

pub type TopTracks = Page<Track>;
pub type TopArtists = Page<Artist>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentlyPlayed {
    pub items: Vec<PlayedTrack>,
    pub limit: u32,
    pub next: Option<String>,
    pub total: Option<u32>,
}

/// How many artists among the top artists carry a genre.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenreCount {
    pub genre: String,
    pub count: usize,
    /// Share of the artist list, rounded to a whole percent.
    pub percentage: u32,
}

/// Counts genres across `artists`, most common first. Ties keep the order in
/// which the genres were first seen.
pub fn genre_distribution(artists: &[Artist]) -> Vec<GenreCount> {
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();

    for genre in artists.iter().flat_map(|a| a.genres.iter()) {
        let count = counts.entry(genre.as_str()).or_insert_with(|| {
            order.push(genre.as_str());
            0
        });
        *count += 1;
    }

    let mut distribution: Vec<GenreCount> = order
        .into_iter()
        .map(|genre| {
            let count = counts[genre];
            GenreCount {
                genre: genre.to_string(),
                count,
                percentage: ((count as f64 / artists.len() as f64) * 100.0).round() as u32,
            }
        })
        .collect();

    // sort_by is stable, so equal counts stay in first-seen order.
    distribution.sort_by(|a, b| b.count.cmp(&a.count));
    distribution
}

/// Result of one aggregation pass. Never mutated; a new window produces a new
/// snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSnapshot {
    pub top_tracks: TopTracks,
    pub top_artists: TopArtists,
    pub recently_played: RecentlyPlayed,
    #[serde(rename = "timeRange")]
    pub time_window: TimeWindow,
}

impl AnalyticsSnapshot {
    pub fn genre_distribution(&self) -> Vec<GenreCount> {
        genre_distribution(&self.top_artists.items)
    }
}

/// Tokens plus the cached profile, persisted across page loads.
///
/// The profile is optional because a stored token can outlive a profile
/// record that failed to decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: TokenPair,
    pub profile: Option<UserProfile>,
}

impl Session {
    pub fn new(token: TokenPair, profile: UserProfile) -> Self {
        Self {
            token,
            profile: Some(profile),
        }
    }
}
