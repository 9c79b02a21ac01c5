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

pub mod auth;
pub mod config;
pub mod dashboard;
pub mod insights;
pub mod models;
pub mod session;
pub mod spotify;

// Re-export key items for convenience
pub use auth::{AuthError, TokenExchanger};
pub use config::Settings;
pub use dashboard::{Aggregator, Publication, SessionController};
pub use insights::InsightGenerator;
pub use models::{AnalyticsSnapshot, Session, TimeWindow, TokenPair, UserProfile};
pub use session::{LocalChannel, SessionStore, StorageChannel};
pub use spotify::{ResourceApi, SpotifyApi};
