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

use crate::models::{AnalyticsSnapshot, Session, TimeWindow, TokenPair, UserProfile};
use crate::spotify::{ApiError, ResourceApi, MAX_PAGE_SIZE};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Items requested per resource on every pass.
pub const PAGE_LIMIT: u32 = MAX_PAGE_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    TopTracks,
    TopArtists,
    RecentlyPlayed,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Resource::TopTracks => "top tracks",
            Resource::TopArtists => "top artists",
            Resource::RecentlyPlayed => "recently played",
        })
    }
}

#[derive(Error, Debug)]
pub enum AggregateError {
    #[error("Spotify session expired at {0}; please sign in again")]
    SessionExpired(DateTime<Utc>),
    #[error("Failed to fetch {resource}: {source}")]
    Fetch { resource: Resource, source: ApiError },
}

impl AggregateError {
    /// True when the only way forward is a new sign-in.
    pub fn needs_reauth(&self) -> bool {
        match self {
            AggregateError::SessionExpired(_) => true,
            AggregateError::Fetch { source, .. } => source.status() == Some(401),
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            AggregateError::SessionExpired(_) => {
                "Your Spotify session has expired. Please sign in again.".to_string()
            }
            AggregateError::Fetch { source, .. } => source.user_message(),
        }
    }
}

/// Builds one [`AnalyticsSnapshot`] from three concurrent fetches.
pub struct Aggregator<R> {
    api: R,
}

impl<R: ResourceApi> Aggregator<R> {
    pub fn new(api: R) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &R {
        &self.api
    }

    /// Fetches top tracks, top artists and recent plays at once and joins
    /// them. The first failure fails the whole pass; nothing fetched so far
    /// is returned.
    pub async fn aggregate(
        &self,
        token: &TokenPair,
        window: TimeWindow,
    ) -> Result<AnalyticsSnapshot, AggregateError> {
        if token.is_expired() {
            warn!("Refusing to aggregate with an expired access token");
            return Err(AggregateError::SessionExpired(token.expires_at()));
        }

        let access_token = token.access_token.as_str();
        debug!("Aggregating {} (limit {})", window, PAGE_LIMIT);

        let (top_tracks, top_artists, recently_played) = futures::try_join!(
            fetch(
                Resource::TopTracks,
                self.api.top_tracks(access_token, window, PAGE_LIMIT)
            ),
            fetch(
                Resource::TopArtists,
                self.api.top_artists(access_token, window, PAGE_LIMIT)
            ),
            fetch(
                Resource::RecentlyPlayed,
                self.api.recently_played(access_token, PAGE_LIMIT)
            ),
        )?;

        info!(
            "Aggregated {}: {} tracks, {} artists, {} recent plays",
            window,
            top_tracks.items.len(),
            top_artists.items.len(),
            recently_played.items.len()
        );

        Ok(AnalyticsSnapshot {
            top_tracks,
            top_artists,
            recently_played,
            time_window: window,
        })
    }
}

async fn fetch<T, F>(resource: Resource, request: F) -> Result<T, AggregateError>
where
    F: Future<Output = Result<T, ApiError>>,
{
    request.await.map_err(|source| {
        warn!("Fetching {} failed: {}", resource, source);
        AggregateError::Fetch { resource, source }
    })
}

/// Read-only view of the signed-in session handed to consumers.
#[derive(Debug, Clone)]
pub struct SessionContext(Arc<Session>);

impl SessionContext {
    pub fn session(&self) -> &Session {
        &self.0
    }

    pub fn token(&self) -> &TokenPair {
        &self.0.token
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        self.0.profile.as_ref()
    }
}

/// Outcome of a refresh that ran to completion.
#[derive(Debug, Clone)]
pub enum Publication {
    Published(Arc<AnalyticsSnapshot>),
    /// A newer pass started while this one was in flight; its result was dropped.
    Superseded { window: TimeWindow, generation: u64 },
}

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("Not signed in to Spotify")]
    SignedOut,
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

#[derive(Debug, Default)]
struct DashboardState {
    generation: u64,
    session: Option<SessionContext>,
    window: TimeWindow,
    snapshot: Option<Arc<AnalyticsSnapshot>>,
    last_error: Option<String>,
}

/// Single writer of the session and of the published snapshot.
///
/// Every pass takes a generation number when it starts. Its result is only
/// published if no other pass, sign-in or sign-out happened in the meantime,
/// so the newest request always wins and a snapshot never mixes windows.
pub struct SessionController<R> {
    aggregator: Aggregator<R>,
    state: Mutex<DashboardState>,
}

impl<R: ResourceApi> SessionController<R> {
    pub fn new(aggregator: Aggregator<R>) -> Self {
        Self {
            aggregator,
            state: Mutex::new(DashboardState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, DashboardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn aggregator(&self) -> &Aggregator<R> {
        &self.aggregator
    }

    pub fn sign_in(&self, session: Session) -> SessionContext {
        let context = SessionContext(Arc::new(session));
        let mut state = self.state();
        state.generation += 1;
        state.session = Some(context.clone());
        state.snapshot = None;
        state.last_error = None;
        context
    }

    pub fn sign_out(&self) {
        let mut state = self.state();
        state.generation += 1;
        state.session = None;
        state.snapshot = None;
        state.last_error = None;
    }

    pub fn context(&self) -> Option<SessionContext> {
        self.state().session.clone()
    }

    pub fn window(&self) -> TimeWindow {
        self.state().window
    }

    pub fn snapshot(&self) -> Option<Arc<AnalyticsSnapshot>> {
        self.state().snapshot.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.state().last_error.clone()
    }

    pub async fn select_window(&self, window: TimeWindow) -> Result<Publication, DashboardError> {
        self.state().window = window;
        self.refresh().await
    }

    /// Runs a pass for the current session and window.
    ///
    /// Superseded passes report [`Publication::Superseded`] whether they
    /// succeeded or failed, and leave the published state alone. A failed
    /// current pass clears the snapshot.
    pub async fn refresh(&self) -> Result<Publication, DashboardError> {
        let (generation, context, window) = {
            let mut state = self.state();
            let context = state.session.clone().ok_or(DashboardError::SignedOut)?;
            state.generation += 1;
            (state.generation, context, state.window)
        };

        let result = self.aggregator.aggregate(context.token(), window).await;

        let mut state = self.state();
        if state.generation != generation {
            debug!(
                "Discarding {} pass {} (current is {})",
                window, generation, state.generation
            );
            return Ok(Publication::Superseded { window, generation });
        }

        match result {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                state.snapshot = Some(Arc::clone(&snapshot));
                state.last_error = None;
                Ok(Publication::Published(snapshot))
            }
            Err(e) => {
                state.snapshot = None;
                state.last_error = Some(e.user_message());
                Err(e.into())
            }
        }
    }
}
