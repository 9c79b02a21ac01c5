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

use insights_core::dashboard::{Aggregator, SessionController};
use insights_core::{InsightGenerator, LocalChannel, Settings, SpotifyApi, TokenExchanger};
use std::sync::Arc;

/// Shared handler state. The controller is the only writer of the
/// in-memory session; handlers read it through `SessionContext`s.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub exchanger: Arc<TokenExchanger>,
    pub controller: Arc<SessionController<SpotifyApi>>,
    pub insights: InsightGenerator,
    /// Primary session channel, shared with the terminal commands.
    pub local: LocalChannel,
}

impl AppState {
    pub fn new(settings: Settings, local: LocalChannel) -> Self {
        let exchanger = TokenExchanger::new(&settings.spotify);
        let api = SpotifyApi::new(&settings.spotify);
        let insights = InsightGenerator::new(settings.ollama.clone());

        Self {
            settings: Arc::new(settings),
            exchanger: Arc::new(exchanger),
            controller: Arc::new(SessionController::new(Aggregator::new(api))),
            insights,
            local,
        }
    }

    pub fn secure_cookies(&self) -> bool {
        self.settings.secure_cookies
    }

    pub fn app_url(&self) -> &str {
        &self.settings.app_url
    }
}
