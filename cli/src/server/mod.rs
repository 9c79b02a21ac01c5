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

//! Local web surface: sign-in with Spotify, the dashboard API and AI insights.

mod cookies;
mod routes;
mod state;

use anyhow::Context;
use insights_core::session::primary_channel;
use insights_core::Settings;
use log::info;
use state::AppState;
use std::net::SocketAddr;
use tokio::net::TcpListener;

pub use routes::{routes, TOP_GENRES_SHOWN};

/// Serves the app on `bind` until the process is stopped.
pub async fn serve(settings: Settings, bind: SocketAddr) -> anyhow::Result<()> {
    let local = primary_channel(&settings.session_dir)
        .with_context(|| format!("Failed to open session in {}", settings.session_dir.display()))?;
    let state = AppState::new(settings, local);

    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind to {bind}"))?;
    info!("Listening on http://{}", listener.local_addr()?);
    println!("Open http://{}/login to sign in with Spotify.", listener.local_addr()?);

    axum::serve(listener, routes(state))
        .await
        .context("Server error")?;
    Ok(())
}
