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

mod render;
mod server;

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use insights_core::dashboard::{Aggregator, DashboardError, Publication, SessionController};
use insights_core::insights::InsightError;
use insights_core::session::local_channels;
use insights_core::{
    AnalyticsSnapshot, InsightGenerator, LocalChannel, ResourceApi, Session, SessionStore,
    Settings, SpotifyApi, TimeWindow, TokenExchanger,
};
use render::{format_duration, format_followers, insight_sections, played_ago, tier_label, InsightBlock};
use std::fs::File;
use std::io::Write;
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;

/// Rows printed per list in the terminal report.
const REPORT_ROWS: usize = 10;

#[derive(Parser)]
#[command(name = "spotify-insights")]
#[command(about = "Personal Spotify listening analytics with local AI summaries", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the local web app (sign-in, dashboard API, AI insights).
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:3000")]
        bind: SocketAddr,
    },
    /// Signs in with Spotify and stores the session locally.
    Login,
    /// Shows the signed-in Spotify profile.
    Whoami,
    /// Prints your top tracks, top artists, genres and recent plays.
    Dashboard {
        /// Time window: short (4 weeks), medium (6 months) or long (1 year)
        #[arg(long, short = 'w', default_value = "medium")]
        window: TimeWindow,

        /// Output the snapshot to a JSON file (e.g., --json=dashboard.json)
        #[arg(long)]
        json: Option<String>,
    },
    /// Generates a narrative about your listening with a local Ollama model.
    Insights {
        /// Time window: short (4 weeks), medium (6 months) or long (1 year)
        #[arg(long, short = 'w', default_value = "medium")]
        window: TimeWindow,
    },
    /// Removes the stored session.
    Logout,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    if dotenv().is_err() {
        // Silently ignore
    }

    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve { bind } => {
            handle_serve(*bind).await;
        }
        Commands::Login => {
            handle_login().await;
        }
        Commands::Whoami => {
            handle_whoami();
        }
        Commands::Dashboard { window, json } => {
            handle_dashboard(*window, json.as_deref()).await;
        }
        Commands::Insights { window } => {
            handle_insights(*window).await;
        }
        Commands::Logout => {
            handle_logout();
        }
    }
}

fn load_settings() -> Settings {
    match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            eprintln!("Copy .env.example to .env and fill in your Spotify app credentials.");
            process::exit(1);
        }
    }
}

fn open_store(settings: &Settings) -> SessionStore<LocalChannel, LocalChannel> {
    match local_channels(&settings.session_dir) {
        Ok((primary, secondary)) => SessionStore::new(primary, secondary),
        Err(e) => {
            eprintln!(
                "[ERROR] Failed to open session in {}: {}",
                settings.session_dir.display(),
                e
            );
            process::exit(1);
        }
    }
}

fn require_session(settings: &Settings) -> Session {
    match open_store(settings).load() {
        Some(session) => session,
        None => {
            eprintln!("Not signed in. Run 'spotify-insights login' first.");
            process::exit(1);
        }
    }
}

async fn fetch_snapshot(settings: &Settings, window: TimeWindow) -> Arc<AnalyticsSnapshot> {
    let session = require_session(settings);
    let controller = SessionController::new(Aggregator::new(SpotifyApi::new(&settings.spotify)));
    controller.sign_in(session);

    println!("Loading your listening data ({})...", window.label());

    match controller.select_window(window).await {
        Ok(Publication::Published(snapshot)) => snapshot,
        Ok(Publication::Superseded { .. }) => {
            eprintln!("[ERROR] The request was replaced by a newer one. Please try again.");
            process::exit(1);
        }
        Err(DashboardError::Aggregate(e)) => {
            eprintln!();
            eprintln!("[ERROR] {}", e.user_message());
            if e.needs_reauth() {
                eprintln!("Run 'spotify-insights login' to sign in again.");
            }
            process::exit(1);
        }
        Err(e) => {
            eprintln!();
            eprintln!("[ERROR] {}", e);
            process::exit(1);
        }
    }
}

async fn handle_serve(bind: SocketAddr) {
    let settings = load_settings();
    if let Err(e) = server::serve(settings, bind).await {
        eprintln!("[ERROR] {:#}", e);
        process::exit(1);
    }
}

async fn handle_login() {
    let settings = load_settings();
    let exchanger = TokenExchanger::new(&settings.spotify);

    let request = match exchanger.authorize() {
        Ok(request) => request,
        Err(e) => {
            eprintln!("[ERROR] Could not build the sign-in URL: {}", e);
            process::exit(1);
        }
    };

    println!("Opening the Spotify sign-in page...");
    println!("If no browser opens, visit: {}", request.url);

    let code = match exchanger.prompt_for_code(&request) {
        Ok(code) => code,
        Err(e) => {
            eprintln!();
            eprintln!("[ERROR] {}", e);
            process::exit(1);
        }
    };

    let token = match exchanger.exchange_code(&code).await {
        Ok(token) => token,
        Err(e) => {
            eprintln!();
            eprintln!("[ERROR] Sign-in failed: {}", e);
            eprintln!("Please start the sign-in again.");
            process::exit(1);
        }
    };

    let profile = match SpotifyApi::new(&settings.spotify)
        .current_user(&token.access_token)
        .await
    {
        Ok(profile) => profile,
        Err(e) => {
            eprintln!();
            eprintln!("[ERROR] Failed to load your profile: {}", e);
            process::exit(1);
        }
    };

    let mut store = open_store(&settings);
    if let Err(e) = store.save(&Session::new(token, profile.clone())) {
        eprintln!("[ERROR] Failed to save session: {}", e);
        process::exit(1);
    }

    println!();
    println!("[OK] Signed in as {} ({})", profile.name(), tier_label(&profile));
    println!("Session saved to: {}", settings.session_dir.display());
}

fn handle_whoami() {
    let settings = load_settings();
    let session = require_session(&settings);

    println!();
    println!("SPOTIFY PROFILE");
    println!("---------------------------------------------------");
    match &session.profile {
        Some(profile) => {
            println!("Name:          {}", profile.name());
            println!("User ID:       {}", profile.id);
            println!("Email:         {}", profile.email.as_deref().unwrap_or("-"));
            println!("Country:       {}", profile.country.as_deref().unwrap_or("-"));
            println!("Plan:          {}", tier_label(profile));
            println!("Followers:     {}", format_followers(profile.followers));
        }
        None => println!("(profile not available)"),
    }
    println!("---------------------------------------------------");
    let expires_at = session.token.expires_at().format("%Y-%m-%d %H:%M:%S UTC");
    if session.token.is_expired() {
        println!("Session:       expired at {} (run 'login' again)", expires_at);
    } else {
        println!("Session:       valid until {}", expires_at);
    }
}

async fn handle_dashboard(window: TimeWindow, json_path: Option<&str>) {
    let settings = load_settings();
    let snapshot = fetch_snapshot(&settings, window).await;
    let now = chrono::Utc::now();

    println!();
    println!("---------------------------------------------------");
    println!("LISTENING REPORT ({})", window.label());
    println!("---------------------------------------------------");

    println!();
    println!("TOP TRACKS");
    for (i, track) in snapshot.top_tracks.items.iter().take(REPORT_ROWS).enumerate() {
        println!(
            "{:>2}. {} ({})",
            i + 1,
            track,
            format_duration(track.duration_ms)
        );
    }

    println!();
    println!("TOP ARTISTS");
    for (i, artist) in snapshot.top_artists.items.iter().take(REPORT_ROWS).enumerate() {
        let genres = artist.genres.iter().take(2).cloned().collect::<Vec<_>>().join(", ");
        println!(
            "{:>2}. {:<30} {:>7} followers  {}",
            i + 1,
            artist.name,
            format_followers(artist.followers),
            genres
        );
    }

    println!();
    println!("TOP GENRES");
    let genres = snapshot.genre_distribution();
    if genres.is_empty() {
        println!("   (no genre data)");
    }
    for genre in genres.iter().take(server::TOP_GENRES_SHOWN) {
        println!("   {:<28} {:>3}%  ({} artists)", genre.genre, genre.percentage, genre.count);
    }

    println!();
    println!("RECENTLY PLAYED");
    for played in snapshot.recently_played.items.iter().take(REPORT_ROWS) {
        println!(
            "   {:<8} {} - {}",
            played_ago(played.played_at, now),
            played.track.name,
            played.track.artist_names()
        );
    }
    println!("---------------------------------------------------");

    if let Some(path) = json_path {
        match File::create(path) {
            Ok(mut file) => {
                let json_content = serde_json::to_string_pretty(&*snapshot).unwrap_or_default();
                if let Err(e) = file.write_all(json_content.as_bytes()) {
                    eprintln!();
                    eprintln!("[ERROR] Failed to write snapshot to file: {}", e);
                } else {
                    println!();
                    println!("[SAVED] Snapshot saved to: {}", path);
                }
            }
            Err(e) => eprintln!("[ERROR] Failed to create file '{}': {}", path, e),
        }
    }
}

async fn handle_insights(window: TimeWindow) {
    let settings = load_settings();
    let snapshot = fetch_snapshot(&settings, window).await;
    let generator = InsightGenerator::new(settings.ollama.clone());

    println!(
        "Generating insights with {} at {} (this can take a minute)...",
        generator.model(),
        generator.base_url()
    );

    match generator.generate(&snapshot).await {
        Ok(text) => {
            println!();
            println!("AI INSIGHTS ({})", window.label());
            println!("---------------------------------------------------");
            for block in insight_sections(&text) {
                match block {
                    InsightBlock::Heading(heading) => {
                        println!();
                        println!("{}", heading);
                    }
                    InsightBlock::Paragraph(paragraph) => println!("  {}", paragraph),
                }
            }
        }
        Err(InsightError::Unavailable { base_url, .. }) => {
            eprintln!();
            eprintln!(
                "[ERROR] Ollama service is not available at {}. Please make sure Ollama is running locally.",
                base_url
            );
            process::exit(1);
        }
        Err(e) => {
            eprintln!();
            eprintln!("[ERROR] Failed to generate AI insights: {}", e);
            process::exit(1);
        }
    }
}

fn handle_logout() {
    let settings = load_settings();
    let mut store = open_store(&settings);

    match store.clear() {
        Ok(()) => println!("[OK] Signed out. Local session removed."),
        Err(e) => {
            eprintln!("[ERROR] Failed to clear the session: {}", e);
            process::exit(1);
        }
    }
}
