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

use crate::config::OllamaSettings;
use crate::models::AnalyticsSnapshot;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How many tracks, artists and genres the prompt mentions.
pub const PROMPT_ITEMS: usize = 10;

#[derive(Error, Debug)]
pub enum InsightError {
    #[error("Ollama service is not available at {base_url}: {reason}")]
    Unavailable { base_url: String, reason: String },
    #[error("Cannot connect to Ollama. Please make sure Ollama is running locally on {base_url}")]
    NotRunning { base_url: String },
    #[error("Ollama API error: {status} - {body}")]
    Generation { status: u16, body: String },
    #[error("Unexpected Ollama response: {0}")]
    Decode(String),
}

/// Fixed sampling parameters sent with every generation request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub repeat_penalty: f32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1000,
            top_p: 0.9,
            repeat_penalty: 1.1,
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerationOptions,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

/// Client for a local Ollama server.
#[derive(Clone)]
pub struct InsightGenerator {
    client: reqwest::Client,
    settings: OllamaSettings,
    options: GenerationOptions,
}

impl InsightGenerator {
    pub fn new(settings: OllamaSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
            options: GenerationOptions::default(),
        }
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    pub fn base_url(&self) -> &str {
        &self.settings.base_url
    }

    fn unavailable(&self, reason: impl Into<String>) -> InsightError {
        InsightError::Unavailable {
            base_url: self.settings.base_url.clone(),
            reason: reason.into(),
        }
    }

    /// Health check: `GET /api/tags`. Returns the installed model names.
    pub async fn check_health(&self) -> Result<Vec<String>, InsightError> {
        debug!("Checking Ollama health at {}", self.settings.base_url);
        let response = self
            .client
            .get(format!("{}/api/tags", self.settings.base_url))
            .send()
            .await
            .map_err(|e| {
                warn!("Ollama health check error: {}", e);
                self.unavailable(e.to_string())
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            warn!("Ollama health check failed: {}", status);
            return Err(self.unavailable(format!("health check returned {status}")));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| self.unavailable(format!("unreadable model list: {e}")))?;
        let models: Vec<String> = tags.models.into_iter().map(|m| m.name).collect();

        if models.is_empty() {
            info!("Ollama is healthy, available models: none");
        } else {
            info!("Ollama is healthy, available models: {}", models.join(", "));
        }
        Ok(models)
    }

    /// Checks the server, then asks for a single non-streaming completion.
    /// The generation endpoint is never called when the health check fails.
    pub async fn generate(&self, snapshot: &AnalyticsSnapshot) -> Result<String, InsightError> {
        self.check_health().await?;

        let prompt = build_prompt(snapshot);
        info!(
            "Generating insights with model {} ({} window)",
            self.settings.model, snapshot.time_window
        );

        let response = self
            .client
            .post(format!("{}/api/generate", self.settings.base_url))
            .json(&GenerateRequest {
                model: &self.settings.model,
                prompt: &prompt,
                stream: false,
                options: self.options,
            })
            .send()
            .await
            .map_err(|e| {
                error!("Error generating AI insights: {}", e);
                InsightError::NotRunning {
                    base_url: self.settings.base_url.clone(),
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            error!("Ollama API error: {} {}", status, body);
            return Err(InsightError::Generation { status, body });
        }

        let payload: GenerateResponse = response
            .json()
            .await
            .map_err(|e| InsightError::Decode(e.to_string()))?;
        debug!("Ollama response received ({} chars)", payload.response.len());
        Ok(payload.response)
    }
}

/// Builds the analysis prompt for `snapshot`.
pub fn build_prompt(snapshot: &AnalyticsSnapshot) -> String {
    let tracks = snapshot
        .top_tracks
        .items
        .iter()
        .take(PROMPT_ITEMS)
        .enumerate()
        .map(|(i, track)| format!("{}. \"{}\" by {}", i + 1, track.name, track.artist_names()))
        .collect::<Vec<String>>()
        .join("\n");

    let artists = snapshot
        .top_artists
        .items
        .iter()
        .take(PROMPT_ITEMS)
        .enumerate()
        .map(|(i, artist)| {
            let genres: Vec<&str> = artist.genres.iter().take(2).map(String::as_str).collect();
            format!("{}. {} ({})", i + 1, artist.name, genres.join(", "))
        })
        .collect::<Vec<String>>()
        .join("\n");

    let mut genres: Vec<&str> = Vec::new();
    for genre in snapshot.top_artists.items.iter().flat_map(|a| a.genres.iter()) {
        if genres.len() == PROMPT_ITEMS {
            break;
        }
        if !genres.contains(&genre.as_str()) {
            genres.push(genre);
        }
    }

    format!(
        "You are a music analyst and AI assistant. Analyze this Spotify user's music taste \
based on their listening data from the {period}:

TOP TRACKS:
{tracks}

TOP ARTISTS:
{artists}

TOP GENRES:
{genres}

Please provide a comprehensive analysis including:
1. Music taste profile and personality insights
2. Genre evolution and trends
3. Mood and energy patterns
4. Listening habits analysis
5. 3-5 personalized music recommendations (artists or genres they might enjoy)

Keep the response engaging, insightful, and under 500 words. Format it in a way that's easy \
to read with clear sections. Be conversational and friendly in your tone.",
        period = snapshot.time_window.period_phrase(),
        genres = genres.join(", "),
    )
}
