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

//! Plain-text presentation helpers for the terminal commands.

use chrono::{DateTime, Utc};
use insights_core::UserProfile;

/// Track length as `m:ss`.
pub fn format_duration(duration_ms: u64) -> String {
    let minutes = duration_ms / 60_000;
    let seconds = (duration_ms % 60_000) / 1000;
    format!("{}:{:02}", minutes, seconds)
}

/// How long ago a play happened, relative to `now`.
pub fn played_ago(played_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(played_at);
    let hours = elapsed.num_hours();
    if hours < 1 {
        format!("{}m ago", elapsed.num_minutes().max(0))
    } else if hours < 24 {
        format!("{}h ago", hours)
    } else {
        format!("{}d ago", hours / 24)
    }
}

pub fn format_followers(count: u32) -> String {
    if count >= 1_000_000 {
        format!("{:.1}M", f64::from(count) / 1_000_000.0)
    } else if count >= 1000 {
        format!("{:.1}K", f64::from(count) / 1000.0)
    } else {
        count.to_string()
    }
}

pub fn tier_label(profile: &UserProfile) -> &'static str {
    if profile.is_premium() {
        "Premium"
    } else {
        "Free"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsightBlock {
    Heading(String),
    Paragraph(String),
}

/// Splits the model's narrative into headings and paragraphs. A line is a
/// heading when it starts with a number followed by a dot, or when it is
/// short and contains a colon. Blank lines are dropped.
pub fn insight_sections(text: &str) -> Vec<InsightBlock> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let trimmed = line.trim().to_string();
            if is_numbered(line) || (line.contains(':') && line.chars().count() < 50) {
                InsightBlock::Heading(trimmed)
            } else {
                InsightBlock::Paragraph(trimmed)
            }
        })
        .collect()
}

fn is_numbered(line: &str) -> bool {
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    digits > 0 && line[digits..].starts_with('.')
}
