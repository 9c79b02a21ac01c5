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

use insights_core::config::SpotifySettings;
use insights_core::dashboard::Aggregator;
use insights_core::models::{Session, TimeWindow};
use insights_core::session::{LocalChannel, SessionStore};
use insights_core::{SpotifyApi, TokenExchanger};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings(server: &MockServer) -> SpotifySettings {
    SpotifySettings {
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        redirect_uri: "http://127.0.0.1:3000/api/auth/callback".to_string(),
        api_base_url: format!("{}/v1/", server.uri()),
        auth_base_url: format!("{}/", server.uri()),
    }
}

fn empty_page() -> serde_json::Value {
    json!({
        "href": "https://api.spotify.com/v1/me/top",
        "items": [],
        "limit": 50,
        "next": null,
        "offset": 0,
        "previous": null,
        "total": 0
    })
}

#[tokio::test]
async fn exchanged_token_is_loaded_back_and_usable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok1",
            "token_type": "Bearer",
            "scope": "user-top-read",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;
    for endpoint in ["/v1/me/top/tracks", "/v1/me/top/artists"] {
        Mock::given(method("GET"))
            .and(path(endpoint))
            .and(header("authorization", "Bearer tok1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(empty_page()))
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/v1/me/player/recently-played"))
        .and(header("authorization", "Bearer tok1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "href": "https://api.spotify.com/v1/me/player/recently-played",
            "items": [],
            "limit": 50,
            "next": null,
            "cursors": { "after": "1748802600000", "before": "1748802600000" },
            "total": 0
        })))
        .expect(1)
        .mount(&server)
        .await;

    let exchanger = TokenExchanger::new(&settings(&server));
    let token = exchanger.exchange_code("abc123").await.unwrap();
    assert_eq!(token.access_token, "tok1");
    assert_eq!(token.expires_in, 3600);

    let mut store = SessionStore::new(LocalChannel::in_memory(), LocalChannel::in_memory());
    store
        .save(&Session {
            token,
            profile: None,
        })
        .unwrap();

    let loaded = store.load().expect("session after save");
    assert_eq!(loaded.token.access_token, "tok1");
    assert_eq!(loaded.token.expires_in, 3600);
    assert!(loaded.token.refresh_token.is_none());
    assert!(!loaded.token.is_expired());

    let aggregator = Aggregator::new(SpotifyApi::new(&settings(&server)));
    let snapshot = aggregator
        .aggregate(&loaded.token, TimeWindow::Medium)
        .await
        .unwrap();
    assert!(snapshot.top_tracks.items.is_empty());
    assert_eq!(snapshot.time_window, TimeWindow::Medium);
}
