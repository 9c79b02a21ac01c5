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

use super::cookies::{self, CookieChannel};
use super::state::AppState;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::cookie::CookieJar;
use insights_core::dashboard::{DashboardError, Publication};
use insights_core::insights::InsightError;
use insights_core::models::{AnalyticsSnapshot, GenreCount, Session, TimeWindow};
use insights_core::session::SessionStore;
use insights_core::{LocalChannel, ResourceApi};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Genres listed on the dashboard.
pub const TOP_GENRES_SHOWN: usize = 15;

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/spotify/auth-url", get(auth_url))
        .route("/login", get(login))
        .route("/api/auth/callback", get(callback))
        .route("/api/session", get(session))
        .route("/api/dashboard", get(dashboard))
        .route("/api/ai-insights", post(ai_insights))
        .route("/api/logout", get(logout).post(logout))
        .with_state(state)
}

// ── Sign-in ────────────────────────────────────────────────────────

async fn auth_url(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<serde_json::Value>), Response> {
    let request = state.exchanger.authorize().map_err(|e| {
        error!("Error generating auth URL: {}", e);
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to generate auth URL")
    })?;

    let jar = jar.add(cookies::state_cookie(&request.state, state.secure_cookies()));
    Ok((jar, Json(json!({ "authUrl": request.url }))))
}

async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), Response> {
    let request = state.exchanger.authorize().map_err(|e| {
        error!("Error generating auth URL: {}", e);
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to generate auth URL")
    })?;

    let jar = jar.add(cookies::state_cookie(&request.state, state.secure_cookies()));
    Ok((jar, Redirect::to(&request.url)))
}

#[derive(Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

async fn callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<(CookieJar, Redirect), Response> {
    let app_url = state.app_url();

    if let Some(error) = &params.error {
        warn!("Spotify auth error: {}", error);
        let mut store = session_store(&state, jar);
        if let Err(e) = store.clear() {
            warn!("Session clear failed after auth error: {}", e);
        }
        state.controller.sign_out();
        let (_, browser) = store.into_channels();
        return Err((browser.into_jar(), login_error(app_url, "access_denied")).into_response());
    }

    let code = params
        .code
        .filter(|code| !code.is_empty())
        .ok_or_else(|| login_error(app_url, "no_code"))?;

    let expected = cookies::stored_state(&jar);
    if expected.is_none() || params.state != expected {
        warn!("OAuth state mismatch");
        return Err(login_error(app_url, "state_mismatch"));
    }

    let token = state.exchanger.exchange_code(&code).await.map_err(|e| {
        error!("Token exchange error: {}", e);
        login_error(app_url, e.redirect_code())
    })?;

    let profile = state
        .controller
        .aggregator()
        .api()
        .current_user(&token.access_token)
        .await
        .map_err(|e| {
            error!("Failed to fetch user profile: {}", e);
            login_error(app_url, "token_exchange_failed")
        })?;

    let session = Session::new(token, profile);
    let mut store = session_store(&state, jar);
    store.save(&session).map_err(|e| {
        error!("Failed to save session: {}", e);
        login_error(app_url, "token_exchange_failed")
    })?;

    info!(
        "Signed in as {}",
        session.profile.as_ref().map_or("unknown user", |p| p.name())
    );
    state.controller.sign_in(session);

    let (_, browser) = store.into_channels();
    let jar = browser.into_jar().add(cookies::clear_state_cookie());
    Ok((jar, Redirect::to(app_url)))
}

// ── Session & dashboard ───────────────────────────────────────────

async fn session(State(state): State<AppState>, jar: CookieJar) -> Json<serde_json::Value> {
    match session_store(&state, jar).load() {
        Some(session) => Json(json!({
            "authenticated": !session.token.is_expired(),
            "expired": session.token.is_expired(),
            "expiresAt": session.token.expires_at(),
            "user": session.profile,
        })),
        None => Json(json!({ "authenticated": false, "user": null })),
    }
}

#[derive(Deserialize)]
struct DashboardParams {
    time_range: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DashboardBody<'a> {
    #[serde(flatten)]
    snapshot: &'a AnalyticsSnapshot,
    time_range_label: &'static str,
    top_genres: Vec<GenreCount>,
}

async fn dashboard(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<DashboardParams>,
) -> Response {
    let window = match params.time_range.as_deref().map(str::parse::<TimeWindow>) {
        None => TimeWindow::default(),
        Some(Ok(window)) => window,
        Some(Err(e)) => return json_error(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    let Some(session) = session_store(&state, jar).load() else {
        return json_error(StatusCode::UNAUTHORIZED, "Not signed in to Spotify");
    };

    let known = state
        .controller
        .context()
        .is_some_and(|current| current.token().access_token == session.token.access_token);
    if !known {
        state.controller.sign_in(session);
    }

    match state.controller.select_window(window).await {
        Ok(Publication::Published(snapshot)) => Json(DashboardBody {
            snapshot: snapshot.as_ref(),
            time_range_label: snapshot.time_window.label(),
            top_genres: snapshot
                .genre_distribution()
                .into_iter()
                .take(TOP_GENRES_SHOWN)
                .collect(),
        })
        .into_response(),
        Ok(Publication::Superseded { window, .. }) => json_error(
            StatusCode::CONFLICT,
            &format!("The {} request was replaced by a newer one", window.label()),
        ),
        Err(DashboardError::SignedOut) => {
            json_error(StatusCode::UNAUTHORIZED, "Not signed in to Spotify")
        }
        Err(DashboardError::Aggregate(e)) if e.needs_reauth() => {
            json_error(StatusCode::UNAUTHORIZED, &e.user_message())
        }
        Err(DashboardError::Aggregate(e)) => json_error(StatusCode::BAD_GATEWAY, &e.user_message()),
    }
}

// ── AI insights ────────────────────────────────────────────────────

async fn ai_insights(
    State(state): State<AppState>,
    Json(snapshot): Json<AnalyticsSnapshot>,
) -> Response {
    match state.insights.generate(&snapshot).await {
        Ok(insights) => Json(json!({ "insights": insights })).into_response(),
        Err(InsightError::Unavailable { .. }) => json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Ollama service is not available. Please make sure Ollama is running locally.",
        ),
        Err(e) => {
            error!("Error generating AI insights: {}", e);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to generate AI insights")
        }
    }
}

// ── Logout ─────────────────────────────────────────────────────────

async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Redirect) {
    let mut store = session_store(&state, jar);
    if let Err(e) = store.clear() {
        warn!("Session clear failed during logout: {}", e);
    }
    state.controller.sign_out();
    info!("Signed out");

    let (_, browser) = store.into_channels();
    (browser.into_jar(), Redirect::to(state.app_url()))
}

// ── Helpers ────────────────────────────────────────────────────────

fn session_store(state: &AppState, jar: CookieJar) -> SessionStore<LocalChannel, CookieChannel> {
    SessionStore::new(
        state.local.clone(),
        CookieChannel::new(jar, state.secure_cookies()),
    )
}

fn login_error(app_url: &str, code: &str) -> Response {
    let encoded = urlencoding::encode(code);
    Redirect::to(&format!("{app_url}?error={encoded}")).into_response()
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use insights_core::config::{OllamaSettings, Settings, SpotifySettings};
    use insights_core::models::{Page, RecentlyPlayed, TokenPair, UserProfile};
    use insights_core::session::{StorageChannel, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY};
    use reqwest::header::{COOKIE, LOCATION, SET_COOKIE};
    use serde_json::Value;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(spotify: &MockServer, ollama_url: String) -> Settings {
        Settings {
            spotify: SpotifySettings {
                client_id: "client".to_string(),
                client_secret: "secret".to_string(),
                redirect_uri: "http://127.0.0.1:3000/api/auth/callback".to_string(),
                api_base_url: format!("{}/v1/", spotify.uri()),
                auth_base_url: format!("{}/", spotify.uri()),
            },
            ollama: OllamaSettings {
                base_url: ollama_url,
                model: "llama3:latest".to_string(),
            },
            session_dir: std::env::temp_dir(),
            app_url: "/".to_string(),
            secure_cookies: false,
        }
    }

    async fn spawn(state: AppState) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, routes(state)).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client() -> reqwest::Client {
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap()
    }

    fn set_cookies(response: &reqwest::Response) -> Vec<String> {
        response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect()
    }

    fn set_cookie<'a>(cookies: &'a [String], name: &str) -> &'a str {
        cookies
            .iter()
            .find(|c| c.starts_with(&format!("{name}=")))
            .unwrap_or_else(|| panic!("no Set-Cookie for {name} in {cookies:?}"))
    }

    fn location(response: &reqwest::Response) -> String {
        response.headers()[LOCATION].to_str().unwrap().to_string()
    }

    fn profile() -> UserProfile {
        UserProfile {
            id: "ada".to_string(),
            display_name: Some("Ada".to_string()),
            email: None,
            images: vec![],
            followers: 0,
            country: None,
            product: Some("free".to_string()),
        }
    }

    fn signed_in_local() -> LocalChannel {
        let local = LocalChannel::in_memory();
        SessionStore::new(local.clone(), LocalChannel::in_memory())
            .save(&Session::new(TokenPair::new("tok1", 3600, Utc::now()), profile()))
            .unwrap();
        local
    }

    fn empty_page() -> Value {
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

    fn empty_recent() -> Value {
        json!({
            "href": "https://api.spotify.com/v1/me/player/recently-played",
            "items": [],
            "limit": 50,
            "next": null,
            "cursors": { "after": "1748802600000", "before": "1748802600000" },
            "total": 0
        })
    }

    fn artist_page() -> Value {
        json!({
            "href": "https://api.spotify.com/v1/me/top/artists",
            "items": [{
                "external_urls": { "spotify": "https://open.spotify.com/artist/56ZTgzPBDge0OvCGgMO3OY" },
                "followers": { "href": null, "total": 3000000 },
                "genres": ["dream pop", "indie"],
                "href": "https://api.spotify.com/v1/artists/56ZTgzPBDge0OvCGgMO3OY",
                "id": "56ZTgzPBDge0OvCGgMO3OY",
                "images": [],
                "name": "Beach House",
                "popularity": 70,
                "type": "artist",
                "uri": "spotify:artist:56ZTgzPBDge0OvCGgMO3OY"
            }],
            "limit": 50,
            "next": null,
            "offset": 0,
            "previous": null,
            "total": 1
        })
    }

    fn user_json() -> Value {
        json!({
            "country": "US",
            "display_name": "Ada Lovelace",
            "email": "ada@example.com",
            "explicit_content": { "filter_enabled": false, "filter_locked": false },
            "external_urls": { "spotify": "https://open.spotify.com/user/ada" },
            "followers": { "href": null, "total": 42 },
            "href": "https://api.spotify.com/v1/users/ada",
            "id": "ada",
            "images": [],
            "product": "premium",
            "type": "user",
            "uri": "spotify:user:ada"
        })
    }

    fn empty_snapshot() -> AnalyticsSnapshot {
        AnalyticsSnapshot {
            top_tracks: Page::single(vec![]),
            top_artists: Page::single(vec![]),
            recently_played: RecentlyPlayed {
                items: vec![],
                limit: 50,
                next: None,
                total: None,
            },
            time_window: TimeWindow::Medium,
        }
    }

    #[tokio::test]
    async fn test_callback_error_clears_existing_session() {
        let spotify = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&spotify)
            .await;
        let local = signed_in_local();
        let base = spawn(AppState::new(settings(&spotify, spotify.uri()), local.clone())).await;

        let response = client()
            .get(format!("{base}/api/auth/callback?error=access_denied"))
            .header(COOKIE, "spotify_access_token=tok1; spotify_refresh_token=ref1")
            .send()
            .await
            .unwrap();

        assert!(response.status().is_redirection());
        assert_eq!(location(&response), "/?error=access_denied");
        let cookies = set_cookies(&response);
        assert!(set_cookie(&cookies, "spotify_access_token").contains("Max-Age=0"));
        assert!(set_cookie(&cookies, "spotify_refresh_token").contains("Max-Age=0"));
        assert!(local.read(ACCESS_TOKEN_KEY).is_none());
        assert!(local.read(USER_KEY).is_none());
    }

    #[tokio::test]
    async fn test_callback_without_code() {
        let spotify = MockServer::start().await;
        let base = spawn(AppState::new(
            settings(&spotify, spotify.uri()),
            LocalChannel::in_memory(),
        ))
        .await;

        let response = client()
            .get(format!("{base}/api/auth/callback"))
            .send()
            .await
            .unwrap();

        assert_eq!(location(&response), "/?error=no_code");
    }

    #[tokio::test]
    async fn test_state_mismatch_never_exchanges() {
        let spotify = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&spotify)
            .await;
        let base = spawn(AppState::new(
            settings(&spotify, spotify.uri()),
            LocalChannel::in_memory(),
        ))
        .await;

        let mismatched = client()
            .get(format!("{base}/api/auth/callback?code=abc123&state=bbbb"))
            .header(COOKIE, "spotify_auth_state=aaaa")
            .send()
            .await
            .unwrap();
        let missing = client()
            .get(format!("{base}/api/auth/callback?code=abc123&state=bbbb"))
            .send()
            .await
            .unwrap();

        assert_eq!(location(&mismatched), "/?error=state_mismatch");
        assert_eq!(location(&missing), "/?error=state_mismatch");
    }

    #[tokio::test]
    async fn test_sign_in_sets_cookies_and_local_session() {
        let spotify = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .and(body_string_contains("code=abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tok1",
                "token_type": "Bearer",
                "scope": "user-top-read",
                "expires_in": 3600,
                "refresh_token": "ref1"
            })))
            .expect(1)
            .mount(&spotify)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/me/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_json()))
            .mount(&spotify)
            .await;
        let local = LocalChannel::in_memory();
        let base = spawn(AppState::new(settings(&spotify, spotify.uri()), local.clone())).await;

        let response = client()
            .get(format!("{base}/api/spotify/auth-url"))
            .send()
            .await
            .unwrap();
        let state_cookie = set_cookie(&set_cookies(&response), "spotify_auth_state").to_string();
        assert!(state_cookie.contains("HttpOnly"));
        let body: Value = response.json().await.unwrap();
        let auth_url = reqwest::Url::parse(body["authUrl"].as_str().unwrap()).unwrap();
        let state = auth_url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();

        let response = client()
            .get(format!("{base}/api/auth/callback?code=abc123&state={state}"))
            .header(COOKIE, format!("spotify_auth_state={state}"))
            .send()
            .await
            .unwrap();

        assert_eq!(location(&response), "/");
        let cookies = set_cookies(&response);
        let access = set_cookie(&cookies, "spotify_access_token");
        assert!(access.starts_with("spotify_access_token=tok1;"));
        assert!(!access.contains("HttpOnly"));
        assert!(access.contains("Max-Age=3600"));
        let refresh = set_cookie(&cookies, "spotify_refresh_token");
        assert!(refresh.contains("HttpOnly"));
        assert!(refresh.contains("Max-Age=2592000"));
        assert!(set_cookie(&cookies, "spotify_user").contains("Max-Age=3600"));
        assert!(set_cookie(&cookies, "spotify_auth_state").contains("Max-Age=0"));

        assert_eq!(local.read(ACCESS_TOKEN_KEY).as_deref(), Some("tok1"));
        assert!(local.read(REFRESH_TOKEN_KEY).is_none());

        let session: Value = client()
            .get(format!("{base}/api/session"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(session["authenticated"], true);
        assert_eq!(session["user"]["id"], "ada");
    }

    #[tokio::test]
    async fn test_dashboard_requires_session() {
        let spotify = MockServer::start().await;
        let base = spawn(AppState::new(
            settings(&spotify, spotify.uri()),
            LocalChannel::in_memory(),
        ))
        .await;

        let response = client()
            .get(format!("{base}/api/dashboard"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);

        let response = client()
            .get(format!("{base}/api/dashboard?time_range=decade"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_dashboard_returns_snapshot_with_genres() {
        let spotify = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/me/top/tracks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(empty_page()))
            .expect(1)
            .mount(&spotify)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/me/top/artists"))
            .respond_with(ResponseTemplate::new(200).set_body_json(artist_page()))
            .expect(1)
            .mount(&spotify)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/me/player/recently-played"))
            .respond_with(ResponseTemplate::new(200).set_body_json(empty_recent()))
            .expect(1)
            .mount(&spotify)
            .await;
        let base = spawn(AppState::new(settings(&spotify, spotify.uri()), signed_in_local())).await;

        let response = client()
            .get(format!("{base}/api/dashboard?time_range=short_term"))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["timeRange"], "short_term");
        assert_eq!(body["timeRangeLabel"], "4 Weeks");
        assert_eq!(body["topArtists"]["items"][0]["name"], "Beach House");
        assert_eq!(body["topGenres"][0]["genre"], "dream pop");
        assert_eq!(body["topGenres"][0]["percentage"], 100);
    }

    #[tokio::test]
    async fn test_dashboard_unauthorized_upstream_asks_for_sign_in() {
        let spotify = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/me/top/tracks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(empty_page()))
            .mount(&spotify)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/me/top/artists"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": { "status": 401, "message": "The access token expired" }
            })))
            .mount(&spotify)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/me/player/recently-played"))
            .respond_with(ResponseTemplate::new(200).set_body_json(empty_recent()))
            .mount(&spotify)
            .await;
        let base = spawn(AppState::new(settings(&spotify, spotify.uri()), signed_in_local())).await;

        let response = client()
            .get(format!("{base}/api/dashboard"))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("sign in again"));
        assert!(body.get("topTracks").is_none());
    }

    #[tokio::test]
    async fn test_ai_insights_unavailable_is_503() {
        let spotify = MockServer::start().await;
        let ollama = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&ollama)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&ollama)
            .await;
        let base = spawn(AppState::new(
            settings(&spotify, ollama.uri()),
            LocalChannel::in_memory(),
        ))
        .await;

        let response = client()
            .post(format!("{base}/api/ai-insights"))
            .json(&empty_snapshot())
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_ai_insights_returns_text() {
        let spotify = MockServer::start().await;
        let ollama = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "models": [] })))
            .mount(&ollama)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "response": "You like quiet music." })),
            )
            .mount(&ollama)
            .await;
        let base = spawn(AppState::new(
            settings(&spotify, ollama.uri()),
            LocalChannel::in_memory(),
        ))
        .await;

        let response = client()
            .post(format!("{base}/api/ai-insights"))
            .json(&empty_snapshot())
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["insights"], "You like quiet music.");
    }

    #[tokio::test]
    async fn test_logout_expires_every_cookie() {
        let spotify = MockServer::start().await;
        let local = signed_in_local();
        let base = spawn(AppState::new(settings(&spotify, spotify.uri()), local.clone())).await;

        let response = client()
            .post(format!("{base}/api/logout"))
            .header(COOKIE, "spotify_access_token=tok1")
            .send()
            .await
            .unwrap();

        assert_eq!(location(&response), "/");
        let cookies = set_cookies(&response);
        for name in [
            "spotify_access_token",
            "spotify_token_issued_at",
            "spotify_token_expires_in",
            "spotify_refresh_token",
            "spotify_user",
        ] {
            let cookie = set_cookie(&cookies, name);
            assert!(cookie.starts_with(&format!("{name}=;")), "{cookie}");
            assert!(cookie.contains("Max-Age=0"), "{cookie}");
        }
        assert!(local.read(ACCESS_TOKEN_KEY).is_none());
    }
}
