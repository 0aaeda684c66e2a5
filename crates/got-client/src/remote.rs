//! Request/response access to the external game service.
//!
//! Every call resolves to a [`Fetch`] value: transport failures, blank
//! bodies, and unparseable payloads are outcomes the caller must match on,
//! never errors that escape this module. [`RemoteClient`] is the seam the
//! controller is generic over, so tests can script responses without a
//! server; [`HttpRemote`] is the `reqwest` implementation.

use std::future::Future;

use got_core::protocol::{
    GameSnapshot, Move, MoveAck, MoveForm, PlayerInfo, RegisterRequest, RegisterResponse,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use url::Url;

use crate::config::ClientConfig;

/// Outcome of one request to the game service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetch<T> {
    /// 2xx with a payload of the expected shape.
    Ok(T),
    /// 2xx with a blank (or `null`) body.
    Empty,
    /// 2xx with a body that is not the expected structured data.
    ParseError(String),
    /// Non-2xx status. The body is kept for error reporting.
    HttpError { status: u16, body: String },
    /// The request never produced a response.
    NetworkError(String),
}

impl<T> Fetch<T> {
    /// True when the service answered with a 2xx status, whatever the body.
    pub fn is_success(&self) -> bool {
        matches!(self, Fetch::Ok(_) | Fetch::Empty | Fetch::ParseError(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Fetch::HttpError { status: 404, .. })
    }

    /// Short tag for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Fetch::Ok(_) => "ok",
            Fetch::Empty => "empty",
            Fetch::ParseError(_) => "parse-error",
            Fetch::HttpError { .. } => "http-error",
            Fetch::NetworkError(_) => "network-error",
        }
    }
}

/// Interpret a status code and body as a [`Fetch`].
pub fn classify<T: DeserializeOwned>(status: u16, body: &str) -> Fetch<T> {
    if !(200..300).contains(&status) {
        return Fetch::HttpError {
            status,
            body: body.to_string(),
        };
    }
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Fetch::Empty;
    }
    match serde_json::from_str::<T>(trimmed) {
        Ok(value) => Fetch::Ok(value),
        Err(_) => Fetch::ParseError(body.to_string()),
    }
}

/// Operations the game service exposes to a participant.
pub trait RemoteClient: Send + Sync + 'static {
    /// Register a new participant under `name`.
    fn register(&self, name: &str) -> impl Future<Output = Fetch<RegisterResponse>> + Send;

    /// Look up a participant by id.
    fn fetch_player(&self, player_id: &str) -> impl Future<Output = Fetch<PlayerInfo>> + Send;

    /// Ask whether a game exists for `player_id`, entering the queue if not.
    fn matchmaking(&self, player_id: &str) -> impl Future<Output = Fetch<GameSnapshot>> + Send;

    /// Fetch the current state of a game.
    fn fetch_game(&self, game_id: &str) -> impl Future<Output = Fetch<GameSnapshot>> + Send;

    /// Submit a move on behalf of `player_id`.
    fn submit_move(
        &self,
        game_id: &str,
        player_id: &str,
        delta: Move,
    ) -> impl Future<Output = Fetch<MoveAck>> + Send;
}

/// [`RemoteClient`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    http: Client,
    config: ClientConfig,
}

impl HttpRemote {
    pub fn new(config: ClientConfig) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { http, config })
    }

    fn endpoint<T>(&self, segments: &[&str], op: &'static str) -> Result<Url, Fetch<T>> {
        self.config.endpoint(segments).map_err(|e| {
            warn!(op, error = %e, "cannot build request address");
            Fetch::NetworkError(e.to_string())
        })
    }

    async fn execute<T: DeserializeOwned + Send>(
        &self,
        request: reqwest::RequestBuilder,
        op: &'static str,
    ) -> Fetch<T> {
        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(op, error = %e, "request failed");
                return Fetch::NetworkError(e.to_string());
            }
        };
        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                debug!(op, status, error = %e, "failed to read body");
                return Fetch::NetworkError(format!("failed to read body: {e}"));
            }
        };

        let fetch = classify(status, &body);
        match &fetch {
            Fetch::Ok(_) => {}
            Fetch::Empty => debug!(op, status, "empty response"),
            Fetch::ParseError(raw) => warn!(op, status, body = %raw, "unparseable response"),
            Fetch::HttpError { status: 404, .. } => debug!(op, "not found"),
            Fetch::HttpError { status, body } => warn!(op, status, %body, "service error"),
            Fetch::NetworkError(_) => {}
        }
        fetch
    }
}

impl RemoteClient for HttpRemote {
    async fn register(&self, name: &str) -> Fetch<RegisterResponse> {
        let body = RegisterRequest {
            player_name: name.trim().to_string(),
        };
        let url = match self.endpoint(&["player", ""], "register") {
            Ok(url) => url,
            Err(fetch) => return fetch,
        };
        let request = self.http.post(url).json(&body);
        self.execute(request, "register").await
    }

    async fn fetch_player(&self, player_id: &str) -> Fetch<PlayerInfo> {
        let url = match self.endpoint(&["player", player_id], "fetch_player") {
            Ok(url) => url,
            Err(fetch) => return fetch,
        };
        self.execute(self.http.get(url), "fetch_player").await
    }

    async fn matchmaking(&self, player_id: &str) -> Fetch<GameSnapshot> {
        let url = match self.endpoint(&["game", "matchmaking"], "matchmaking") {
            Ok(url) => url,
            Err(fetch) => return fetch,
        };
        let request = self.http.get(url).query(&[("playerId", player_id)]);
        self.execute(request, "matchmaking").await
    }

    async fn fetch_game(&self, game_id: &str) -> Fetch<GameSnapshot> {
        let url = match self.endpoint(&["game", game_id], "fetch_game") {
            Ok(url) => url,
            Err(fetch) => return fetch,
        };
        self.execute(self.http.get(url), "fetch_game").await
    }

    async fn submit_move(&self, game_id: &str, player_id: &str, delta: Move) -> Fetch<MoveAck> {
        let form = MoveForm {
            game_id: game_id.to_string(),
            player_id: player_id.to_string(),
            delta: delta.delta(),
        };
        let url = match self.endpoint(&["game", "move"], "submit_move") {
            Ok(url) => url,
            Err(fetch) => return fetch,
        };
        let request = self.http.post(url).form(&form);
        self.execute(request, "submit_move").await
    }
}
