//! `HttpRemote` against an in-process fake of the game service.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Form, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use got_client::client_controller::ClientController;
use got_client::config::ClientConfig;
use got_client::remote::{Fetch, HttpRemote, RemoteClient};
use got_client::store::{IdentityStore, MemoryStore};
use got_core::game_state::Phase;
use got_core::protocol::{
    GameSnapshot, GameStatus, Move, MoveForm, PlayerInfo, RegisterRequest, RegisterResponse,
};
use serde_json::json;

#[derive(Default)]
struct Service {
    players: HashMap<String, PlayerInfo>,
    game: Option<GameSnapshot>,
    moves: Vec<MoveForm>,
    /// Raw body returned by the next matchmaking lookup, if set.
    lookup_override: Option<String>,
}

type Shared = Arc<Mutex<Service>>;

async fn register(State(svc): State<Shared>, Json(req): Json<RegisterRequest>) -> Response {
    if req.player_name == "taken" {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "message": "Name already in use" })),
        )
            .into_response();
    }
    let mut svc = svc.lock().unwrap();
    let id = format!("P{}", svc.players.len() + 1);
    svc.players
        .insert(id.clone(), PlayerInfo::new(id.clone(), req.player_name));
    (StatusCode::CREATED, Json(RegisterResponse { player_id: id })).into_response()
}

async fn player(State(svc): State<Shared>, Path(id): Path<String>) -> Response {
    match svc.lock().unwrap().players.get(&id) {
        Some(p) => Json(p.clone()).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "Player not found" })),
        )
            .into_response(),
    }
}

async fn matchmaking(
    State(svc): State<Shared>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mut svc = svc.lock().unwrap();
    if let Some(raw) = svc.lookup_override.take() {
        return raw.into_response();
    }
    let Some(player_id) = params.get("playerId") else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let Some(me) = svc.players.get(player_id).cloned() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let game = GameSnapshot {
        id: "g1".into(),
        players: vec![me.clone(), PlayerInfo::new("P99", "bob")],
        current_player: Some(me),
        current_number: 56,
        status: GameStatus::InProgress,
        last_updated: None,
        winner: None,
    };
    svc.game = Some(game.clone());
    Json(game).into_response()
}

async fn game(State(svc): State<Shared>, Path(id): Path<String>) -> Response {
    match svc.lock().unwrap().game.as_ref().filter(|g| g.id == id) {
        Some(g) => Json(g.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn make_move(State(svc): State<Shared>, Form(form): Form<MoveForm>) -> Response {
    let mut svc = svc.lock().unwrap();
    let Some(game) = svc.game.as_mut() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let next = game.current_number + form.delta;
    if next % 3 != 0 {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "Move must result in a number divisible by 3." })),
        )
            .into_response();
    }
    game.current_number = next / 3;
    game.current_player = game.players.iter().find(|p| p.id != form.player_id).cloned();
    let ack = json!({ "message": "Move accepted", "game": game.clone() });
    svc.moves.push(form);
    Json(ack).into_response()
}

async fn spawn_service() -> (ClientConfig, Shared) {
    let svc: Shared = Arc::default();
    let app = Router::new()
        .route("/api/player/", post(register))
        .route("/api/player/{id}", get(player))
        .route("/api/game/matchmaking", get(matchmaking))
        .route("/api/game/move", post(make_move))
        .route("/api/game/{id}", get(game))
        .with_state(Arc::clone(&svc));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = ClientConfig::new(&format!("http://{addr}/api"))
        .unwrap()
        .with_poll_interval(Duration::from_millis(50))
        .unwrap()
        .with_request_timeout(Duration::from_secs(2));
    (config, svc)
}

#[tokio::test]
async fn operations_map_to_fetch_outcomes() {
    let (config, svc) = spawn_service().await;
    let remote = HttpRemote::new(config).unwrap();

    let Fetch::Ok(RegisterResponse { player_id }) = remote.register("  alice ").await else {
        panic!("registration failed");
    };
    assert_eq!(player_id, "P1");
    assert_eq!(svc.lock().unwrap().players["P1"].name, "alice");

    assert!(matches!(remote.fetch_player("P1").await, Fetch::Ok(p) if p.name == "alice"));
    assert!(remote.fetch_player("nobody").await.is_not_found());
    // A query string in the id must not turn into a lookup of P1.
    assert!(remote.fetch_player("P1?x=1").await.is_not_found());
    assert!(remote.fetch_player("P1/x").await.is_not_found());

    let rejected = remote.register("taken").await;
    assert!(matches!(rejected, Fetch::HttpError { status: 409, ref body } if body.contains("already")));

    assert!(remote.fetch_game("g1").await.is_not_found());
    let Fetch::Ok(game) = remote.matchmaking("P1").await else {
        panic!("expected a match");
    };
    assert!(game.is_ready());

    let bad = remote.submit_move("g1", "P1", Move::Hold).await;
    assert!(matches!(bad, Fetch::HttpError { status: 400, .. }));

    let good = remote.submit_move("g1", "P1", Move::Increment).await;
    assert!(good.is_success());
    let svc = svc.lock().unwrap();
    let moves = &svc.moves;
    assert_eq!(moves.len(), 1);
    assert_eq!(moves[0].delta, 1);
    assert_eq!(moves[0].game_id, "g1");
}

#[tokio::test]
async fn blank_and_garbage_bodies() {
    let (config, svc) = spawn_service().await;
    let remote = HttpRemote::new(config).unwrap();

    svc.lock().unwrap().lookup_override = Some(String::new());
    assert_eq!(remote.matchmaking("P1").await, Fetch::Empty);

    svc.lock().unwrap().lookup_override = Some("not json".into());
    assert_eq!(
        remote.matchmaking("P1").await,
        Fetch::ParseError("not json".into())
    );
}

#[tokio::test]
async fn unreachable_service_is_a_network_error() {
    // Bind then drop to get a port nothing listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = ClientConfig::new(&format!("http://{addr}/api"))
        .unwrap()
        .with_request_timeout(Duration::from_secs(2));
    let remote = HttpRemote::new(config).unwrap();
    assert!(matches!(
        remote.fetch_game("g1").await,
        Fetch::NetworkError(_)
    ));
}

#[tokio::test]
async fn controller_plays_a_turn_over_http() {
    let (config, svc) = spawn_service().await;
    let interval = config.poll_interval;
    let remote = Arc::new(HttpRemote::new(config).unwrap());
    let store = Arc::new(MemoryStore::new());
    let mut ctrl = ClientController::new(remote, Arc::clone(&store), interval, "alice");

    ctrl.start();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !ctrl.game_state().can_move() {
            ctrl.recv().await;
        }
    })
    .await
    .expect("never got our turn");

    assert_eq!(ctrl.game_state().phase, Phase::Playing);
    assert_eq!(store.game_id().as_deref(), Some("g1"));

    ctrl.select_move(Move::Increment).unwrap();
    ctrl.confirm_move().unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while ctrl.game_state().view.as_ref().is_none_or(|v| v.value != 19) {
            ctrl.recv().await;
        }
    })
    .await
    .expect("move never showed up");

    assert!(!ctrl.game_state().is_our_turn());
    assert_eq!(svc.lock().unwrap().moves.len(), 1);
}
