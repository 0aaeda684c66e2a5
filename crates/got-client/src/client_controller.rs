//! Framework-agnostic client controller.
//!
//! Owns the remote client, the identity store, and a [`ClientGameState`],
//! and wires the lifecycle together:
//!
//! - identity: register a participant, or verify and reuse a stored one;
//! - matchmaking: poll the lookup endpoint until a two-player game exists;
//! - session: poll the game state, derive the local view, stop on
//!   completion or when the game disappears;
//! - turns: gate, submit, and report moves.
//!
//! All network I/O runs in spawned tasks (see [`crate::poller`]). Their
//! results come back through a channel and are applied one at a time by
//! [`ClientController::recv`] / [`ClientController::try_recv`], so every
//! state transition is synchronous and runs to completion.
//!
//! Frontends only need to:
//! 1. Call [`ClientController::start`].
//! 2. Call [`ClientController::recv`] (e.g. inside `tokio::select!`) and
//!    redraw from [`ClientController::game_state`].
//! 3. Call the user operations ([`select_move`](ClientController::select_move),
//!    [`confirm_move`](ClientController::confirm_move), ...) on input.

use std::sync::Arc;
use std::time::Duration;

use got_core::game_state::{
    ClientGameState, GameEvent, LogCategory, Outcome, Phase, SessionView, StateChanged,
};
use got_core::protocol::{GameSnapshot, Move, MoveAck, validate_player_name};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::matchmaking::{IdentityCheck, LookupStep, Matchmaker};
use crate::poller::{self, Incoming, PollTarget, Poller, SnapshotSeq};
use crate::remote::{Fetch, RemoteClient};
use crate::store::IdentityStore;
use crate::sync::{SyncStep, Synchronizer};
use crate::turn::{TurnController, TurnError};

/// Outcome of processing a single background result.
#[derive(Debug)]
pub enum PollResult {
    /// A result was applied; the flags describe what was modified.
    Updated(StateChanged),
    /// No result was available (channel empty).
    Empty,
}

pub struct ClientController<R: RemoteClient, S: IdentityStore> {
    remote: Arc<R>,
    store: S,
    poll_interval: Duration,
    tx: mpsc::UnboundedSender<Incoming>,
    rx: mpsc::UnboundedReceiver<Incoming>,
    /// Bumped on every phase change; results from older epochs are dropped.
    epoch: u64,
    /// Issue order of game-state requests across all sessions.
    snapshot_seq: SnapshotSeq,
    poller: Option<Poller>,
    matchmaker: Matchmaker,
    sync: Option<Synchronizer>,
    turn: TurnController,
    pub state: ClientGameState,
}

impl<R: RemoteClient, S: IdentityStore> ClientController<R, S> {
    pub fn new(remote: Arc<R>, store: S, poll_interval: Duration, name: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            remote,
            store,
            poll_interval,
            tx,
            rx,
            epoch: 0,
            snapshot_seq: SnapshotSeq::default(),
            poller: None,
            matchmaker: Matchmaker::new(),
            sync: None,
            turn: TurnController::new(),
            state: ClientGameState::new(name),
        }
    }

    /// Borrow the underlying [`ClientGameState`] immutably.
    pub fn game_state(&self) -> &ClientGameState {
        &self.state
    }

    /// What the live poller (if any) is polling.
    pub fn poll_target(&self) -> Option<&PollTarget> {
        self.poller.as_ref().map(Poller::target)
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_some()
    }

    /// Append a local feedback message to the event log.
    pub fn add_message(&mut self, text: String, category: LogCategory) {
        self.state.add_message(text, category);
    }

    /// Change the name used for the next registration. Only allowed while
    /// idle or after a failed registration.
    pub fn set_name(&mut self, name: &str) -> bool {
        if !matches!(self.state.phase, Phase::Idle | Phase::Failed(_)) {
            return false;
        }
        self.state.our_name = name.trim().to_string();
        true
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Enter the game flow.
    ///
    /// Resumes a stored game when both ids are stored, verifies and reuses
    /// a stored participant id, or registers a new participant.
    pub fn start(&mut self) -> StateChanged {
        let stored = self.store.load();
        match (stored.player_id, stored.game_id) {
            (Some(player_id), Some(game_id)) => {
                info!(player = %player_id, game = %game_id, "resuming stored game");
                self.state.our_player_id = Some(player_id.clone());
                self.state.add_event(GameEvent::Resumed {
                    player_id: player_id.clone(),
                });
                self.activate_session(&game_id, &player_id, None)
            }
            (Some(player_id), None) => self.verify_identity(player_id),
            (None, _) => self.register(),
        }
    }

    /// Try again after a failed registration.
    pub fn retry(&mut self) -> StateChanged {
        if matches!(self.state.phase, Phase::Failed(_)) {
            self.start()
        } else {
            StateChanged::default()
        }
    }

    /// Look for a new opponent after a finished game, keeping our identity.
    pub fn play_again(&mut self) -> StateChanged {
        if !matches!(self.state.phase, Phase::Finished(_)) {
            return StateChanged::default();
        }
        self.store.clear_game();
        match self.state.our_player_id.clone() {
            Some(player_id) => self.begin_search(&player_id),
            None => self.register(),
        }
    }

    /// Abandon matchmaking. The participant id is discarded.
    pub fn cancel_search(&mut self) -> StateChanged {
        if !matches!(self.state.phase, Phase::Searching | Phase::Registering) {
            return StateChanged::default();
        }
        info!("matchmaking cancelled");
        self.matchmaker.cancel();
        self.store.clear();
        self.reset_to_idle()
    }

    /// Return to the main menu: stop everything and forget both ids.
    pub fn leave(&mut self) -> StateChanged {
        info!("leaving game flow");
        self.matchmaker.cancel();
        self.store.clear();
        self.reset_to_idle()
    }

    // ------------------------------------------------------------------
    // Turn operations
    // ------------------------------------------------------------------

    /// Stage a move. Rejected locally unless it is our turn in a game in
    /// progress and no submission is in flight.
    pub fn select_move(&mut self, delta: Move) -> Result<StateChanged, TurnError> {
        let view = self.sync.as_ref().and_then(Synchronizer::view);
        self.turn.select(view, delta)?;
        Ok(self.sync_turn_state())
    }

    pub fn clear_selection(&mut self) -> StateChanged {
        if self.turn.clear_selection() {
            self.sync_turn_state()
        } else {
            StateChanged::default()
        }
    }

    /// Submit the staged move.
    ///
    /// The request runs in the background; its outcome arrives through
    /// [`recv`](Self::recv).
    pub fn confirm_move(&mut self) -> Result<StateChanged, TurnError> {
        let sync = self.sync.as_ref().ok_or(TurnError::NoActiveGame)?;
        let delta = self.turn.confirm(sync.view())?;
        let game_id = sync.game_id().to_string();
        let player_id = sync.identity().to_string();

        info!(game = %game_id, %delta, "submitting move");
        self.state.add_event(GameEvent::MoveSent { delta });

        let epoch = self.epoch;
        let remote = Arc::clone(&self.remote);
        poller::spawn_once(self.tx.clone(), async move {
            Incoming::MoveResult {
                epoch,
                delta,
                fetch: remote.submit_move(&game_id, &player_id, delta).await,
            }
        });
        Ok(self.sync_turn_state())
    }

    // ------------------------------------------------------------------
    // Event processing
    // ------------------------------------------------------------------

    /// Try to receive and apply one background result (non-blocking).
    pub fn try_recv(&mut self) -> PollResult {
        match self.rx.try_recv() {
            Ok(msg) => PollResult::Updated(self.handle_incoming(msg)),
            Err(_) => PollResult::Empty,
        }
    }

    /// Await the next background result and apply it.
    ///
    /// Cancel-safe, so it can sit in a `tokio::select!` branch.
    pub async fn recv(&mut self) -> PollResult {
        match self.rx.recv().await {
            Some(msg) => PollResult::Updated(self.handle_incoming(msg)),
            None => PollResult::Empty,
        }
    }

    fn handle_incoming(&mut self, msg: Incoming) -> StateChanged {
        if msg.epoch() != self.epoch {
            debug!(
                got = msg.epoch(),
                current = self.epoch,
                "dropping result from a finished phase"
            );
            return StateChanged::default();
        }

        match msg {
            Incoming::Identity {
                player_id, fetch, ..
            } => match Matchmaker::check_identity(&fetch) {
                IdentityCheck::Reuse => {
                    info!(player = %player_id, "reusing stored identity");
                    self.state.our_player_id = Some(player_id.clone());
                    self.state.add_event(GameEvent::Resumed {
                        player_id: player_id.clone(),
                    });
                    self.begin_search(&player_id)
                }
                IdentityCheck::Stale => {
                    info!(player = %player_id, "stored identity unknown to service");
                    self.store.clear();
                    self.register()
                }
            },
            Incoming::Registered { fetch, .. } => match self.matchmaker.on_registration(fetch) {
                Ok(player_id) => {
                    info!(player = %player_id, "registered");
                    self.store.set_player_id(&player_id);
                    self.state.our_player_id = Some(player_id.clone());
                    self.state.add_event(GameEvent::Registered {
                        player_id: player_id.clone(),
                    });
                    self.begin_search(&player_id)
                }
                Err(message) => self.fail(message),
            },
            Incoming::Lookup { fetch, .. } => self.handle_lookup(fetch),
            Incoming::Snapshot { seq, fetch, .. } => {
                let Some(sync) = self.sync.as_mut() else {
                    return StateChanged::default();
                };
                let step = sync.apply(seq, fetch);
                let settled = self.turn.on_snapshot(sync.view_seq());
                let changed = self.apply_sync_step(step);
                if settled {
                    merge(changed, self.sync_turn_state())
                } else {
                    changed
                }
            }
            Incoming::MoveResult { delta, fetch, .. } => self.handle_move_result(delta, fetch),
        }
    }

    fn handle_lookup(&mut self, fetch: Fetch<GameSnapshot>) -> StateChanged {
        match self.matchmaker.on_lookup(fetch) {
            LookupStep::KeepSearching | LookupStep::Ignored => StateChanged::default(),
            LookupStep::Waiting { game_id } => {
                info!(game = %game_id, "match slot open, waiting for opponent");
                self.store.set_game_id(&game_id);
                self.state
                    .add_event(GameEvent::WaitingForOpponent { game_id });
                StateChanged::default()
            }
            LookupStep::Matched(snapshot) => {
                let Some(player_id) = self.state.our_player_id.clone() else {
                    return StateChanged::default();
                };
                let game_id = snapshot.id.clone();
                let opponent = snapshot
                    .players
                    .iter()
                    .find(|p| p.id != player_id)
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| "Opponent".to_string());
                info!(game = %game_id, %opponent, "match found");
                self.store.set_game_id(&game_id);
                self.state.add_event(GameEvent::MatchFound {
                    game_id: game_id.clone(),
                    opponent,
                });
                self.activate_session(&game_id, &player_id, Some(snapshot))
            }
        }
    }

    fn handle_move_result(&mut self, delta: Move, fetch: Fetch<MoveAck>) -> StateChanged {
        let accepted = self.turn.finish(&fetch);
        let mut changed = self.sync_turn_state();
        if accepted {
            info!(%delta, "move accepted");
            self.state.add_event(GameEvent::MoveAccepted { delta });
            match self.refresh_now() {
                Some(seq) => self.turn.await_snapshot(seq),
                None => self.turn.reset(),
            }
            changed = merge(changed, self.sync_turn_state());
        } else {
            let message = self.turn.error().unwrap_or_default().to_string();
            info!(%delta, result = fetch.kind(), "move rejected");
            self.state.add_event(GameEvent::MoveRejected { message });
        }
        changed
    }

    fn apply_sync_step(&mut self, step: SyncStep) -> StateChanged {
        match step {
            SyncStep::Unchanged | SyncStep::Ignored => StateChanged::default(),
            SyncStep::Updated(changed) => self.publish_view(changed),
            SyncStep::Completed { outcome, changed } => {
                let mut changed = self.publish_view(changed);
                self.stop_polling();
                self.store.clear_game();
                self.turn.reset();
                let winner_name = self
                    .state
                    .view
                    .as_ref()
                    .map(|v| v.winner_name().to_string())
                    .unwrap_or_default();
                info!(?outcome, winner = %winner_name, "game over");
                self.state.add_event(GameEvent::GameOver {
                    won: outcome == Outcome::Won,
                    winner_name,
                });
                self.state.phase = Phase::Finished(outcome);
                changed.outcome = true;
                changed.phase = true;
                merge(changed, self.sync_turn_state())
            }
            SyncStep::Vanished => {
                info!("game no longer exists, returning to matchmaking");
                self.stop_polling();
                self.store.clear_game();
                self.state.add_event(GameEvent::GameVanished);
                match self.state.our_player_id.clone() {
                    Some(player_id) => self.begin_search(&player_id),
                    None => self.register(),
                }
            }
        }
    }

    /// Copy the synchronizer's view into the shared state and log turn
    /// changes.
    fn publish_view(&mut self, mut changed: StateChanged) -> StateChanged {
        let Some(view) = self.sync.as_ref().and_then(Synchronizer::view).cloned() else {
            return changed;
        };
        if changed.turn && view.outcome == Outcome::InProgress {
            self.state.add_event(turn_event(&view));
        }
        if self.turn.on_view(&view) {
            changed.selection = true;
        }
        self.state.view = Some(view);
        merge(changed, self.sync_turn_state())
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    fn register(&mut self) -> StateChanged {
        let name = self.state.our_name.trim().to_string();
        if let Err(message) = validate_player_name(&name) {
            return self.fail(message);
        }
        self.stop_polling();
        self.state.phase = Phase::Registering;
        let epoch = self.epoch;
        let remote = Arc::clone(&self.remote);
        poller::spawn_once(self.tx.clone(), async move {
            Incoming::Registered {
                epoch,
                fetch: remote.register(&name).await,
            }
        });
        phase_changed()
    }

    fn verify_identity(&mut self, player_id: String) -> StateChanged {
        self.stop_polling();
        self.state.phase = Phase::Registering;
        let epoch = self.epoch;
        let remote = Arc::clone(&self.remote);
        poller::spawn_once(self.tx.clone(), async move {
            let fetch = remote.fetch_player(&player_id).await;
            Incoming::Identity {
                epoch,
                player_id,
                fetch,
            }
        });
        phase_changed()
    }

    fn begin_search(&mut self, player_id: &str) -> StateChanged {
        self.stop_polling();
        self.sync = None;
        self.turn.reset();
        self.state.view = None;
        self.matchmaker.begin(player_id);
        self.state.phase = Phase::Searching;
        self.state.add_event(GameEvent::Searching);
        info!(player = %player_id, "searching for opponent");

        self.poller = Some(poller::spawn_poller(
            Arc::clone(&self.remote),
            PollTarget::Matchmaking {
                player_id: player_id.to_string(),
            },
            self.epoch,
            self.snapshot_seq.clone(),
            self.poll_interval,
            self.tx.clone(),
        ));
        merge(phase_changed(), self.sync_turn_state())
    }

    /// Bind a synchronizer to `game_id` and start polling it, replacing
    /// whatever was polling before.
    fn activate_session(
        &mut self,
        game_id: &str,
        player_id: &str,
        seed: Option<GameSnapshot>,
    ) -> StateChanged {
        self.stop_polling();
        self.turn.reset();
        self.state.view = None;
        self.state.phase = Phase::Playing;
        self.sync = Some(Synchronizer::new(game_id, player_id));
        info!(game = %game_id, "session active");

        let mut changed = merge(phase_changed(), self.sync_turn_state());
        if let Some(snapshot) = seed
            && let Some(sync) = self.sync.as_mut()
        {
            let step = sync.apply_snapshot(self.snapshot_seq.next(), snapshot);
            changed = merge(changed, self.apply_sync_step(step));
        }

        // Seeding may already have finished the game.
        if self.state.phase == Phase::Playing {
            self.poller = Some(poller::spawn_poller(
                Arc::clone(&self.remote),
                PollTarget::Game {
                    game_id: game_id.to_string(),
                },
                self.epoch,
                self.snapshot_seq.clone(),
                self.poll_interval,
                self.tx.clone(),
            ));
        }
        changed
    }

    /// Fetch the game state once, outside the interval. Results of
    /// requests issued earlier are discarded from here on.
    ///
    /// Returns the refresh's sequence number, or `None` if there is no live
    /// session to refresh.
    fn refresh_now(&mut self) -> Option<u64> {
        let sync = self.sync.as_mut().filter(|s| !s.is_terminal())?;
        let seq = self.snapshot_seq.next();
        sync.discard_before(seq);
        let game_id = sync.game_id().to_string();
        let epoch = self.epoch;
        let remote = Arc::clone(&self.remote);
        poller::spawn_once(self.tx.clone(), async move {
            Incoming::Snapshot {
                epoch,
                seq,
                fetch: remote.fetch_game(&game_id).await,
            }
        });
        Some(seq)
    }

    fn fail(&mut self, message: String) -> StateChanged {
        self.stop_polling();
        self.state.add_event(GameEvent::Failed {
            message: message.clone(),
        });
        self.state.phase = Phase::Failed(message);
        phase_changed()
    }

    fn reset_to_idle(&mut self) -> StateChanged {
        self.stop_polling();
        self.sync = None;
        self.turn.reset();
        self.state.view = None;
        self.state.our_player_id = None;
        self.state.phase = Phase::Idle;
        merge(phase_changed(), self.sync_turn_state())
    }

    /// Cancel the live poller and invalidate every result still in flight.
    fn stop_polling(&mut self) {
        self.poller = None;
        self.epoch += 1;
    }

    fn sync_turn_state(&mut self) -> StateChanged {
        let selection = self.turn.selection();
        let error = self.turn.error().map(str::to_string);
        let changed = self.state.selection != selection || self.state.error != error;
        self.state.selection = selection;
        self.state.error = error;
        StateChanged {
            selection: changed,
            ..StateChanged::default()
        }
    }
}

fn turn_event(view: &SessionView) -> GameEvent {
    if view.is_our_turn() {
        GameEvent::YourTurn { value: view.value }
    } else {
        GameEvent::OpponentTurn {
            name: view.opponent_name.clone(),
            value: view.value,
        }
    }
}

fn phase_changed() -> StateChanged {
    StateChanged {
        phase: true,
        ..StateChanged::default()
    }
}

fn merge(a: StateChanged, b: StateChanged) -> StateChanged {
    StateChanged {
        value: a.value || b.value,
        turn: a.turn || b.turn,
        outcome: a.outcome || b.outcome,
        players: a.players || b.players,
        phase: a.phase || b.phase,
        selection: a.selection || b.selection,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use got_core::game_state::Selection;
    use got_core::protocol::{GameStatus, PlayerInfo, RegisterResponse};

    use crate::matchmaking::REGISTRATION_FAILED;
    use crate::store::{MemoryStore, StoredSession};

    const POLL: Duration = Duration::from_secs(5);

    /// Scripted service. Each operation pops its next response; an empty
    /// script answers like a quiet server.
    #[derive(Default)]
    struct FakeRemote {
        registers: Mutex<VecDeque<Fetch<RegisterResponse>>>,
        players: Mutex<VecDeque<Fetch<PlayerInfo>>>,
        lookups: Mutex<VecDeque<Fetch<GameSnapshot>>>,
        games: Mutex<VecDeque<Fetch<GameSnapshot>>>,
        /// How long each game fetch takes to answer, in call order. The
        /// response is picked when the request arrives.
        game_delays: Mutex<VecDeque<Duration>>,
        moves: Mutex<VecDeque<Fetch<MoveAck>>>,
        register_calls: AtomicUsize,
        game_calls: AtomicUsize,
        submitted: Mutex<Vec<(String, String, Move)>>,
    }

    fn pop<T>(queue: &Mutex<VecDeque<Fetch<T>>>, fallback: Fetch<T>) -> Fetch<T> {
        queue.lock().unwrap().pop_front().unwrap_or(fallback)
    }

    impl FakeRemote {
        fn script<T>(queue: &Mutex<VecDeque<Fetch<T>>>, fetch: Fetch<T>) {
            queue.lock().unwrap().push_back(fetch);
        }
    }

    impl RemoteClient for FakeRemote {
        async fn register(&self, _name: &str) -> Fetch<RegisterResponse> {
            self.register_calls.fetch_add(1, Ordering::SeqCst);
            pop(&self.registers, Fetch::NetworkError("refused".into()))
        }

        async fn fetch_player(&self, _player_id: &str) -> Fetch<PlayerInfo> {
            pop(&self.players, Fetch::NetworkError("refused".into()))
        }

        async fn matchmaking(&self, _player_id: &str) -> Fetch<GameSnapshot> {
            pop(&self.lookups, Fetch::Empty)
        }

        async fn fetch_game(&self, _game_id: &str) -> Fetch<GameSnapshot> {
            self.game_calls.fetch_add(1, Ordering::SeqCst);
            let fetch = pop(&self.games, Fetch::Empty);
            let delay = self.game_delays.lock().unwrap().pop_front();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            fetch
        }

        async fn submit_move(&self, game_id: &str, player_id: &str, delta: Move) -> Fetch<MoveAck> {
            self.submitted
                .lock()
                .unwrap()
                .push((game_id.to_string(), player_id.to_string(), delta));
            pop(&self.moves, Fetch::Empty)
        }
    }

    type Ctrl = ClientController<FakeRemote, Arc<MemoryStore>>;

    fn snap(value: i64, players: usize, current: Option<&str>, status: GameStatus, winner: Option<&str>) -> GameSnapshot {
        let roster = [PlayerInfo::new("P1", "alice"), PlayerInfo::new("P2", "bob")];
        GameSnapshot {
            id: "g1".into(),
            players: roster[..players].to_vec(),
            current_player: current.map(|id| PlayerInfo::new(id, "")),
            current_number: value,
            status,
            last_updated: None,
            winner: winner.map(|id| PlayerInfo::new(id, "")),
        }
    }

    fn live(value: i64, current: &str) -> Fetch<GameSnapshot> {
        Fetch::Ok(snap(value, 2, Some(current), GameStatus::InProgress, None))
    }

    fn controller(session: StoredSession) -> (Ctrl, Arc<FakeRemote>, Arc<MemoryStore>) {
        let remote = Arc::new(FakeRemote::default());
        let store = Arc::new(MemoryStore::with_session(session));
        let ctrl = ClientController::new(Arc::clone(&remote), Arc::clone(&store), POLL, "alice");
        (ctrl, remote, store)
    }

    fn stored(player_id: Option<&str>, game_id: Option<&str>) -> StoredSession {
        StoredSession {
            player_id: player_id.map(str::to_string),
            game_id: game_id.map(str::to_string),
        }
    }

    /// Let spawned requests finish and apply everything they delivered,
    /// including follow-up requests started while applying.
    async fn settle(ctrl: &mut Ctrl) {
        for _ in 0..4 {
            for _ in 0..16 {
                tokio::task::yield_now().await;
            }
            while let PollResult::Updated(_) = ctrl.try_recv() {}
        }
    }

    /// Registers P1 and lands in a game whose first snapshot is `first`.
    async fn playing(first: Fetch<GameSnapshot>) -> (Ctrl, Arc<FakeRemote>, Arc<MemoryStore>) {
        let (mut ctrl, remote, store) = controller(StoredSession::default());
        FakeRemote::script(&remote.registers, Fetch::Ok(RegisterResponse { player_id: "P1".into() }));
        FakeRemote::script(&remote.lookups, first);
        ctrl.start();
        settle(&mut ctrl).await;
        assert_eq!(ctrl.game_state().phase, Phase::Playing);
        (ctrl, remote, store)
    }

    #[tokio::test(start_paused = true)]
    async fn registers_then_matches() {
        let (mut ctrl, remote, store) = controller(StoredSession::default());
        FakeRemote::script(&remote.registers, Fetch::Ok(RegisterResponse { player_id: "P1".into() }));
        FakeRemote::script(&remote.lookups, live(56, "P1"));

        ctrl.start();
        assert_eq!(ctrl.game_state().phase, Phase::Registering);
        settle(&mut ctrl).await;

        let state = ctrl.game_state();
        assert_eq!(state.phase, Phase::Playing);
        assert_eq!(state.our_player_id.as_deref(), Some("P1"));
        let view = state.view.as_ref().unwrap();
        assert_eq!(view.value, 56);
        assert!(view.is_our_turn());
        assert_eq!(view.opponent_name, "bob");
        assert_eq!(store.load(), stored(Some("P1"), Some("g1")));
        assert_eq!(
            ctrl.poll_target(),
            Some(&PollTarget::Game {
                game_id: "g1".into()
            })
        );
        assert!(
            state
                .events
                .iter()
                .any(|e| matches!(e, GameEvent::MatchFound { opponent, .. } if opponent == "bob"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn half_filled_slot_keeps_searching() {
        let (mut ctrl, remote, store) = controller(StoredSession::default());
        FakeRemote::script(&remote.registers, Fetch::Ok(RegisterResponse { player_id: "P1".into() }));
        FakeRemote::script(
            &remote.lookups,
            Fetch::Ok(snap(56, 1, None, GameStatus::InProgress, None)),
        );

        ctrl.start();
        settle(&mut ctrl).await;
        assert_eq!(ctrl.game_state().phase, Phase::Searching);
        assert_eq!(store.game_id().as_deref(), Some("g1"));

        FakeRemote::script(&remote.lookups, live(56, "P2"));
        tokio::time::sleep(POLL).await;
        settle(&mut ctrl).await;
        assert_eq!(ctrl.game_state().phase, Phase::Playing);
        assert!(!ctrl.game_state().is_our_turn());
    }

    #[tokio::test(start_paused = true)]
    async fn move_round_trip() {
        let (mut ctrl, remote, _store) = playing(live(56, "P1")).await;

        ctrl.select_move(Move::Increment).unwrap();
        assert_eq!(ctrl.game_state().selection, Selection::Selected(Move::Increment));
        ctrl.confirm_move().unwrap();
        assert_eq!(ctrl.game_state().selection, Selection::Submitting(Move::Increment));

        let before = remote.game_calls.load(Ordering::SeqCst);
        FakeRemote::script(&remote.games, live(19, "P2"));
        settle(&mut ctrl).await;

        // Acceptance refreshes the game right away.
        assert!(remote.game_calls.load(Ordering::SeqCst) > before);
        let state = ctrl.game_state();
        assert_eq!(state.selection, Selection::None);
        assert_eq!(state.error, None);
        let view = state.view.as_ref().unwrap();
        assert_eq!(view.value, 19);
        assert!(!view.is_our_turn());
        assert_eq!(
            *remote.submitted.lock().unwrap(),
            vec![("g1".to_string(), "P1".to_string(), Move::Increment)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_poll_cannot_undo_a_move() {
        let (mut ctrl, remote, _store) = playing(live(56, "P1")).await;

        // The next scheduled poll sees the board before our move but answers
        // late. The refresh after acceptance answers at once.
        FakeRemote::script(&remote.games, live(56, "P1"));
        FakeRemote::script(&remote.games, live(19, "P2"));
        remote
            .game_delays
            .lock()
            .unwrap()
            .extend([Duration::from_secs(3), Duration::ZERO]);

        tokio::time::sleep(POLL).await;
        ctrl.select_move(Move::Increment).unwrap();
        ctrl.confirm_move().unwrap();
        settle(&mut ctrl).await;
        assert_eq!(ctrl.game_state().view.as_ref().unwrap().value, 19);
        assert_eq!(ctrl.game_state().selection, Selection::None);

        tokio::time::sleep(Duration::from_secs(3)).await;
        settle(&mut ctrl).await;

        let state = ctrl.game_state();
        let view = state.view.as_ref().unwrap();
        assert_eq!(view.value, 19);
        assert!(!state.can_move());
        assert_eq!(ctrl.select_move(Move::Hold), Err(TurnError::NotYourTurn));
        assert_eq!(remote.submitted.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_second_move_before_refresh_lands() {
        let (mut ctrl, remote, _store) = playing(live(56, "P1")).await;
        FakeRemote::script(&remote.games, live(19, "P2"));
        remote
            .game_delays
            .lock()
            .unwrap()
            .push_back(Duration::from_secs(2));

        ctrl.select_move(Move::Increment).unwrap();
        ctrl.confirm_move().unwrap();
        settle(&mut ctrl).await;

        // Accepted, but the board still shows the turn we just played.
        assert!(ctrl.game_state().is_our_turn());
        assert_eq!(ctrl.game_state().selection, Selection::Submitting(Move::Increment));
        assert_eq!(ctrl.select_move(Move::Hold), Err(TurnError::SubmissionInFlight));
        assert_eq!(ctrl.confirm_move(), Err(TurnError::SubmissionInFlight));

        tokio::time::sleep(Duration::from_secs(2)).await;
        settle(&mut ctrl).await;
        let state = ctrl.game_state();
        assert_eq!(state.selection, Selection::None);
        assert_eq!(state.view.as_ref().unwrap().value, 19);
        assert!(!state.is_our_turn());
        assert_eq!(remote.submitted.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_turn_never_reaches_the_network() {
        let (mut ctrl, remote, _store) = playing(live(56, "P2")).await;

        assert_eq!(ctrl.select_move(Move::Hold), Err(TurnError::NotYourTurn));
        assert_eq!(ctrl.confirm_move(), Err(TurnError::NothingSelected));
        settle(&mut ctrl).await;
        assert!(remote.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_move_surfaces_error() {
        let (mut ctrl, remote, _store) = playing(live(56, "P1")).await;
        FakeRemote::script(
            &remote.moves,
            Fetch::HttpError {
                status: 400,
                body: r#"{"message":"Invalid move"}"#.into(),
            },
        );

        ctrl.select_move(Move::Hold).unwrap();
        ctrl.confirm_move().unwrap();
        settle(&mut ctrl).await;

        let state = ctrl.game_state();
        assert_eq!(state.error.as_deref(), Some("Failed to make move: Invalid move"));
        assert_eq!(state.selection, Selection::None);
        assert_eq!(state.view.as_ref().unwrap().value, 56);
        assert!(state.is_our_turn());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_poll_changes_nothing() {
        let (mut ctrl, remote, _store) = playing(live(56, "P1")).await;
        let before = ctrl.game_state().view.clone();

        FakeRemote::script(&remote.games, Fetch::Empty);
        FakeRemote::script(&remote.games, Fetch::NetworkError("timeout".into()));
        tokio::time::sleep(POLL * 2).await;
        settle(&mut ctrl).await;

        assert_eq!(ctrl.game_state().view, before);
        assert_eq!(ctrl.game_state().phase, Phase::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn vanished_game_returns_to_matchmaking() {
        let (mut ctrl, remote, store) = controller(stored(Some("P1"), Some("g1")));
        FakeRemote::script(
            &remote.games,
            Fetch::HttpError {
                status: 404,
                body: String::new(),
            },
        );

        ctrl.start();
        settle(&mut ctrl).await;

        assert_eq!(ctrl.game_state().phase, Phase::Searching);
        assert_eq!(store.load(), stored(Some("P1"), None));
        assert_eq!(
            ctrl.poll_target(),
            Some(&PollTarget::Matchmaking {
                player_id: "P1".into()
            })
        );
        assert_eq!(remote.register_calls.load(Ordering::SeqCst), 0);
        assert!(ctrl.game_state().events.contains(&GameEvent::GameVanished));
    }

    #[tokio::test(start_paused = true)]
    async fn completion_stops_polling() {
        for (winner, outcome) in [("P1", Outcome::Won), ("P2", Outcome::Lost)] {
            let (mut ctrl, remote, store) = controller(stored(Some("P1"), Some("g1")));
            FakeRemote::script(
                &remote.games,
                Fetch::Ok(snap(1, 2, None, GameStatus::Completed, Some(winner))),
            );

            ctrl.start();
            settle(&mut ctrl).await;

            assert_eq!(ctrl.game_state().phase, Phase::Finished(outcome));
            assert_eq!(store.load(), stored(Some("P1"), None));
            assert!(!ctrl.is_polling());

            let calls = remote.game_calls.load(Ordering::SeqCst);
            tokio::time::sleep(POLL * 4).await;
            settle(&mut ctrl).await;
            assert_eq!(remote.game_calls.load(Ordering::SeqCst), calls);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn play_again_keeps_identity() {
        let (mut ctrl, remote, store) = controller(stored(Some("P1"), Some("g1")));
        FakeRemote::script(
            &remote.games,
            Fetch::Ok(snap(1, 2, None, GameStatus::Completed, Some("P1"))),
        );
        ctrl.start();
        settle(&mut ctrl).await;

        ctrl.play_again();
        assert_eq!(ctrl.game_state().phase, Phase::Searching);
        assert_eq!(store.player_id().as_deref(), Some("P1"));
        assert_eq!(remote.register_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn valid_stored_identity_is_reused() {
        let (mut ctrl, remote, _store) = controller(stored(Some("P1"), None));
        FakeRemote::script(&remote.players, Fetch::Ok(PlayerInfo::new("P1", "alice")));

        ctrl.start();
        settle(&mut ctrl).await;

        assert_eq!(ctrl.game_state().phase, Phase::Searching);
        assert_eq!(ctrl.game_state().our_player_id.as_deref(), Some("P1"));
        assert_eq!(remote.register_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_identity_registers_again() {
        let (mut ctrl, remote, store) = controller(stored(Some("P9"), None));
        FakeRemote::script(
            &remote.players,
            Fetch::HttpError {
                status: 404,
                body: String::new(),
            },
        );
        FakeRemote::script(&remote.registers, Fetch::Ok(RegisterResponse { player_id: "P1".into() }));

        ctrl.start();
        settle(&mut ctrl).await;

        assert_eq!(ctrl.game_state().phase, Phase::Searching);
        assert_eq!(store.player_id().as_deref(), Some("P1"));
        assert_eq!(remote.register_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn registration_failure_can_be_retried() {
        let (mut ctrl, remote, store) = controller(StoredSession::default());

        ctrl.start();
        settle(&mut ctrl).await;
        assert_eq!(
            ctrl.game_state().phase,
            Phase::Failed(REGISTRATION_FAILED.to_string())
        );
        assert_eq!(store.player_id(), None);
        assert!(!ctrl.is_polling());

        FakeRemote::script(&remote.registers, Fetch::Ok(RegisterResponse { player_id: "P1".into() }));
        ctrl.retry();
        settle(&mut ctrl).await;
        assert_eq!(ctrl.game_state().phase, Phase::Searching);
    }

    #[tokio::test(start_paused = true)]
    async fn blank_name_fails_without_request() {
        let remote = Arc::new(FakeRemote::default());
        let store = Arc::new(MemoryStore::new());
        let mut ctrl = ClientController::new(Arc::clone(&remote), store, POLL, "   ");

        ctrl.start();
        settle(&mut ctrl).await;
        assert!(matches!(ctrl.game_state().phase, Phase::Failed(_)));
        assert_eq!(remote.register_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn results_after_cancel_are_dropped() {
        let (mut ctrl, remote, store) = controller(StoredSession::default());
        FakeRemote::script(&remote.registers, Fetch::Ok(RegisterResponse { player_id: "P1".into() }));

        ctrl.start();
        ctrl.cancel_search();
        settle(&mut ctrl).await;

        assert_eq!(ctrl.game_state().phase, Phase::Idle);
        assert_eq!(ctrl.game_state().our_player_id, None);
        assert_eq!(store.load(), StoredSession::default());
        assert!(!ctrl.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn leave_forgets_everything() {
        let (mut ctrl, _remote, store) = playing(live(56, "P1")).await;
        ctrl.leave();
        assert_eq!(ctrl.game_state().phase, Phase::Idle);
        assert!(ctrl.game_state().view.is_none());
        assert_eq!(store.load(), StoredSession::default());
        assert!(!ctrl.is_polling());
    }
}
