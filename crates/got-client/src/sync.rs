//! Session synchronizer: keeps the local view of one game in step with the
//! service.
//!
//! A [`Synchronizer`] is bound to exactly one game handle and one identity.
//! Each fetch result goes through [`Synchronizer::apply`], which replaces the
//! snapshot wholesale, rederives the [`SessionView`], and tells the caller
//! whether the game ended or disappeared. Once either happens the
//! synchronizer is terminal and ignores everything after.
//!
//! Results carry the sequence number their request was issued with. A
//! result older than the newest one already seen is dropped, so a slow
//! poll can never roll the view back past a later one.

use got_core::game_state::{Outcome, SessionView, StateChanged};
use got_core::protocol::{GameSnapshot, GameStatus};
use tracing::debug;

use crate::remote::Fetch;

/// What the controller should do after one game-state result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStep {
    /// No visible change; wait for the next tick.
    Unchanged,
    /// The view changed.
    Updated(StateChanged),
    /// The game finished. Clear the stored handle and stop polling.
    Completed {
        outcome: Outcome,
        changed: StateChanged,
    },
    /// The service no longer knows the game. Clear the stored handle, stop
    /// polling, return to matchmaking.
    Vanished,
    /// The result was for another game, arrived out of order, or this game
    /// is already over.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct Synchronizer {
    game_id: String,
    identity: String,
    view: Option<SessionView>,
    /// Newest request sequence seen; anything older is stale.
    newest: u64,
    /// Sequence of the request that produced the current view.
    view_seq: u64,
    terminal: bool,
}

impl Synchronizer {
    pub fn new(game_id: &str, identity: &str) -> Self {
        Self {
            game_id: game_id.to_string(),
            identity: identity.to_string(),
            view: None,
            newest: 0,
            view_seq: 0,
            terminal: false,
        }
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn view(&self) -> Option<&SessionView> {
        self.view.as_ref()
    }

    /// Sequence number of the request behind the current view, 0 before
    /// the first snapshot.
    pub fn view_seq(&self) -> u64 {
        self.view_seq
    }

    /// True once the game completed or vanished.
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Treat every result issued before `seq` as stale.
    pub fn discard_before(&mut self, seq: u64) {
        self.newest = self.newest.max(seq);
    }

    /// Apply one fetch of the game-state endpoint, issued as request `seq`.
    pub fn apply(&mut self, seq: u64, fetch: Fetch<GameSnapshot>) -> SyncStep {
        if self.terminal {
            return SyncStep::Ignored;
        }
        if seq < self.newest {
            debug!(game = %self.game_id, seq, newest = self.newest, "dropping out-of-order result");
            return SyncStep::Ignored;
        }
        self.newest = seq;
        match fetch {
            Fetch::Ok(snapshot) => self.replace(seq, snapshot),
            Fetch::HttpError { status: 404, .. } => {
                debug!(game = %self.game_id, "game vanished");
                self.terminal = true;
                SyncStep::Vanished
            }
            other => {
                debug!(game = %self.game_id, result = other.kind(), "no update this tick");
                SyncStep::Unchanged
            }
        }
    }

    /// Apply a snapshot obtained elsewhere (the matchmaking result).
    pub fn apply_snapshot(&mut self, seq: u64, snapshot: GameSnapshot) -> SyncStep {
        self.apply(seq, Fetch::Ok(snapshot))
    }

    fn replace(&mut self, seq: u64, snapshot: GameSnapshot) -> SyncStep {
        if snapshot.id != self.game_id {
            debug!(expected = %self.game_id, got = %snapshot.id, "snapshot for another game");
            return SyncStep::Ignored;
        }

        let view = SessionView::derive(&snapshot, &self.identity);
        let changed = StateChanged::between(self.view.as_ref(), &view);
        let completed = snapshot.status == GameStatus::Completed;
        let outcome = view.outcome;

        self.view = Some(view);
        self.view_seq = seq;

        if completed {
            self.terminal = true;
            return SyncStep::Completed { outcome, changed };
        }
        if changed.any() {
            SyncStep::Updated(changed)
        } else {
            SyncStep::Unchanged
        }
    }
}
