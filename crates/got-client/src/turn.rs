//! Turn controller: `no-selection → selected → submitting → no-selection`.
//!
//! Gates move submission on turn ownership and on there being no request
//! already in flight. Every rejection happens here, before any network call.
//!
//! An accepted move stays `submitting` until a game-state request issued
//! after the acceptance has been applied. Until then the view still shows
//! the turn we just played.

use got_core::game_state::{Outcome, Selection, SessionView};
use got_core::protocol::{GameStatus, Move, MoveAck, ServiceError};
use thiserror::Error;

use crate::remote::Fetch;

/// Shown when a submission failed without a usable explanation.
pub const MOVE_FAILED_GENERIC: &str = "Error making move. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TurnError {
    #[error("it is not your turn")]
    NotYourTurn,

    #[error("the game is not in progress")]
    NotInProgress,

    #[error("no move selected")]
    NothingSelected,

    #[error("a move is already being submitted")]
    SubmissionInFlight,

    #[error("no active game")]
    NoActiveGame,
}

#[derive(Debug, Clone, Default)]
pub struct TurnController {
    selection: Selection,
    error: Option<String>,
    /// Set after an accepted move: the snapshot sequence that releases it.
    settles_at: Option<u64>,
}

impl TurnController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// User-visible error from the last submission.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Stage `delta`. Re-selecting replaces an earlier choice.
    pub fn select(&mut self, view: Option<&SessionView>, delta: Move) -> Result<(), TurnError> {
        if self.selection.is_submitting() {
            return Err(TurnError::SubmissionInFlight);
        }
        Self::check_turn(view)?;
        self.selection = Selection::Selected(delta);
        Ok(())
    }

    /// Drop a staged move. Has no effect while submitting.
    pub fn clear_selection(&mut self) -> bool {
        match self.selection {
            Selection::Selected(_) => {
                self.selection = Selection::None;
                true
            }
            _ => false,
        }
    }

    /// Move the staged choice on the wire.
    ///
    /// Returns the move to submit; the caller must report the outcome
    /// through [`finish`](Self::finish).
    pub fn confirm(&mut self, view: Option<&SessionView>) -> Result<Move, TurnError> {
        let delta = match self.selection {
            Selection::Submitting(_) => return Err(TurnError::SubmissionInFlight),
            Selection::None => return Err(TurnError::NothingSelected),
            Selection::Selected(delta) => delta,
        };
        if let Err(e) = Self::check_turn(view) {
            self.selection = Selection::None;
            return Err(e);
        }
        self.error = None;
        self.selection = Selection::Submitting(delta);
        Ok(delta)
    }

    /// Apply the submission outcome. Returns `true` if the service accepted
    /// the move.
    ///
    /// Any 2xx counts as accepted, whatever the body; the selection then
    /// stays `submitting` until [`await_snapshot`](Self::await_snapshot) is
    /// satisfied. Failures are kept as the user-visible error; nothing is
    /// retried.
    pub fn finish(&mut self, fetch: &Fetch<MoveAck>) -> bool {
        if fetch.is_success() {
            return true;
        }
        self.selection = Selection::None;
        self.error = Some(match fetch {
            Fetch::HttpError { body, .. } => match ServiceError::describe(body) {
                Some(message) => format!("Failed to make move: {message}"),
                None => MOVE_FAILED_GENERIC.to_string(),
            },
            _ => MOVE_FAILED_GENERIC.to_string(),
        });
        false
    }

    /// Hold an accepted move until the view comes from request `seq` or a
    /// later one.
    pub fn await_snapshot(&mut self, seq: u64) {
        self.settles_at = Some(seq);
    }

    /// Called with the sequence behind the current view. Returns `true` if
    /// that releases an accepted move.
    pub fn on_snapshot(&mut self, view_seq: u64) -> bool {
        match self.settles_at {
            Some(seq) if view_seq >= seq => {
                self.settles_at = None;
                self.selection = Selection::None;
                true
            }
            _ => false,
        }
    }

    /// React to a fresh view: a staged move is dropped once it can no
    /// longer be played. Returns `true` if the selection changed.
    pub fn on_view(&mut self, view: &SessionView) -> bool {
        if matches!(self.selection, Selection::Selected(_)) && !view.can_move() {
            self.selection = Selection::None;
            return true;
        }
        false
    }

    /// Forget selection and error (new game, navigation away).
    pub fn reset(&mut self) {
        self.selection = Selection::None;
        self.error = None;
        self.settles_at = None;
    }

    fn check_turn(view: Option<&SessionView>) -> Result<(), TurnError> {
        let view = view.ok_or(TurnError::NoActiveGame)?;
        if view.status != GameStatus::InProgress || view.outcome != Outcome::InProgress {
            return Err(TurnError::NotInProgress);
        }
        if !view.is_our_turn() {
            return Err(TurnError::NotYourTurn);
        }
        Ok(())
    }
}
