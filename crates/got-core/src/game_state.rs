use std::collections::VecDeque;

use crate::protocol::{GameSnapshot, GameStatus, Move};

/// Semantic category for log/event messages. The UI layer decides how to style each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCategory {
    System,
    Action,
    Winner,
    Error,
    Info,
}

/// A structured client event. Frontends render these however they see fit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    /// The service assigned us a participant id.
    Registered { player_id: String },
    /// A stored participant id is being reused.
    Resumed { player_id: String },
    /// Matchmaking started for our participant id.
    Searching,
    /// A match slot exists but the second participant has not joined yet.
    WaitingForOpponent { game_id: String },
    /// Two participants were paired.
    MatchFound { game_id: String, opponent: String },
    /// It became our turn.
    YourTurn { value: i64 },
    /// It became the opponent's turn.
    OpponentTurn { name: String, value: i64 },
    /// A move was sent to the service.
    MoveSent { delta: Move },
    /// The service accepted the move.
    MoveAccepted { delta: Move },
    /// The service rejected the move (or it never arrived).
    MoveRejected { message: String },
    /// The game finished.
    GameOver { won: bool, winner_name: String },
    /// The service no longer knows our game.
    GameVanished,
    /// Registration or another unrecoverable step failed.
    Failed { message: String },
    /// Generic local feedback.
    Text { text: String, category: LogCategory },
}

impl GameEvent {
    /// Semantic category for styling purposes.
    pub fn category(&self) -> LogCategory {
        match self {
            Self::Registered { .. }
            | Self::Resumed { .. }
            | Self::Searching
            | Self::WaitingForOpponent { .. }
            | Self::MatchFound { .. }
            | Self::YourTurn { .. } => LogCategory::System,

            Self::OpponentTurn { .. } => LogCategory::Info,
            Self::MoveSent { .. } | Self::MoveAccepted { .. } => LogCategory::Action,
            Self::GameOver { .. } => LogCategory::Winner,

            Self::MoveRejected { .. } | Self::GameVanished | Self::Failed { .. } => {
                LogCategory::Error
            }

            Self::Text { category, .. } => *category,
        }
    }
}

/// Whose move it is from the local participant's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Turn {
    Ours,
    Theirs,
}

/// Result of the match for the local participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    InProgress,
    Won,
    Lost,
}

impl Outcome {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Outcome::InProgress)
    }
}

/// Presentation-oriented projection of a [`GameSnapshot`] for one participant.
///
/// Always recomputed from the latest snapshot, never edited in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub game_id: String,
    pub value: i64,
    pub status: GameStatus,
    pub turn: Turn,
    pub outcome: Outcome,
    pub our_name: String,
    pub opponent_name: String,
}

impl SessionView {
    /// Derive the view of `snapshot` as seen by participant `identity`.
    pub fn derive(snapshot: &GameSnapshot, identity: &str) -> Self {
        let turn = if snapshot.current_player_id() == Some(identity) {
            Turn::Ours
        } else {
            Turn::Theirs
        };

        let outcome = match snapshot.status {
            GameStatus::Completed if snapshot.winner_id() == Some(identity) => Outcome::Won,
            GameStatus::Completed => Outcome::Lost,
            _ => Outcome::InProgress,
        };

        let our_name = snapshot
            .players
            .iter()
            .find(|p| p.id == identity)
            .map(|p| p.name.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "You".to_string());
        let opponent_name = snapshot
            .players
            .iter()
            .find(|p| p.id != identity)
            .map(|p| p.name.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "Opponent".to_string());

        Self {
            game_id: snapshot.id.clone(),
            value: snapshot.current_number,
            status: snapshot.status,
            turn,
            outcome,
            our_name,
            opponent_name,
        }
    }

    pub fn is_our_turn(&self) -> bool {
        self.turn == Turn::Ours
    }

    /// True when the local participant may stage and submit a move.
    pub fn can_move(&self) -> bool {
        self.is_our_turn()
            && self.status == GameStatus::InProgress
            && self.outcome == Outcome::InProgress
    }

    /// Name of the winner, from our point of view.
    pub fn winner_name(&self) -> &str {
        match self.outcome {
            Outcome::Won => &self.our_name,
            _ => &self.opponent_name,
        }
    }
}

/// Describes what changed after applying one event to the client state.
///
/// Frontends can inspect these flags to decide what to re-render.
/// All flags default to `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateChanged {
    /// The current number changed.
    pub value: bool,
    /// Turn ownership changed.
    pub turn: bool,
    /// The match finished.
    pub outcome: bool,
    /// Participant names changed (new match).
    pub players: bool,
    /// The lifecycle phase changed (searching, playing, finished, ...).
    pub phase: bool,
    /// The pending selection or the error line changed.
    pub selection: bool,
}

impl StateChanged {
    /// Returns `true` if any flag is set.
    pub fn any(self) -> bool {
        self.value || self.turn || self.outcome || self.players || self.phase || self.selection
    }

    /// Flags describing the difference between two views.
    pub fn between(old: Option<&SessionView>, new: &SessionView) -> Self {
        match old {
            None => Self {
                value: true,
                turn: true,
                outcome: new.outcome.is_terminal(),
                players: true,
                phase: false,
                selection: false,
            },
            Some(old) => Self {
                value: old.value != new.value,
                turn: old.turn != new.turn,
                outcome: old.outcome != new.outcome,
                players: old.our_name != new.our_name || old.opponent_name != new.opponent_name,
                phase: false,
                selection: false,
            },
        }
    }
}

/// Where the client is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// Nothing started yet.
    Idle,
    /// Registering (or verifying) the participant id.
    Registering,
    /// Polling the matchmaking lookup.
    Searching,
    /// A match exists and its state is being polled.
    Playing,
    /// The match is over.
    Finished(Outcome),
    /// Registration failed; the participant may retry.
    Failed(String),
}

/// Move staged by the participant, and whether it is on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Selection {
    #[default]
    None,
    Selected(Move),
    Submitting(Move),
}

impl Selection {
    pub fn pending(self) -> Option<Move> {
        match self {
            Selection::None => None,
            Selection::Selected(m) | Selection::Submitting(m) => Some(m),
        }
    }

    pub fn is_submitting(self) -> bool {
        matches!(self, Selection::Submitting(_))
    }
}

/// Everything a frontend needs to draw the client.
#[derive(Debug, Clone)]
pub struct ClientGameState {
    /// Structured client events, newest last.
    pub events: VecDeque<GameEvent>,
    pub phase: Phase,
    /// Local participant id, once registered.
    pub our_player_id: Option<String>,
    /// Name entered by the participant.
    pub our_name: String,
    /// Derived view of the latest snapshot of the active game.
    pub view: Option<SessionView>,
    pub selection: Selection,
    /// User-visible error from the last move submission.
    pub error: Option<String>,
}

impl ClientGameState {
    pub fn new(name: &str) -> Self {
        let mut events = VecDeque::new();
        events.push_back(GameEvent::Text {
            text: "Welcome to Game of Three!".to_string(),
            category: LogCategory::System,
        });
        Self {
            events,
            phase: Phase::Idle,
            our_player_id: None,
            our_name: name.to_string(),
            view: None,
            selection: Selection::None,
            error: None,
        }
    }

    /// Append a game event, keeping only the last 100 entries.
    pub fn add_event(&mut self, event: GameEvent) {
        self.events.push_back(event);
        if self.events.len() > 100 {
            self.events.pop_front();
        }
    }

    /// Convenience: append a [`GameEvent::Text`] for ad-hoc messages.
    pub fn add_message(&mut self, text: String, category: LogCategory) {
        self.add_event(GameEvent::Text { text, category });
    }

    pub fn is_our_turn(&self) -> bool {
        self.view.as_ref().is_some_and(SessionView::is_our_turn)
    }

    pub fn can_move(&self) -> bool {
        self.view.as_ref().is_some_and(SessionView::can_move)
    }

    pub fn outcome(&self) -> Outcome {
        self.view
            .as_ref()
            .map(|v| v.outcome)
            .unwrap_or(Outcome::InProgress)
    }
}
