use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A participant as the game service reports it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_looking_for_game: Option<bool>,
}

impl PlayerInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_looking_for_game: None,
        }
    }
}

/// Lifecycle of a match on the service side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameStatus {
    #[serde(rename = "WAITING_FOR_PLAYERS", alias = "AWAITING_OPPONENT")]
    AwaitingOpponent,
    #[serde(rename = "IN_PROGRESS")]
    InProgress,
    #[serde(rename = "COMPLETED")]
    Completed,
}

impl GameStatus {
    pub fn label(self) -> &'static str {
        match self {
            GameStatus::AwaitingOpponent => "Waiting for opponent",
            GameStatus::InProgress => "In progress",
            GameStatus::Completed => "Completed",
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Full remote game state as of one poll.
///
/// Snapshots are never merged: a newer one replaces the older wholesale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub id: String,
    #[serde(default)]
    pub players: Vec<PlayerInfo>,
    #[serde(default)]
    pub current_player: Option<PlayerInfo>,
    #[serde(default)]
    pub current_number: i64,
    pub status: GameStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub winner: Option<PlayerInfo>,
}

impl GameSnapshot {
    /// Id of the participant holding the current turn, if any.
    pub fn current_player_id(&self) -> Option<&str> {
        self.current_player.as_ref().map(|p| p.id.as_str())
    }

    pub fn winner_id(&self) -> Option<&str> {
        self.winner.as_ref().map(|p| p.id.as_str())
    }

    /// True once the match has two participants and is being played.
    pub fn is_ready(&self) -> bool {
        self.status == GameStatus::InProgress && self.players.len() == 2
    }
}

/// Body of the registration request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub player_name: String,
}

/// Body returned when a participant has been registered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub player_id: String,
}

/// Form fields of a move submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MoveForm {
    pub game_id: String,
    pub player_id: String,
    #[serde(rename = "move")]
    pub delta: i64,
}

/// Acknowledgement returned by the move endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MoveAck {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub game: Option<GameSnapshot>,
}

/// Error body produced by the game service.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceError {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub status: Option<u16>,
}

impl ServiceError {
    /// Best human-readable text carried by an error body.
    ///
    /// Prefers the structured `message`, then `error`, then the raw body.
    /// Returns `None` for a blank body.
    pub fn describe(body: &str) -> Option<String> {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return None;
        }
        match serde_json::from_str::<ServiceError>(trimmed) {
            Ok(err) => err
                .message
                .filter(|m| !m.trim().is_empty())
                .or(err.error.filter(|e| !e.trim().is_empty()))
                .or_else(|| Some(trimmed.to_string())),
            Err(_) => Some(trimmed.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Moves
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid move {0}: only -1, 0 and +1 are allowed")]
pub struct InvalidMove(pub i64);

/// One of the three deltas a participant may add before dividing by three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Move {
    Decrement,
    Hold,
    Increment,
}

impl Move {
    /// All moves in display order.
    pub const ALL: [Move; 3] = [Move::Decrement, Move::Hold, Move::Increment];

    pub fn delta(self) -> i64 {
        match self {
            Move::Decrement => -1,
            Move::Hold => 0,
            Move::Increment => 1,
        }
    }

    /// The value after this move, if `value + delta` divides by three.
    ///
    /// Only a display aid; the game service decides legality.
    pub fn preview(self, value: i64) -> Option<i64> {
        let sum = value.checked_add(self.delta())?;
        (sum % 3 == 0).then_some(sum / 3)
    }
}

impl TryFrom<i64> for Move {
    type Error = InvalidMove;

    fn try_from(delta: i64) -> Result<Self, Self::Error> {
        match delta {
            -1 => Ok(Move::Decrement),
            0 => Ok(Move::Hold),
            1 => Ok(Move::Increment),
            other => Err(InvalidMove(other)),
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Move::Decrement => f.write_str("-1"),
            Move::Hold => f.write_str("0"),
            Move::Increment => f.write_str("+1"),
        }
    }
}

// ---------------------------------------------------------------------------
// Player name validation
// ---------------------------------------------------------------------------

/// Validate a player name before registering it.
///
/// Names must be non-empty after trimming and fewer than 32 characters.
pub fn validate_player_name(name: &str) -> Result<(), String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("Please enter your name".to_string());
    }
    if trimmed.chars().count() >= 32 {
        return Err("Name must be fewer than 32 characters".to_string());
    }
    Ok(())
}
