//! Matchmaking state machine: `Idle → Searching → Matched | Failed`.
//!
//! Pure transitions only. The controller owns the interval poller and feeds
//! each lookup result into [`Matchmaker::on_lookup`]; the returned
//! [`LookupStep`] says what to persist and whether to stop polling.

use got_core::protocol::{GameSnapshot, GameStatus, PlayerInfo, RegisterResponse, ServiceError};
use tracing::debug;

use crate::remote::Fetch;

/// Shown when registration fails for a reason the service did not explain.
pub const REGISTRATION_FAILED: &str = "Error creating player. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchState {
    Idle,
    Searching { player_id: String },
    Matched { player_id: String, game_id: String },
    Failed { message: String },
}

/// What the controller should do with one lookup result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupStep {
    /// Nothing to do; try again next tick.
    KeepSearching,
    /// A match slot was opened for us but the opponent has not joined.
    /// Persist the handle and keep polling.
    Waiting { game_id: String },
    /// Paired. Persist the handle, stop polling, start the session.
    Matched(GameSnapshot),
    /// The driver is not searching; the result is stale.
    Ignored,
}

/// Whether a stored participant id can be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityCheck {
    Reuse,
    /// The service does not know the id any more; register again.
    Stale,
}

#[derive(Debug, Clone)]
pub struct Matchmaker {
    state: MatchState,
    /// Handle of a half-filled match slot we already reported.
    waiting_on: Option<String>,
}

impl Default for Matchmaker {
    fn default() -> Self {
        Self::new()
    }
}

impl Matchmaker {
    pub fn new() -> Self {
        Self {
            state: MatchState::Idle,
            waiting_on: None,
        }
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    pub fn is_searching(&self) -> bool {
        matches!(self.state, MatchState::Searching { .. })
    }

    /// Enter `Searching` for an identity we already hold.
    pub fn begin(&mut self, player_id: &str) {
        self.waiting_on = None;
        self.state = MatchState::Searching {
            player_id: player_id.to_string(),
        };
    }

    /// Apply the registration response.
    ///
    /// Success enters `Searching` and returns the new participant id; any
    /// other outcome enters `Failed` and returns the message to show.
    pub fn on_registration(&mut self, fetch: Fetch<RegisterResponse>) -> Result<String, String> {
        match fetch {
            Fetch::Ok(RegisterResponse { player_id }) if !player_id.trim().is_empty() => {
                self.begin(&player_id);
                Ok(player_id)
            }
            Fetch::HttpError { status, body } if (400..500).contains(&status) => {
                let message = ServiceError::describe(&body)
                    .map(|m| format!("Registration rejected: {m}"))
                    .unwrap_or_else(|| REGISTRATION_FAILED.to_string());
                Err(self.fail(message))
            }
            other => {
                debug!(result = other.kind(), "registration did not yield a player id");
                Err(self.fail(REGISTRATION_FAILED.to_string()))
            }
        }
    }

    /// Decide whether a stored participant id is still valid.
    pub fn check_identity(fetch: &Fetch<PlayerInfo>) -> IdentityCheck {
        if fetch.is_not_found() {
            IdentityCheck::Stale
        } else {
            IdentityCheck::Reuse
        }
    }

    /// Apply one matchmaking lookup result.
    pub fn on_lookup(&mut self, fetch: Fetch<GameSnapshot>) -> LookupStep {
        let MatchState::Searching { player_id } = &self.state else {
            return LookupStep::Ignored;
        };
        let player_id = player_id.clone();

        match fetch {
            Fetch::Ok(snapshot) if snapshot.is_ready() => {
                self.state = MatchState::Matched {
                    player_id,
                    game_id: snapshot.id.clone(),
                };
                self.waiting_on = None;
                LookupStep::Matched(snapshot)
            }
            Fetch::Ok(snapshot) if snapshot.status == GameStatus::InProgress => {
                if self.waiting_on.as_deref() == Some(snapshot.id.as_str()) {
                    return LookupStep::KeepSearching;
                }
                self.waiting_on = Some(snapshot.id.clone());
                LookupStep::Waiting {
                    game_id: snapshot.id,
                }
            }
            // Any other status, blank or broken bodies, 404 ("nothing yet"),
            // other HTTP errors and dropped requests: the next tick retries.
            other => {
                debug!(result = other.kind(), "no match yet");
                LookupStep::KeepSearching
            }
        }
    }

    /// Stop searching (navigation away or explicit cancel).
    pub fn cancel(&mut self) {
        self.waiting_on = None;
        self.state = MatchState::Idle;
    }

    fn fail(&mut self, message: String) -> String {
        self.waiting_on = None;
        self.state = MatchState::Failed {
            message: message.clone(),
        };
        message
    }
}
