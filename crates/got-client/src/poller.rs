//! Background request tasks.
//!
//! Network I/O never runs inside the controller. Interval pollers and
//! one-shot requests are spawned tasks that report through an unbounded
//! channel, each message tagged with the epoch it was started in, so the
//! controller can drop anything that outlived the phase that asked for it.
//!
//! Game-state requests also carry a [`SnapshotSeq`] number drawn when the
//! request is issued, so responses that arrive out of order can be told
//! apart.
//!
//! A [`Poller`] owns its task: dropping it aborts the task, which also
//! cancels the interval timer.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use got_core::protocol::{GameSnapshot, Move, MoveAck, PlayerInfo, RegisterResponse};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::remote::{Fetch, RemoteClient};

/// A completed request, as delivered to the controller.
#[derive(Debug)]
pub enum Incoming {
    /// Verification of a stored participant id.
    Identity {
        epoch: u64,
        player_id: String,
        fetch: Fetch<PlayerInfo>,
    },
    Registered {
        epoch: u64,
        fetch: Fetch<RegisterResponse>,
    },
    /// One matchmaking lookup.
    Lookup {
        epoch: u64,
        fetch: Fetch<GameSnapshot>,
    },
    /// One game-state fetch (scheduled or out of cycle).
    Snapshot {
        epoch: u64,
        seq: u64,
        fetch: Fetch<GameSnapshot>,
    },
    MoveResult {
        epoch: u64,
        delta: Move,
        fetch: Fetch<MoveAck>,
    },
}

impl Incoming {
    pub fn epoch(&self) -> u64 {
        match self {
            Incoming::Identity { epoch, .. }
            | Incoming::Registered { epoch, .. }
            | Incoming::Lookup { epoch, .. }
            | Incoming::Snapshot { epoch, .. }
            | Incoming::MoveResult { epoch, .. } => *epoch,
        }
    }
}

/// Issue order of game-state requests, shared by the interval poller and
/// out-of-cycle refreshes. The first number handed out is 1.
#[derive(Debug, Clone, Default)]
pub struct SnapshotSeq(Arc<AtomicU64>);

impl SnapshotSeq {
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// What an interval poller asks for on every tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollTarget {
    Matchmaking { player_id: String },
    Game { game_id: String },
}

/// Handle to a running interval poller.
#[derive(Debug)]
pub struct Poller {
    target: PollTarget,
    handle: JoinHandle<()>,
}

impl Poller {
    pub fn target(&self) -> &PollTarget {
        &self.target
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Start polling `target` every `period`, first request immediately.
///
/// Requests from one poller never overlap: a slow response delays the next
/// tick instead of stacking another request behind it. Game-state requests
/// draw their sequence number from `seq` just before going out.
pub fn spawn_poller<R: RemoteClient>(
    remote: Arc<R>,
    target: PollTarget,
    epoch: u64,
    seq: SnapshotSeq,
    period: Duration,
    tx: mpsc::UnboundedSender<Incoming>,
) -> Poller {
    let task_target = target.clone();
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let msg = match &task_target {
                PollTarget::Matchmaking { player_id } => Incoming::Lookup {
                    epoch,
                    fetch: remote.matchmaking(player_id).await,
                },
                PollTarget::Game { game_id } => {
                    let seq = seq.next();
                    Incoming::Snapshot {
                        epoch,
                        seq,
                        fetch: remote.fetch_game(game_id).await,
                    }
                }
            };
            if tx.send(msg).is_err() {
                debug!(epoch, "controller gone, poller exiting");
                break;
            }
        }
    });
    Poller { target, handle }
}

/// Run a single request in the background and deliver its result.
pub fn spawn_once<F>(tx: mpsc::UnboundedSender<Incoming>, request: F)
where
    F: Future<Output = Incoming> + Send + 'static,
{
    tokio::spawn(async move {
        let msg = request.await;
        // A closed channel means the controller is gone; nothing to apply.
        let _ = tx.send(msg);
    });
}
