//! Client orchestrator: wires the HTTP remote, the controller, and the TUI.
//!
//! This module owns the event loop. Background results are applied through
//! [`ClientController::recv`]; keyboard input is polled between them.

use std::sync::Arc;

use got_client::client_controller::{ClientController, PollResult};
use got_client::config::ClientConfig;
use got_client::remote::HttpRemote;
use got_client::store::IdentityStore;
use got_core::game_state::LogCategory;

use crate::tui::{Tui, UserIntent};

type Controller = ClientController<HttpRemote, Arc<dyn IdentityStore>>;

/// Start the client against the service described by `config`.
///
/// With a name, or with a participant id left over from an earlier run, the
/// game flow starts immediately; otherwise the main menu asks for a name.
pub async fn start_client(
    config: ClientConfig,
    store: Arc<dyn IdentityStore>,
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let interval = config.poll_interval;
    let remote = Arc::new(HttpRemote::new(config)?);
    let auto_start = !name.trim().is_empty() || store.player_id().is_some();
    let mut ctrl = ClientController::new(remote, store, interval, name);

    if auto_start {
        ctrl.start();
    }

    let mut tui = Tui::setup(name)?;
    let result = run_event_loop(&mut tui, &mut ctrl).await;
    tui.teardown()?;
    result
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

async fn run_event_loop(
    tui: &mut Tui,
    ctrl: &mut Controller,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        tui.render(&ctrl.state)?;

        let timeout = tokio::time::Duration::from_millis(50);

        tokio::select! {
            poll = ctrl.recv() => {
                if let PollResult::Updated(changed) = poll
                    && changed.selection
                {
                    tui.on_selection_changed(&ctrl.state);
                }
            }

            _ = tokio::time::sleep(timeout) => {
                match tui.poll_and_handle_input(&ctrl.state)? {
                    UserIntent::Quit => break,
                    UserIntent::None => {}
                    intent => apply_intent(ctrl, intent),
                }
            }
        }
    }

    Ok(())
}

fn apply_intent(ctrl: &mut Controller, intent: UserIntent) {
    match intent {
        UserIntent::Start(name) => {
            if ctrl.set_name(&name) {
                ctrl.start();
            }
        }
        UserIntent::Select(delta) => {
            if let Err(e) = ctrl.select_move(delta) {
                ctrl.add_message(format!("Cannot select {delta}: {e}"), LogCategory::Error);
            }
        }
        UserIntent::Confirm(delta) => {
            let staged = ctrl.state.selection.pending() == Some(delta);
            let result = if staged {
                ctrl.confirm_move()
            } else {
                ctrl.select_move(delta).and_then(|_| ctrl.confirm_move())
            };
            if let Err(e) = result {
                ctrl.add_message(format!("Cannot submit: {e}"), LogCategory::Error);
            }
        }
        UserIntent::ClearSelection => {
            ctrl.clear_selection();
        }
        UserIntent::CancelSearch => {
            ctrl.cancel_search();
        }
        UserIntent::PlayAgain => {
            ctrl.play_again();
        }
        UserIntent::MainMenu => {
            ctrl.leave();
        }
        UserIntent::Retry => {
            ctrl.retry();
        }
        UserIntent::Feedback(text, category) => ctrl.add_message(text, category),
        UserIntent::Quit | UserIntent::None => {}
    }
}
