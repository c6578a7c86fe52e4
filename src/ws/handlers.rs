//! Session command dispatch
//!
//! Commands arrive already bound to a (room, player) pair. Host-only
//! commands are gate-checked here before the service re-validates them.
//! The return value, if any, is unicast to the calling connection; all
//! other fan-out happens inside the service operations.

use super::error_event;
use crate::orchestrator;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use crate::types::{PlayerId, RoomId};
use std::sync::Arc;

/// Macro to check host authorization and return early if unauthorized
macro_rules! check_host {
    ($state:expr, $room_id:expr, $player_id:expr) => {
        match $state.load($room_id).await {
            Ok(room) if room.host_id == *$player_id => {}
            Ok(_) => {
                return Some(ServerMessage::error(
                    "NOT_HOST",
                    "Only the host can do this",
                ))
            }
            Err(e) => return Some(error_event(&e)),
        }
    };
}

/// Handle a bound client command and return an optional unicast response.
pub async fn handle_message(
    state: &Arc<AppState>,
    room_id: &RoomId,
    player_id: &PlayerId,
    msg: ClientMessage,
) -> Option<ServerMessage> {
    match msg {
        // Bound at the connection level; never reaches dispatch.
        ClientMessage::JoinRoom { .. } => None,

        ClientMessage::PlayerReady { is_ready } => {
            match state.set_ready(room_id, player_id, is_ready).await {
                Ok(_) => None,
                Err(e) => Some(error_event(&e)),
            }
        }

        ClientMessage::StartGame => {
            check_host!(state, room_id, player_id);
            match state.start_game(room_id, player_id).await {
                Ok(_) => None,
                Err(e) => Some(error_event(&e)),
            }
        }

        ClientMessage::SubmitPrompt { prompt } => {
            match state.submit_prompt(room_id, player_id, &prompt).await {
                Ok((room, all_submitted)) => {
                    if all_submitted {
                        let round_number =
                            room.game.as_ref().map(|g| g.current_round).unwrap_or(0);
                        orchestrator::spawn_generation(
                            state.clone(),
                            room_id.clone(),
                            round_number,
                        );
                    }
                    None
                }
                Err(e) => Some(error_event(&e)),
            }
        }

        ClientMessage::ResubmitPrompt { prompt } => {
            match state.resubmit_prompt(room_id, player_id, &prompt).await {
                Ok(_) => None,
                // Content policy already produced its prompt_rejected
                // unicast inside the service; the error event rides along.
                Err(e) => Some(error_event(&e)),
            }
        }

        ClientMessage::SelectImage { image_id } => {
            match state.select_image(room_id, player_id, &image_id).await {
                Ok(_) => None,
                Err(e) => Some(error_event(&e)),
            }
        }

        ClientMessage::SubmitGuess { image_id, guess } => {
            match state
                .submit_guess(room_id, player_id, &image_id, &guess)
                .await
            {
                Ok((_, to_scoring)) => {
                    if to_scoring {
                        orchestrator::run_scoring(state, room_id).await;
                    }
                    None
                }
                Err(e) => Some(error_event(&e)),
            }
        }

        ClientMessage::NavigateResult { direction } => {
            match state.navigate_result(room_id, direction).await {
                Ok(_) => None,
                Err(e) => Some(error_event(&e)),
            }
        }

        ClientMessage::CompleteReveal => match state.complete_reveal(room_id).await {
            Ok(_) => None,
            Err(e) => Some(error_event(&e)),
        },

        ClientMessage::NextRound => {
            check_host!(state, room_id, player_id);
            match state.start_next_round(room_id, player_id).await {
                Ok(_) => None,
                Err(e) => Some(error_event(&e)),
            }
        }
    }
}
