//! Asynchronous work driven by phase transitions.
//!
//! Image generation is the only seconds-scale operation: one task per
//! submission, each re-entering the room critical section to record its
//! outcome, so client commands (a `resubmit_prompt`, a late join) and
//! progress updates interleave in a single serialized stream.

use crate::imagegen::ImageGenError;
use crate::state::AppState;
use crate::types::{PlayerId, RoomId};
use std::sync::Arc;
use std::time::Duration;

/// Pacing delay after each per-prompt progress fan-out, so clients get a
/// chance to render between updates.
const PROGRESS_PACING: Duration = Duration::from_millis(100);

enum TaskOutcome {
    Ready,
    Rejected { player_id: PlayerId, reason: String },
    Failed,
}

/// Kick off generation for every pending prompt of the round. Returns
/// immediately; the submit command that triggered the transition is not
/// held up by the work.
pub fn spawn_generation(state: Arc<AppState>, room_id: RoomId, round_number: u32) {
    tokio::spawn(async move {
        if let Err(e) = run_generation(state, &room_id, round_number).await {
            tracing::error!("Image generation for room {} failed: {}", room_id, e);
        }
    });
}

async fn run_generation(
    state: Arc<AppState>,
    room_id: &RoomId,
    round_number: u32,
) -> crate::error::GameResult<()> {
    let Some(chain) = state.images.clone() else {
        tracing::error!("No image provider configured; round {} stalls", round_number);
        return Ok(());
    };

    let room = state.load(room_id).await?;
    let image_count = room.settings.image_count;
    let players: Vec<PlayerId> = room
        .current_round()
        .map(|round| round.prompts.keys().cloned().collect())
        .unwrap_or_default();

    let mut tasks = Vec::new();
    for player_id in players {
        let state = state.clone();
        let chain = chain.clone();
        let room_id = room_id.clone();

        tasks.push(tokio::spawn(async move {
            let prompt = match state
                .begin_prompt_generation(&room_id, &player_id, round_number)
                .await
            {
                Ok(Some(prompt)) => prompt,
                Ok(None) => return None,
                Err(e) => {
                    tracing::error!("Could not start generation for {}: {}", player_id, e);
                    return None;
                }
            };

            let outcome = chain.generate(&prompt, image_count, &player_id).await;
            let task_outcome = match &outcome {
                Ok(_) => TaskOutcome::Ready,
                Err(ImageGenError::ContentPolicy(reason)) => TaskOutcome::Rejected {
                    player_id: player_id.clone(),
                    reason: reason.clone(),
                },
                Err(ImageGenError::Transient(_)) => TaskOutcome::Failed,
            };

            if let Err(e) = state
                .record_generation_outcome(&room_id, &player_id, round_number, outcome)
                .await
            {
                tracing::error!("Could not record generation outcome: {}", e);
            }
            tokio::time::sleep(PROGRESS_PACING).await;
            Some(task_outcome)
        }));
    }

    let outcomes = futures::future::join_all(tasks).await;

    let rejections: Vec<(PlayerId, String)> = outcomes
        .into_iter()
        .filter_map(|joined| joined.ok().flatten())
        .filter_map(|outcome| match outcome {
            TaskOutcome::Rejected { player_id, reason } => Some((player_id, reason)),
            _ => None,
        })
        .collect();

    state
        .finish_generation_phase(room_id, round_number, rejections)
        .await
}

/// Score the round as soon as the last guess arrives; the gateway calls
/// this when `submit_guess` reports the transition into scoring.
pub async fn run_scoring(state: &Arc<AppState>, room_id: &RoomId) {
    if let Err(e) = state.score_round(room_id).await {
        tracing::error!("Scoring for room {} failed: {}", room_id, e);
    }
}
