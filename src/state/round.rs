use super::AppState;
use crate::error::{GameError, GameResult};
use crate::imagegen::ImageGenError;
use crate::protocol::{NavigationDirection, ServerMessage};
use crate::types::{
    Game, GamePhase, GeneratedImage, ImageSelection, PlayerId, PromptSubmission, Room, RoomId,
    RoomStatus, Round, RoundPhase, SubmissionStatus, GUESS_MAX_CHARS, GUESS_MIN_CHARS,
    PROMPT_MAX_CHARS, PROMPT_MIN_CHARS,
};
use chrono::Utc;

fn validate_prompt(text: &str) -> GameResult<String> {
    let trimmed = text.trim();
    let len = trimmed.chars().count();
    if !(PROMPT_MIN_CHARS..=PROMPT_MAX_CHARS).contains(&len) {
        return Err(GameError::InvalidInput(format!(
            "Prompt must be {PROMPT_MIN_CHARS}-{PROMPT_MAX_CHARS} characters"
        )));
    }
    Ok(trimmed.to_string())
}

fn validate_guess(text: &str) -> GameResult<String> {
    let trimmed = text.trim();
    let len = trimmed.chars().count();
    if !(GUESS_MIN_CHARS..=GUESS_MAX_CHARS).contains(&len) {
        return Err(GameError::InvalidInput(format!(
            "Guess must be {GUESS_MIN_CHARS}-{GUESS_MAX_CHARS} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Generation is done when nothing is pending/generating and no rejected
/// submission is waiting on a resubmit. Failed submissions are tolerated.
fn generation_settled(round: &Round) -> bool {
    round.prompts.values().all(|s| {
        matches!(
            s.status,
            SubmissionStatus::Ready | SubmissionStatus::Failed
        )
    })
}

/// Clone the game for a fan-out payload, failing the operation when no
/// game is active.
fn game_snapshot(room: &Room, op: &'static str) -> GameResult<Game> {
    room.game.clone().ok_or(GameError::InvalidPhase { op })
}

impl AppState {
    /// Store a player's prompt. Returns whether every player has now
    /// submitted, which moves the round into image generation.
    pub async fn submit_prompt(
        &self,
        room_id: &RoomId,
        player_id: &PlayerId,
        text: &str,
    ) -> GameResult<(Room, bool)> {
        let channel = self.channel(room_id);
        let _guard = channel.lock.lock().await;

        let mut room = self.load(room_id).await?;
        if !room.players.contains_key(player_id) {
            return Err(GameError::PlayerNotInRoom);
        }

        let player_count = room.players.len();
        let round = room
            .current_round_mut()
            .filter(|r| r.status == RoundPhase::PromptSubmit)
            .ok_or(GameError::InvalidPhase { op: "submit_prompt" })?;
        if round.prompts.contains_key(player_id) {
            return Err(GameError::InvalidPhase { op: "submit_prompt" });
        }
        let text = validate_prompt(text)?;

        round
            .prompts
            .insert(player_id.clone(), PromptSubmission::new(player_id.clone(), text));
        let submitted_count = round.prompts.len();
        let all_submitted = submitted_count == player_count;
        if all_submitted {
            round.status = RoundPhase::ImageGenerate;
        }

        let game = room
            .game
            .as_mut()
            .ok_or(GameError::InvalidPhase { op: "submit_prompt" })?;
        if all_submitted {
            game.status = GamePhase::ImageGenerate;
        }
        let snapshot = game.clone();
        self.persist(&room).await?;

        self.broadcast(
            room_id,
            ServerMessage::PromptSubmitted {
                player_id: player_id.clone(),
                submitted_count,
                player_count,
            },
        );
        if all_submitted {
            self.broadcast(
                room_id,
                ServerMessage::PhaseTransition {
                    game: snapshot,
                    phase: GamePhase::ImageGenerate,
                },
            );
        }

        Ok((room, all_submitted))
    }

    /// Replace a rejected prompt and regenerate for this player alone,
    /// while the rest of the round carries on. The generator is called
    /// within the command; peers' progress callbacks queue behind it.
    pub async fn resubmit_prompt(
        &self,
        room_id: &RoomId,
        player_id: &PlayerId,
        text: &str,
    ) -> GameResult<(Room, bool)> {
        let channel = self.channel(room_id);
        let _guard = channel.lock.lock().await;

        let mut room = self.load(room_id).await?;
        if !room.players.contains_key(player_id) {
            return Err(GameError::PlayerNotInRoom);
        }
        let image_count = room.settings.image_count;
        let chain = self
            .images
            .clone()
            .ok_or_else(|| GameError::Generation("no image provider configured".to_string()))?;

        let round = room
            .current_round_mut()
            .filter(|r| r.status == RoundPhase::ImageGenerate)
            .ok_or(GameError::InvalidPhase {
                op: "resubmit_prompt",
            })?;
        let submission = round
            .prompts
            .get_mut(player_id)
            .filter(|s| s.status == SubmissionStatus::Rejected)
            .ok_or(GameError::InvalidPhase {
                op: "resubmit_prompt",
            })?;
        let text = validate_prompt(text)?;

        submission.prompt = text.clone();
        submission.submitted_at = Utc::now();
        submission.images.clear();
        submission.status = SubmissionStatus::Generating;
        self.persist(&room).await?;
        self.broadcast(
            room_id,
            ServerMessage::ImageProgress {
                game: game_snapshot(&room, "resubmit_prompt")?,
            },
        );

        let outcome = chain.generate(&text, image_count, player_id).await;

        let round = room
            .current_round_mut()
            .ok_or(GameError::InvalidPhase {
                op: "resubmit_prompt",
            })?;
        let submission = round
            .prompts
            .get_mut(player_id)
            .ok_or(GameError::InvalidPhase {
                op: "resubmit_prompt",
            })?;
        match outcome {
            Ok(images) => {
                submission.images = images;
                submission.status = SubmissionStatus::Ready;

                let should_transition = generation_settled(round);
                if should_transition {
                    round.status = RoundPhase::ImageSelect;
                }
                let game = room.game.as_mut().ok_or(GameError::InvalidPhase {
                    op: "resubmit_prompt",
                })?;
                if should_transition {
                    game.status = GamePhase::ImageSelect;
                }
                let snapshot = game.clone();
                self.persist(&room).await?;

                self.broadcast(
                    room_id,
                    ServerMessage::ImageProgress {
                        game: snapshot.clone(),
                    },
                );
                if should_transition {
                    self.broadcast(
                        room_id,
                        ServerMessage::PhaseTransition {
                            game: snapshot,
                            phase: GamePhase::ImageSelect,
                        },
                    );
                }

                Ok((room, should_transition))
            }
            Err(ImageGenError::ContentPolicy(reason)) => {
                submission.status = SubmissionStatus::Rejected;
                self.persist(&room).await?;
                self.broadcast(
                    room_id,
                    ServerMessage::ImageProgress {
                        game: game_snapshot(&room, "resubmit_prompt")?,
                    },
                );
                self.send_to(
                    room_id,
                    player_id,
                    ServerMessage::PromptRejected {
                        reason: reason.clone(),
                    },
                );
                Err(GameError::ContentPolicy(reason))
            }
            Err(ImageGenError::Transient(reason)) => {
                submission.status = SubmissionStatus::Failed;
                self.persist(&room).await?;
                self.broadcast(
                    room_id,
                    ServerMessage::ImageProgress {
                        game: game_snapshot(&room, "resubmit_prompt")?,
                    },
                );
                Err(GameError::Generation(reason))
            }
        }
    }

    /// Record a player's pick of one of their own images. Returns whether
    /// every player has selected, which starts the reveal.
    pub async fn select_image(
        &self,
        room_id: &RoomId,
        player_id: &PlayerId,
        image_id: &str,
    ) -> GameResult<(Room, bool)> {
        let channel = self.channel(room_id);
        let _guard = channel.lock.lock().await;

        let mut room = self.load(room_id).await?;
        if !room.players.contains_key(player_id) {
            return Err(GameError::PlayerNotInRoom);
        }
        let player_count = room.players.len();

        let round = room
            .current_round_mut()
            .filter(|r| r.status == RoundPhase::ImageSelect)
            .ok_or(GameError::InvalidPhase { op: "select_image" })?;

        let owns_image = round
            .prompts
            .get(player_id)
            .is_some_and(|s| s.images.iter().any(|img| img.id == image_id));
        if !owns_image {
            return Err(GameError::InvalidInput(
                "Selected image is not one of yours".to_string(),
            ));
        }

        round.selections.insert(
            player_id.clone(),
            ImageSelection {
                player_id: player_id.clone(),
                image_id: image_id.to_string(),
                selected_at: Utc::now(),
            },
        );

        let all_selected = round.selections.len() == player_count;
        if all_selected {
            round.status = RoundPhase::RevealGuess;
            round.current_reveal_index = 0;
        }
        let game = room
            .game
            .as_mut()
            .ok_or(GameError::InvalidPhase { op: "select_image" })?;
        if all_selected {
            game.status = GamePhase::RevealGuess;
        }
        let snapshot = game.clone();
        self.persist(&room).await?;

        self.broadcast(room_id, ServerMessage::RoomUpdate { room: room.clone() });
        if all_selected {
            self.broadcast(
                room_id,
                ServerMessage::PhaseTransition {
                    game: snapshot,
                    phase: GamePhase::RevealGuess,
                },
            );
        }

        Ok((room, all_selected))
    }

    /// Store a guess against the image currently being revealed. When the
    /// last expected guess lands, either advance the reveal cursor or move
    /// the round into scoring; the returned flag reports the latter.
    pub async fn submit_guess(
        &self,
        room_id: &RoomId,
        player_id: &PlayerId,
        image_id: &str,
        guess_text: &str,
    ) -> GameResult<(Room, bool)> {
        let channel = self.channel(room_id);
        let _guard = channel.lock.lock().await;

        let mut room = self.load(room_id).await?;
        if !room.players.contains_key(player_id) {
            return Err(GameError::PlayerNotInRoom);
        }
        let player_count = room.players.len();
        let seated: Vec<PlayerId> = room.players.keys().cloned().collect();

        let round = room
            .current_round_mut()
            .filter(|r| r.status == RoundPhase::RevealGuess)
            .ok_or(GameError::InvalidPhase { op: "submit_guess" })?;

        if round.current_reveal_image().as_deref() != Some(image_id) {
            return Err(GameError::InvalidInput(
                "Guess targets an image that is not being revealed".to_string(),
            ));
        }
        let owner = round.image_owner(image_id).cloned();
        if owner.as_ref() == Some(player_id) {
            return Err(GameError::InvalidInput(
                "You cannot guess on your own image".to_string(),
            ));
        }
        if round
            .guesses_for(image_id)
            .is_some_and(|bucket| bucket.contains_key(player_id))
        {
            return Err(GameError::InvalidInput(
                "You already guessed on this image".to_string(),
            ));
        }
        let guess_text = validate_guess(guess_text)?;

        round.guesses_for_mut(image_id).insert(
            player_id.clone(),
            crate::types::Guess {
                id: ulid::Ulid::new().to_string(),
                image_id: image_id.to_string(),
                player_id: player_id.clone(),
                guess_text,
                submitted_at: Utc::now(),
                score: None,
            },
        );

        // The submitter never guesses their own image, but an orphaned
        // image (owner removed mid-game) expects a guess from everyone.
        let expected = if owner.is_some_and(|o| seated.contains(&o)) {
            player_count.saturating_sub(1)
        } else {
            player_count
        };
        let all_guessed = round
            .guesses_for(image_id)
            .map(|bucket| bucket.len() >= expected)
            .unwrap_or(false);

        let mut to_scoring = false;
        if all_guessed {
            let total = round.selections.len();
            if round.current_reveal_index + 1 < total {
                round.current_reveal_index += 1;
            } else {
                round.status = RoundPhase::Scoring;
                to_scoring = true;
            }
        }
        let game = room
            .game
            .as_mut()
            .ok_or(GameError::InvalidPhase { op: "submit_guess" })?;
        if to_scoring {
            game.status = GamePhase::Scoring;
        }
        let snapshot = game.clone();
        self.persist(&room).await?;

        if all_guessed {
            let phase = if to_scoring {
                GamePhase::Scoring
            } else {
                GamePhase::RevealGuess
            };
            self.broadcast(
                room_id,
                ServerMessage::PhaseTransition {
                    game: snapshot,
                    phase,
                },
            );
        } else {
            self.broadcast(room_id, ServerMessage::RoomUpdate { room: room.clone() });
        }

        Ok((room, to_scoring))
    }

    /// Move the shared results cursor. Any player may navigate; the index
    /// clamps at both ends.
    pub async fn navigate_result(
        &self,
        room_id: &RoomId,
        direction: NavigationDirection,
    ) -> GameResult<Room> {
        let channel = self.channel(room_id);
        let _guard = channel.lock.lock().await;

        let mut room = self.load(room_id).await?;
        let round = room
            .current_round_mut()
            .filter(|r| r.status == RoundPhase::RevealResults)
            .ok_or(GameError::InvalidPhase {
                op: "navigate_result",
            })?;

        let last = round.selections.len().saturating_sub(1);
        round.current_result_index = match direction {
            NavigationDirection::Next => (round.current_result_index + 1).min(last),
            NavigationDirection::Previous => round.current_result_index.saturating_sub(1),
        };

        let snapshot = game_snapshot(&room, "navigate_result")?;
        self.persist(&room).await?;

        self.broadcast(
            room_id,
            ServerMessage::PhaseTransition {
                game: snapshot,
                phase: GamePhase::RevealResults,
            },
        );

        Ok(room)
    }

    /// Close the results screen. Idempotent: outside `reveal_results` this
    /// is a no-op so a double-click cannot double-advance.
    pub async fn complete_reveal(&self, room_id: &RoomId) -> GameResult<Room> {
        let channel = self.channel(room_id);
        let _guard = channel.lock.lock().await;

        let mut room = self.load(room_id).await?;
        let in_results = room
            .game
            .as_ref()
            .is_some_and(|g| g.status == GamePhase::RevealResults);
        if !in_results {
            return Ok(room);
        }

        let round_count = room.settings.round_count;
        let now = Utc::now();
        let game = room.game.as_mut().ok_or(GameError::InvalidPhase {
            op: "complete_reveal",
        })?;

        if let Some(round) = game.current_round_mut() {
            round.status = RoundPhase::Completed;
            round.finished_at = Some(now);
        }

        let phase = if game.current_round >= round_count {
            game.status = GamePhase::GameEnd;
            game.finished_at = Some(now);
            GamePhase::GameEnd
        } else {
            game.status = GamePhase::RoundEnd;
            GamePhase::RoundEnd
        };
        let snapshot = game.clone();
        if phase == GamePhase::GameEnd {
            room.status = RoomStatus::Finished;
        }
        self.persist(&room).await?;

        self.broadcast(
            room_id,
            ServerMessage::PhaseTransition {
                game: snapshot,
                phase,
            },
        );

        Ok(room)
    }

    // Orchestrator re-entry points. Each takes the round number it was
    // spawned for and drops stale work from rounds that have moved on.

    /// Flip a pending submission to `Generating`. Returns the prompt text
    /// when the task should proceed, `None` when the work is stale.
    pub(crate) async fn begin_prompt_generation(
        &self,
        room_id: &RoomId,
        player_id: &PlayerId,
        round_number: u32,
    ) -> GameResult<Option<String>> {
        let channel = self.channel(room_id);
        let _guard = channel.lock.lock().await;

        let mut room = self.load(room_id).await?;
        let Some(round) = room
            .current_round_mut()
            .filter(|r| r.round_number == round_number && r.status == RoundPhase::ImageGenerate)
        else {
            return Ok(None);
        };
        let Some(submission) = round
            .prompts
            .get_mut(player_id)
            .filter(|s| s.status == SubmissionStatus::Pending)
        else {
            return Ok(None);
        };

        submission.status = SubmissionStatus::Generating;
        let prompt = submission.prompt.clone();
        self.persist(&room).await?;
        Ok(Some(prompt))
    }

    /// Record one generation outcome and emit the progress fan-out.
    pub(crate) async fn record_generation_outcome(
        &self,
        room_id: &RoomId,
        player_id: &PlayerId,
        round_number: u32,
        outcome: Result<Vec<GeneratedImage>, ImageGenError>,
    ) -> GameResult<()> {
        let channel = self.channel(room_id);
        let _guard = channel.lock.lock().await;

        let mut room = self.load(room_id).await?;
        let Some(round) = room
            .current_round_mut()
            .filter(|r| r.round_number == round_number)
        else {
            tracing::debug!(
                "Dropping late generation result for {} (round {} over)",
                player_id,
                round_number
            );
            return Ok(());
        };
        let Some(submission) = round.prompts.get_mut(player_id) else {
            return Ok(());
        };

        match outcome {
            Ok(images) => {
                submission.images = images;
                submission.status = SubmissionStatus::Ready;
            }
            Err(ImageGenError::ContentPolicy(_)) => {
                submission.status = SubmissionStatus::Rejected;
            }
            Err(ImageGenError::Transient(reason)) => {
                tracing::warn!("Generation failed for {}: {}", player_id, reason);
                submission.status = SubmissionStatus::Failed;
            }
        }

        let Some(snapshot) = room.game.clone() else {
            return Ok(());
        };
        self.persist(&room).await?;
        self.broadcast(room_id, ServerMessage::ImageProgress { game: snapshot });
        Ok(())
    }

    /// Decide the post-generation transition once every task finished.
    /// Rejected submissions hold the round in `image_generate` and notify
    /// their submitters; otherwise the round advances, with or without
    /// failed submissions.
    pub(crate) async fn finish_generation_phase(
        &self,
        room_id: &RoomId,
        round_number: u32,
        rejections: Vec<(PlayerId, String)>,
    ) -> GameResult<()> {
        let channel = self.channel(room_id);
        let _guard = channel.lock.lock().await;

        let mut room = self.load(room_id).await?;
        let Some(round) = room
            .current_round()
            .filter(|r| r.round_number == round_number && r.status == RoundPhase::ImageGenerate)
        else {
            return Ok(());
        };

        let has_rejected = round
            .prompts
            .values()
            .any(|s| s.status == SubmissionStatus::Rejected);
        if has_rejected {
            for (player_id, reason) in rejections {
                self.send_to(
                    room_id,
                    &player_id,
                    ServerMessage::PromptRejected { reason },
                );
            }
            return Ok(());
        }

        if !generation_settled(round) {
            // A resubmission is mid-flight; its completion decides.
            return Ok(());
        }

        let failed = round
            .prompts
            .values()
            .filter(|s| s.status == SubmissionStatus::Failed)
            .count();
        if failed > 0 {
            tracing::warn!(
                "Round {} advancing with {} failed submission(s)",
                round_number,
                failed
            );
        }

        let Some(game) = room.game.as_mut() else {
            return Ok(());
        };
        if let Some(current) = game.current_round_mut() {
            current.status = RoundPhase::ImageSelect;
        }
        game.status = GamePhase::ImageSelect;
        let snapshot = game.clone();
        self.persist(&room).await?;

        self.broadcast(
            room_id,
            ServerMessage::PhaseTransition {
                game: snapshot,
                phase: GamePhase::ImageSelect,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::{app_state, room_with_players, start_game};

    async fn submit_all_prompts(
        state: &std::sync::Arc<AppState>,
        room_id: &RoomId,
        ids: &[PlayerId],
    ) {
        for (i, id) in ids.iter().enumerate() {
            state
                .submit_prompt(room_id, id, &format!("a painting of thing number {i}"))
                .await
                .unwrap();
        }
    }

    /// Run generation inline (no orchestrator) with the instant mock.
    async fn generate_all(state: &std::sync::Arc<AppState>, room_id: &RoomId, ids: &[PlayerId]) {
        let chain = state.images.clone().unwrap();
        let room = state.load(room_id).await.unwrap();
        let image_count = room.settings.image_count;
        for id in ids {
            let Some(prompt) = state
                .begin_prompt_generation(room_id, id, 1)
                .await
                .unwrap()
            else {
                continue;
            };
            let outcome = chain.generate(&prompt, image_count, id).await;
            state
                .record_generation_outcome(room_id, id, 1, outcome)
                .await
                .unwrap();
        }
        state
            .finish_generation_phase(room_id, 1, Vec::new())
            .await
            .unwrap();
    }

    async fn select_all(state: &std::sync::Arc<AppState>, room_id: &RoomId, ids: &[PlayerId]) {
        for id in ids {
            let room = state.load(room_id).await.unwrap();
            let image_id = room.current_round().unwrap().prompts[id].images[0].id.clone();
            state.select_image(room_id, id, &image_id).await.unwrap();
        }
    }

    #[tokio::test]
    async fn prompt_submission_transitions_when_all_in() {
        let state = app_state();
        let (room_id, ids) = room_with_players(&state, &["Alice", "Bob"]).await;
        start_game(&state, &room_id, &ids).await;

        let (_, all) = state
            .submit_prompt(&room_id, &ids[0], "a blue cat in the rain")
            .await
            .unwrap();
        assert!(!all);

        let (room, all) = state
            .submit_prompt(&room_id, &ids[1], "a red dog on a skateboard")
            .await
            .unwrap();
        assert!(all);
        let game = room.game.as_ref().unwrap();
        assert_eq!(game.status, GamePhase::ImageGenerate);
        assert_eq!(game.rounds[0].status, RoundPhase::ImageGenerate);
        // No images yet: generation is the orchestrator's job.
        assert!(game.rounds[0]
            .prompts
            .values()
            .all(|s| s.status == SubmissionStatus::Pending && s.images.is_empty()));
    }

    #[tokio::test]
    async fn duplicate_prompt_submission_fails_and_leaves_round_unchanged() {
        let state = app_state();
        let (room_id, ids) = room_with_players(&state, &["Alice", "Bob"]).await;
        start_game(&state, &room_id, &ids).await;

        state
            .submit_prompt(&room_id, &ids[0], "a blue cat in the rain")
            .await
            .unwrap();
        let result = state
            .submit_prompt(&room_id, &ids[0], "a second prompt entirely")
            .await;
        assert!(matches!(
            result,
            Err(GameError::InvalidPhase { op: "submit_prompt" })
        ));

        let room = state.load(&room_id).await.unwrap();
        let round = room.current_round().unwrap();
        assert_eq!(round.prompts.len(), 1);
        assert_eq!(round.prompts[&ids[0]].prompt, "a blue cat in the rain");
    }

    #[tokio::test]
    async fn prompt_length_is_validated() {
        let state = app_state();
        let (room_id, ids) = room_with_players(&state, &["Alice", "Bob"]).await;
        start_game(&state, &room_id, &ids).await;

        let result = state.submit_prompt(&room_id, &ids[0], "short").await;
        assert!(matches!(result, Err(GameError::InvalidInput(_))));

        let long = "x".repeat(201);
        let result = state.submit_prompt(&room_id, &ids[0], &long).await;
        assert!(matches!(result, Err(GameError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn generation_outcomes_drive_the_select_transition() {
        let state = app_state();
        let (room_id, ids) = room_with_players(&state, &["Alice", "Bob"]).await;
        start_game(&state, &room_id, &ids).await;
        submit_all_prompts(&state, &room_id, &ids).await;
        generate_all(&state, &room_id, &ids).await;

        let room = state.load(&room_id).await.unwrap();
        let game = room.game.as_ref().unwrap();
        assert_eq!(game.status, GamePhase::ImageSelect);
        for id in &ids {
            let submission = &game.rounds[0].prompts[id];
            assert_eq!(submission.status, SubmissionStatus::Ready);
            assert_eq!(submission.images.len(), 4);
            assert!(submission.images.iter().all(|img| img.prompt_id == *id));
        }
    }

    #[tokio::test]
    async fn rejected_prompt_holds_the_round() {
        let state = app_state();
        let (room_id, ids) = room_with_players(&state, &["Alice", "Bob", "Carol"]).await;
        start_game(&state, &room_id, &ids).await;

        state
            .submit_prompt(&room_id, &ids[0], "a blue cat in the rain")
            .await
            .unwrap();
        state
            .submit_prompt(&room_id, &ids[1], "something nsfw happening")
            .await
            .unwrap();
        state
            .submit_prompt(&room_id, &ids[2], "a quiet mountain lake")
            .await
            .unwrap();
        generate_all(&state, &room_id, &ids).await;

        let room = state.load(&room_id).await.unwrap();
        let game = room.game.as_ref().unwrap();
        assert_eq!(game.status, GamePhase::ImageGenerate);
        assert_eq!(
            game.rounds[0].prompts[&ids[1]].status,
            SubmissionStatus::Rejected
        );
        assert_eq!(
            game.rounds[0].prompts[&ids[0]].status,
            SubmissionStatus::Ready
        );
    }

    #[tokio::test]
    async fn resubmit_after_rejection_completes_the_round() {
        let state = app_state();
        let (room_id, ids) = room_with_players(&state, &["Alice", "Bob"]).await;
        start_game(&state, &room_id, &ids).await;

        state
            .submit_prompt(&room_id, &ids[0], "a blue cat in the rain")
            .await
            .unwrap();
        state
            .submit_prompt(&room_id, &ids[1], "something nsfw happening")
            .await
            .unwrap();
        generate_all(&state, &room_id, &ids).await;

        let (room, transitioned) = state
            .resubmit_prompt(&room_id, &ids[1], "a perfectly tame landscape")
            .await
            .unwrap();
        assert!(transitioned);
        let game = room.game.as_ref().unwrap();
        assert_eq!(game.status, GamePhase::ImageSelect);
        assert_eq!(
            game.rounds[0].prompts[&ids[1]].status,
            SubmissionStatus::Ready
        );
    }

    #[tokio::test]
    async fn resubmit_with_another_bad_prompt_stays_rejected() {
        let state = app_state();
        let (room_id, ids) = room_with_players(&state, &["Alice", "Bob"]).await;
        start_game(&state, &room_id, &ids).await;

        state
            .submit_prompt(&room_id, &ids[0], "a blue cat in the rain")
            .await
            .unwrap();
        state
            .submit_prompt(&room_id, &ids[1], "something nsfw happening")
            .await
            .unwrap();
        generate_all(&state, &room_id, &ids).await;

        let result = state
            .resubmit_prompt(&room_id, &ids[1], "even more nsfw than before")
            .await;
        assert!(matches!(result, Err(GameError::ContentPolicy(_))));

        let room = state.load(&room_id).await.unwrap();
        let game = room.game.as_ref().unwrap();
        assert_eq!(game.status, GamePhase::ImageGenerate);
        assert_eq!(
            game.rounds[0].prompts[&ids[1]].status,
            SubmissionStatus::Rejected
        );
    }

    #[tokio::test]
    async fn resubmit_requires_rejected_status() {
        let state = app_state();
        let (room_id, ids) = room_with_players(&state, &["Alice", "Bob"]).await;
        start_game(&state, &room_id, &ids).await;
        submit_all_prompts(&state, &room_id, &ids).await;
        generate_all(&state, &room_id, &ids).await;

        // Round already advanced; nothing is rejected.
        let result = state
            .resubmit_prompt(&room_id, &ids[0], "a different prompt here")
            .await;
        assert!(matches!(
            result,
            Err(GameError::InvalidPhase {
                op: "resubmit_prompt"
            })
        ));
    }

    #[tokio::test]
    async fn selecting_a_peers_image_fails() {
        let state = app_state();
        let (room_id, ids) = room_with_players(&state, &["Alice", "Bob"]).await;
        start_game(&state, &room_id, &ids).await;
        submit_all_prompts(&state, &room_id, &ids).await;
        generate_all(&state, &room_id, &ids).await;

        let room = state.load(&room_id).await.unwrap();
        let bobs_image = room.current_round().unwrap().prompts[&ids[1]].images[0]
            .id
            .clone();

        let result = state.select_image(&room_id, &ids[0], &bobs_image).await;
        assert!(matches!(result, Err(GameError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn all_selections_start_the_reveal() {
        let state = app_state();
        let (room_id, ids) = room_with_players(&state, &["Alice", "Bob"]).await;
        start_game(&state, &room_id, &ids).await;
        submit_all_prompts(&state, &room_id, &ids).await;
        generate_all(&state, &room_id, &ids).await;
        select_all(&state, &room_id, &ids).await;

        let room = state.load(&room_id).await.unwrap();
        let game = room.game.as_ref().unwrap();
        assert_eq!(game.status, GamePhase::RevealGuess);
        assert_eq!(game.rounds[0].current_reveal_index, 0);
        assert_eq!(game.rounds[0].selections.len(), 2);
    }

    #[tokio::test]
    async fn guessing_own_image_fails() {
        let state = app_state();
        let (room_id, ids) = room_with_players(&state, &["Alice", "Bob"]).await;
        start_game(&state, &room_id, &ids).await;
        submit_all_prompts(&state, &room_id, &ids).await;
        generate_all(&state, &room_id, &ids).await;
        select_all(&state, &room_id, &ids).await;

        let room = state.load(&room_id).await.unwrap();
        let round = room.current_round().unwrap();
        let current = round.current_reveal_image().unwrap();
        let owner = round.image_owner(&current).unwrap().clone();

        let result = state
            .submit_guess(&room_id, &owner, &current, "my own prompt")
            .await;
        assert!(matches!(result, Err(GameError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn duplicate_guess_fails() {
        let state = app_state();
        let (room_id, ids) = room_with_players(&state, &["Alice", "Bob", "Carol"]).await;
        start_game(&state, &room_id, &ids).await;
        for id in &ids {
            state
                .submit_prompt(&room_id, id, "a perfectly valid prompt")
                .await
                .unwrap();
        }
        generate_all(&state, &room_id, &ids).await;
        select_all(&state, &room_id, &ids).await;

        let room = state.load(&room_id).await.unwrap();
        let round = room.current_round().unwrap();
        let current = round.current_reveal_image().unwrap();
        let owner = round.image_owner(&current).unwrap().clone();
        let guesser = ids.iter().find(|id| **id != owner).unwrap();

        state
            .submit_guess(&room_id, guesser, &current, "first guess")
            .await
            .unwrap();
        let result = state
            .submit_guess(&room_id, guesser, &current, "second guess")
            .await;
        assert!(matches!(result, Err(GameError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn guessing_wrong_image_fails() {
        let state = app_state();
        let (room_id, ids) = room_with_players(&state, &["Alice", "Bob"]).await;
        start_game(&state, &room_id, &ids).await;
        submit_all_prompts(&state, &room_id, &ids).await;
        generate_all(&state, &room_id, &ids).await;
        select_all(&state, &room_id, &ids).await;

        let room = state.load(&room_id).await.unwrap();
        let round = room.current_round().unwrap();
        let sequence = round.reveal_sequence();
        let not_current = sequence.last().unwrap().clone();
        assert_ne!(Some(&not_current), sequence.first());
        let owner = round.image_owner(&not_current).unwrap().clone();
        let guesser = ids.iter().find(|id| **id != owner).unwrap();

        let result = state
            .submit_guess(&room_id, guesser, &not_current, "too early")
            .await;
        assert!(matches!(result, Err(GameError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn last_guess_advances_reveal_then_scores() {
        let state = app_state();
        let (room_id, ids) = room_with_players(&state, &["Alice", "Bob"]).await;
        start_game(&state, &room_id, &ids).await;
        submit_all_prompts(&state, &room_id, &ids).await;
        generate_all(&state, &room_id, &ids).await;
        select_all(&state, &room_id, &ids).await;

        let room = state.load(&room_id).await.unwrap();
        let round = room.current_round().unwrap();
        let first = round.current_reveal_image().unwrap();
        let owner = round.image_owner(&first).unwrap().clone();
        let guesser = ids.iter().find(|id| **id != owner).unwrap().clone();

        let (room, to_scoring) = state
            .submit_guess(&room_id, &guesser, &first, "some guess text")
            .await
            .unwrap();
        assert!(!to_scoring);
        let round = room.current_round().unwrap();
        assert_eq!(round.current_reveal_index, 1);
        assert_eq!(round.status, RoundPhase::RevealGuess);

        let second = round.current_reveal_image().unwrap();
        let second_owner = round.image_owner(&second).unwrap().clone();
        let second_guesser = ids.iter().find(|id| **id != second_owner).unwrap().clone();

        let (room, to_scoring) = state
            .submit_guess(&room_id, &second_guesser, &second, "another guess")
            .await
            .unwrap();
        assert!(to_scoring);
        assert_eq!(
            room.game.as_ref().unwrap().status,
            GamePhase::Scoring
        );
    }

    #[tokio::test]
    async fn navigation_clamps_at_both_ends() {
        let state = app_state();
        let (room_id, ids) = room_with_players(&state, &["Alice", "Bob"]).await;
        start_game(&state, &room_id, &ids).await;
        submit_all_prompts(&state, &room_id, &ids).await;
        generate_all(&state, &room_id, &ids).await;
        select_all(&state, &room_id, &ids).await;

        let room = state.load(&room_id).await.unwrap();
        let round = room.current_round().unwrap();
        // Guess both images to reach scoring, then score.
        let sequence = round.reveal_sequence();
        for image_id in &sequence {
            let owner = round.image_owner(image_id).unwrap().clone();
            let guesser = ids.iter().find(|id| **id != owner).unwrap().clone();
            state
                .submit_guess(&room_id, &guesser, image_id, "whatever guess")
                .await
                .unwrap();
        }
        state.score_round(&room_id).await.unwrap();

        let room = state
            .navigate_result(&room_id, NavigationDirection::Previous)
            .await
            .unwrap();
        assert_eq!(room.current_round().unwrap().current_result_index, 0);

        let room = state
            .navigate_result(&room_id, NavigationDirection::Next)
            .await
            .unwrap();
        assert_eq!(room.current_round().unwrap().current_result_index, 1);

        let room = state
            .navigate_result(&room_id, NavigationDirection::Next)
            .await
            .unwrap();
        assert_eq!(room.current_round().unwrap().current_result_index, 1);
    }

    #[tokio::test]
    async fn complete_reveal_is_idempotent() {
        let state = app_state();
        let (room_id, ids) = room_with_players(&state, &["Alice", "Bob"]).await;
        start_game(&state, &room_id, &ids).await;
        submit_all_prompts(&state, &room_id, &ids).await;
        generate_all(&state, &room_id, &ids).await;
        select_all(&state, &room_id, &ids).await;

        let room = state.load(&room_id).await.unwrap();
        let round = room.current_round().unwrap();
        for image_id in &round.reveal_sequence() {
            let owner = round.image_owner(image_id).unwrap().clone();
            let guesser = ids.iter().find(|id| **id != owner).unwrap().clone();
            state
                .submit_guess(&room_id, &guesser, image_id, "whatever guess")
                .await
                .unwrap();
        }
        state.score_round(&room_id).await.unwrap();

        let room = state.complete_reveal(&room_id).await.unwrap();
        let game = room.game.as_ref().unwrap();
        assert_eq!(game.status, GamePhase::RoundEnd);
        assert_eq!(game.rounds[0].status, RoundPhase::Completed);
        assert!(game.rounds[0].finished_at.is_some());
        let first_finish = game.rounds[0].finished_at;

        let room = state.complete_reveal(&room_id).await.unwrap();
        let game = room.game.as_ref().unwrap();
        assert_eq!(game.status, GamePhase::RoundEnd);
        assert_eq!(game.rounds[0].finished_at, first_finish);
    }

    #[tokio::test]
    async fn stale_generation_results_are_dropped() {
        let state = app_state();
        let (room_id, ids) = room_with_players(&state, &["Alice", "Bob"]).await;
        start_game(&state, &room_id, &ids).await;
        submit_all_prompts(&state, &room_id, &ids).await;

        // A result tagged with a round that is not current is ignored.
        state
            .record_generation_outcome(
                &room_id,
                &ids[0],
                7,
                Err(ImageGenError::Transient("late".to_string())),
            )
            .await
            .unwrap();

        let room = state.load(&room_id).await.unwrap();
        assert_eq!(
            room.current_round().unwrap().prompts[&ids[0]].status,
            SubmissionStatus::Pending
        );
    }
}
