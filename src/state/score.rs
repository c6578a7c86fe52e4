use super::AppState;
use crate::error::{GameError, GameResult};
use crate::protocol::ServerMessage;
use crate::scoring::{award_points, similarity, GuessScore, STUMPER_BONUS};
use crate::types::{GamePhase, Room, RoomId, RoundPhase};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

impl AppState {
    /// Score the current round, fold the results into the leaderboard and
    /// move the round into results review.
    pub async fn score_round(&self, room_id: &RoomId) -> GameResult<Room> {
        let channel = self.channel(room_id);
        let _guard = channel.lock.lock().await;

        let mut room = self.load(room_id).await?;
        let round = room
            .current_round_mut()
            .filter(|r| r.status == RoundPhase::Scoring)
            .ok_or(GameError::InvalidPhase { op: "score_round" })?;

        // Original prompt per selected image, via the selections.
        let originals: HashMap<String, (String, String)> = round
            .selections
            .values()
            .filter_map(|selection| {
                round.prompts.get(&selection.player_id).map(|submission| {
                    (
                        selection.image_id.clone(),
                        (selection.player_id.clone(), submission.prompt.clone()),
                    )
                })
            })
            .collect();

        let mut round_scores: HashMap<String, u32> = HashMap::new();
        let mut bonus_points: HashMap<String, u32> = HashMap::new();
        let mut guess_winners: Vec<String> = Vec::new();

        for (image_id, bucket) in round.guesses.iter_mut() {
            let Some((creator_id, original)) = originals.get(image_id) else {
                continue;
            };

            let mut scored: Vec<GuessScore> = Vec::new();
            for guess in bucket.values_mut() {
                let score = similarity(original, &guess.guess_text);
                guess.score = Some(score);
                scored.push(GuessScore {
                    player_id: guess.player_id.clone(),
                    score,
                });
            }

            let award = award_points(&scored);
            for (player_id, points) in &award.guesser_points {
                *round_scores.entry(player_id.clone()).or_insert(0) += points;
            }
            if let Some(bonus) = award.creator_bonus {
                *round_scores.entry(creator_id.clone()).or_insert(0) += bonus;
                bonus_points.insert(image_id.clone(), STUMPER_BONUS);
            }

            // The strictly best guess on an image counts as a win.
            if let Some(best) = scored.iter().map(|s| s.score).max() {
                let top: Vec<_> = scored.iter().filter(|s| s.score == best).collect();
                if top.len() == 1 {
                    guess_winners.push(top[0].player_id.clone());
                }
            }
        }

        round.scores = round_scores.clone();
        round.bonus_points = bonus_points;
        round.status = RoundPhase::RevealResults;
        round.current_result_index = 0;
        let picks: Vec<String> = round.selections.keys().cloned().collect();

        // Fold into the leaderboard: exactly one round-score entry per
        // player per completed round, totals always the sum.
        let join_order: HashMap<String, DateTime<Utc>> = room
            .players
            .values()
            .map(|p| (p.id.clone(), p.joined_at))
            .collect();
        let game = room
            .game
            .as_mut()
            .ok_or(GameError::InvalidPhase { op: "score_round" })?;
        game.status = GamePhase::RevealResults;

        for entry in game.leaderboard.scores.values_mut() {
            let earned = round_scores.get(&entry.player_id).copied().unwrap_or(0);
            entry.total_score += earned;
            entry.round_scores.push(earned);
        }
        for winner in guess_winners {
            if let Some(entry) = game.leaderboard.scores.get_mut(&winner) {
                entry.guess_wins += 1;
            }
        }
        for picker in picks {
            if let Some(entry) = game.leaderboard.scores.get_mut(&picker) {
                entry.prompt_picks += 1;
            }
        }

        let mut rankings: Vec<String> = game.leaderboard.scores.keys().cloned().collect();
        rankings.sort_by(|a, b| {
            let score_a = game.leaderboard.scores[a].total_score;
            let score_b = game.leaderboard.scores[b].total_score;
            score_b.cmp(&score_a).then_with(|| {
                // Departed players sort after everyone still seated.
                match (join_order.get(a), join_order.get(b)) {
                    (Some(ja), Some(jb)) => ja.cmp(jb),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => a.cmp(b),
                }
            })
        });
        game.leaderboard.rankings = rankings;

        let snapshot = game.clone();
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
}
