use super::AppState;
use crate::error::{GameError, GameResult};
use crate::protocol::ServerMessage;
use crate::types::{
    Game, GamePhase, Leaderboard, LeaderboardEntry, PlayerId, Room, RoomId, RoomStatus, Round,
    MIN_PLAYERS_TO_START,
};
use chrono::Utc;

impl AppState {
    /// Start the game. Host-only; requires a full lobby of ready players.
    pub async fn start_game(&self, room_id: &RoomId, player_id: &PlayerId) -> GameResult<Room> {
        let channel = self.channel(room_id);
        let _guard = channel.lock.lock().await;

        let mut room = self.load(room_id).await?;
        if !room.players.contains_key(player_id) {
            return Err(GameError::PlayerNotInRoom);
        }
        if room.host_id != *player_id {
            return Err(GameError::NotHost);
        }
        if room.status != RoomStatus::Lobby {
            return Err(GameError::InvalidPhase { op: "start_game" });
        }
        if room.players.len() < MIN_PLAYERS_TO_START {
            return Err(GameError::NotEnoughPlayers(MIN_PLAYERS_TO_START));
        }
        if !room.players.values().all(|p| p.is_ready) {
            return Err(GameError::PlayersNotReady);
        }

        let mut leaderboard = Leaderboard::default();
        for player in room.players.values() {
            leaderboard
                .scores
                .insert(player.id.clone(), LeaderboardEntry::new(player));
        }
        let mut rankings: Vec<&crate::types::Player> = room.players.values().collect();
        rankings.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then_with(|| a.id.cmp(&b.id)));
        leaderboard.rankings = rankings.iter().map(|p| p.id.clone()).collect();

        let now = Utc::now();
        let game = Game {
            id: ulid::Ulid::new().to_string(),
            room_id: room_id.clone(),
            status: GamePhase::PromptSubmit,
            current_round: 1,
            rounds: vec![Round::new(1)],
            leaderboard,
            created_at: now,
            started_at: Some(now),
            finished_at: None,
        };

        room.status = RoomStatus::Playing;
        room.game = Some(game.clone());
        self.persist(&room).await?;

        tracing::info!("Game started in room {}", room_id);
        self.broadcast(room_id, ServerMessage::GameStarted { game });

        Ok(room)
    }

    /// Host advances from the between-rounds screen into the next round.
    pub async fn start_next_round(
        &self,
        room_id: &RoomId,
        player_id: &PlayerId,
    ) -> GameResult<Room> {
        let channel = self.channel(room_id);
        let _guard = channel.lock.lock().await;

        let mut room = self.load(room_id).await?;
        if !room.players.contains_key(player_id) {
            return Err(GameError::PlayerNotInRoom);
        }
        if room.host_id != *player_id {
            return Err(GameError::NotHost);
        }

        let round_count = room.settings.round_count;
        let game = room
            .game
            .as_mut()
            .ok_or(GameError::InvalidPhase { op: "next_round" })?;
        if game.status != GamePhase::RoundEnd || game.current_round >= round_count {
            return Err(GameError::InvalidPhase { op: "next_round" });
        }

        game.current_round += 1;
        let next_round = Round::new(game.current_round);
        game.rounds.push(next_round);
        game.status = GamePhase::PromptSubmit;

        let snapshot = game.clone();
        self.persist(&room).await?;

        self.broadcast(
            room_id,
            ServerMessage::PhaseTransition {
                game: snapshot,
                phase: GamePhase::PromptSubmit,
            },
        );

        Ok(room)
    }
}
