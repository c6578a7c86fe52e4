use super::AppState;
use crate::code::{generate_code, CODE_GENERATION_ATTEMPTS};
use crate::error::{GameError, GameResult};
use crate::protocol::{LeaveReason, ServerMessage};
use crate::types::{Player, PlayerId, Room, RoomId, RoomSettings, RoomStatus};
use chrono::Utc;

const NAME_MAX_CHARS: usize = 30;

fn validate_display_name(name: &str) -> GameResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(GameError::InvalidInput(
            "Display name must not be empty".to_string(),
        ));
    }
    if trimmed.chars().count() > NAME_MAX_CHARS {
        return Err(GameError::InvalidInput(format!(
            "Display name must be at most {NAME_MAX_CHARS} characters"
        )));
    }
    Ok(trimmed.to_string())
}

impl AppState {
    /// Create a room with the caller as sole player and host.
    pub async fn create_room(
        &self,
        display_name: String,
        settings: Option<RoomSettings>,
    ) -> GameResult<(Room, PlayerId)> {
        let display_name = validate_display_name(&display_name)?;

        let mut code = None;
        for _ in 0..CODE_GENERATION_ATTEMPTS {
            let candidate = generate_code();
            if !self.store.is_code_taken(&candidate).await? {
                code = Some(candidate);
                break;
            }
        }
        let code = code.ok_or(GameError::CodeExhaustion)?;

        let creator = Player::new(display_name, true);
        let player_id = creator.id.clone();
        let room = Room::new(code, creator, settings.unwrap_or_default());
        self.store.create(&room).await?;

        tracing::info!("Room {} created with code {}", room.id, room.code);
        Ok((room, player_id))
    }

    /// Join a lobby by code. Fails when the game has started or the room
    /// is at capacity.
    pub async fn join_room(&self, code: &str, display_name: String) -> GameResult<(Room, PlayerId)> {
        let display_name = validate_display_name(&display_name)?;
        let room_id = self.fetch_by_code(&code.to_uppercase()).await?.id;

        let channel = self.channel(&room_id);
        let _guard = channel.lock.lock().await;

        let mut room = self.load(&room_id).await?;
        if room.status != RoomStatus::Lobby {
            return Err(GameError::GameInProgress);
        }
        if room.players.len() >= room.max_players {
            return Err(GameError::RoomFull);
        }

        let player = Player::new(display_name, false);
        let player_id = player.id.clone();
        room.players.insert(player_id.clone(), player.clone());
        self.persist(&room).await?;

        self.broadcast(&room_id, ServerMessage::PlayerJoined { player });
        self.broadcast(&room_id, ServerMessage::RoomUpdate { room: room.clone() });

        Ok((room, player_id))
    }

    /// Toggle a player's ready flag. No phase constraint; the UI only
    /// offers it in the lobby.
    pub async fn set_ready(
        &self,
        room_id: &RoomId,
        player_id: &PlayerId,
        is_ready: bool,
    ) -> GameResult<Room> {
        let channel = self.channel(room_id);
        let _guard = channel.lock.lock().await;

        let mut room = self.load(room_id).await?;
        let player = room
            .players
            .get_mut(player_id)
            .ok_or(GameError::PlayerNotInRoom)?;
        player.is_ready = is_ready;
        self.persist(&room).await?;

        self.broadcast(
            room_id,
            ServerMessage::PlayerReadyChanged {
                player_id: player_id.clone(),
                is_ready,
            },
        );
        self.broadcast(room_id, ServerMessage::RoomUpdate { room: room.clone() });

        Ok(room)
    }

    /// Remove a player. Deletes the room when it empties; promotes the
    /// longest-seated player when the host leaves.
    pub async fn remove_player(
        &self,
        room_id: &RoomId,
        player_id: &PlayerId,
        reason: LeaveReason,
    ) -> GameResult<(Option<Room>, Option<PlayerId>)> {
        let channel = self.channel(room_id);
        let _guard = channel.lock.lock().await;

        let mut room = self.load(room_id).await?;
        let removed = room
            .players
            .remove(player_id)
            .ok_or(GameError::PlayerNotInRoom)?;

        if room.players.is_empty() {
            self.store.delete(room_id, &room.code).await?;
            drop(_guard);
            self.drop_channel(room_id);
            tracing::info!("Room {} emptied and deleted", room_id);
            return Ok((None, None));
        }

        let new_host_id = if removed.is_host {
            room.players
                .values()
                .min_by(|a, b| a.joined_at.cmp(&b.joined_at).then_with(|| a.id.cmp(&b.id)))
                .map(|p| p.id.clone())
        } else {
            None
        };
        if let Some(next_host) = &new_host_id {
            room.host_id = next_host.clone();
            if let Some(player) = room.players.get_mut(next_host) {
                player.is_host = true;
            }
        }

        self.persist(&room).await?;

        self.broadcast(
            room_id,
            ServerMessage::PlayerLeft {
                player_id: player_id.clone(),
                reason,
                new_host_id: new_host_id.clone(),
            },
        );
        self.broadcast(room_id, ServerMessage::RoomUpdate { room: room.clone() });

        Ok((Some(room), new_host_id))
    }

    /// Flip the connection flag and bump `last_seen_at`. Never removes the
    /// player; their seat stays allocated.
    pub async fn update_connection(
        &self,
        room_id: &RoomId,
        player_id: &PlayerId,
        is_connected: bool,
    ) -> GameResult<Room> {
        let channel = self.channel(room_id);
        let _guard = channel.lock.lock().await;

        let mut room = self.load(room_id).await?;
        let player = room
            .players
            .get_mut(player_id)
            .ok_or(GameError::PlayerNotInRoom)?;
        player.is_connected = is_connected;
        player.last_seen_at = Utc::now();
        self.persist(&room).await?;

        if !is_connected {
            self.broadcast(
                room_id,
                ServerMessage::PlayerLeft {
                    player_id: player_id.clone(),
                    reason: LeaveReason::Disconnect,
                    new_host_id: None,
                },
            );
        }
        self.broadcast(room_id, ServerMessage::RoomUpdate { room: room.clone() });

        Ok(room)
    }
}
