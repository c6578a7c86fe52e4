//! Shared application state and the room-scoped game service.
//!
//! Every mutation of a room flows through that room's critical section:
//! lock, load from the store, validate, mutate, persist, notify, unlock.
//! Notifications are pushed onto the room's broadcast channel before the
//! lock is released so observers see each command's state and events
//! strictly before the next command's.

mod game;
mod room;
mod round;
mod score;

use crate::error::{GameError, GameResult};
use crate::imagegen::ProviderChain;
use crate::protocol::ServerMessage;
use crate::store::{RoomStore, StoreError};
use crate::types::{PlayerId, Room, RoomId};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// One event on a room's fan-out channel. `ToPlayer` rides the same
/// channel; each connection filters by its own player id.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    Broadcast(ServerMessage),
    ToPlayer {
        player_id: PlayerId,
        message: ServerMessage,
    },
}

#[derive(Clone)]
pub struct RoomChannel {
    pub lock: Arc<Mutex<()>>,
    pub events: broadcast::Sender<RoomEvent>,
}

impl RoomChannel {
    fn new() -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            lock: Arc::new(Mutex::new(())),
            events,
        }
    }
}

/// Shared application state
pub struct AppState {
    pub store: Arc<dyn RoomStore>,
    /// Provider chain for image generation; absent when unconfigured.
    pub images: Option<Arc<ProviderChain>>,
    channels: DashMap<RoomId, RoomChannel>,
}

impl AppState {
    pub fn new(store: Arc<dyn RoomStore>, images: Option<Arc<ProviderChain>>) -> Self {
        Self {
            store,
            images,
            channels: DashMap::new(),
        }
    }

    /// The room's lock + event channel, created on first touch.
    pub fn channel(&self, room_id: &RoomId) -> RoomChannel {
        self.channels
            .entry(room_id.clone())
            .or_insert_with(RoomChannel::new)
            .clone()
    }

    pub fn subscribe(&self, room_id: &RoomId) -> broadcast::Receiver<RoomEvent> {
        self.channel(room_id).events.subscribe()
    }

    /// Broadcast to every connection in the room.
    pub fn broadcast(&self, room_id: &RoomId, message: ServerMessage) {
        let _ = self
            .channel(room_id)
            .events
            .send(RoomEvent::Broadcast(message));
    }

    /// Unicast to a single player's connection(s).
    pub fn send_to(&self, room_id: &RoomId, player_id: &PlayerId, message: ServerMessage) {
        let _ = self.channel(room_id).events.send(RoomEvent::ToPlayer {
            player_id: player_id.clone(),
            message,
        });
    }

    pub(crate) fn drop_channel(&self, room_id: &RoomId) {
        self.channels.remove(room_id);
    }

    /// Read-only fetch by room id.
    pub async fn load(&self, room_id: &RoomId) -> GameResult<Room> {
        match self.store.get_by_id(room_id).await {
            Ok(room) => Ok(room),
            Err(StoreError::NotFound) => Err(GameError::RoomNotFound),
            Err(other) => Err(other.into()),
        }
    }

    pub(crate) async fn persist(&self, room: &Room) -> GameResult<()> {
        self.store.update(room).await?;
        Ok(())
    }

    /// Read-only fetch used by the HTTP surface.
    pub async fn fetch_by_code(&self, code: &str) -> GameResult<Room> {
        match self.store.get_by_code(code).await {
            Ok(room) => Ok(room),
            Err(StoreError::NotFound) => Err(GameError::RoomNotFound),
            Err(other) => Err(other.into()),
        }
    }
}
