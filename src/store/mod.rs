//! Key-value persistence for rooms.
//!
//! Key layout: `room:{id}` holds the serialized room, `room:code:{code}`
//! holds the id (secondary index), `active_rooms` is the set of live room
//! ids. All keys share the room TTL; updates preserve the remaining TTL.

mod memory;

pub use memory::{spawn_ttl_sweeper, MemoryStore};

use crate::types::{Room, RoomId};
use async_trait::async_trait;

/// Default room TTL: 24 hours.
pub const DEFAULT_TTL_SECONDS: u64 = 24 * 60 * 60;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Key not found")]
    NotFound,

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Write a new room under all three keys, starting its TTL.
    async fn create(&self, room: &Room) -> StoreResult<()>;

    async fn get_by_id(&self, id: &RoomId) -> StoreResult<Room>;

    /// Two-hop lookup via the code index.
    async fn get_by_code(&self, code: &str) -> StoreResult<Room>;

    /// Overwrite an existing room, preserving its remaining TTL.
    async fn update(&self, room: &Room) -> StoreResult<()>;

    /// Remove the room key, its code index and its active-set entry.
    async fn delete(&self, id: &RoomId, code: &str) -> StoreResult<()>;

    async fn is_code_taken(&self, code: &str) -> StoreResult<bool>;

    /// Liveness probe for the health endpoint.
    async fn ping(&self) -> StoreResult<()>;
}
