use super::{RoomStore, StoreError, StoreResult, DEFAULT_TTL_SECONDS};
use crate::types::{Room, RoomId};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use std::time::Duration;

/// In-process TTL'd key-value store for rooms.
///
/// Rooms are kept as serialized JSON payloads, not live objects, so every
/// read and write exercises the full serialization contract. Expiry is lazy
/// on access plus a periodic sweep.
pub struct MemoryStore {
    ttl: ChronoDuration,
    rooms: DashMap<RoomId, Entry>,
    code_index: DashMap<String, RoomId>,
    active_rooms: DashSet<RoomId>,
}

struct Entry {
    payload: String,
    expires_at: DateTime<Utc>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(DEFAULT_TTL_SECONDS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::hours(24)),
            rooms: DashMap::new(),
            code_index: DashMap::new(),
            active_rooms: DashSet::new(),
        }
    }

    /// Drop every expired room and its index entries. Returns how many
    /// rooms were evicted.
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<RoomId> = self
            .rooms
            .iter()
            .filter(|entry| entry.value().expires_at <= now)
            .map(|entry| entry.key().clone())
            .collect();

        for id in &expired {
            self.rooms.remove(id);
            self.code_index.retain(|_, room_id| *room_id != *id);
            self.active_rooms.remove(id);
        }
        expired.len()
    }

    fn read_entry(&self, id: &RoomId) -> StoreResult<Room> {
        let entry = self.rooms.get(id).ok_or(StoreError::NotFound)?;
        if entry.expires_at <= Utc::now() {
            drop(entry);
            self.rooms.remove(id);
            self.code_index.retain(|_, room_id| *room_id != *id);
            self.active_rooms.remove(id);
            return Err(StoreError::NotFound);
        }
        serde_json::from_str(&entry.payload)
            .map_err(|e| StoreError::Unavailable(format!("corrupt room payload: {e}")))
    }

    fn serialize(room: &Room) -> StoreResult<String> {
        serde_json::to_string(room)
            .map_err(|e| StoreError::Unavailable(format!("serialize room: {e}")))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn create(&self, room: &Room) -> StoreResult<()> {
        let payload = Self::serialize(room)?;
        self.rooms.insert(
            room.id.clone(),
            Entry {
                payload,
                expires_at: Utc::now() + self.ttl,
            },
        );
        self.code_index.insert(room.code.clone(), room.id.clone());
        self.active_rooms.insert(room.id.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: &RoomId) -> StoreResult<Room> {
        self.read_entry(id)
    }

    async fn get_by_code(&self, code: &str) -> StoreResult<Room> {
        let id = self
            .code_index
            .get(code)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::NotFound)?;
        self.read_entry(&id)
    }

    async fn update(&self, room: &Room) -> StoreResult<()> {
        let payload = Self::serialize(room)?;
        let mut entry = self.rooms.get_mut(&room.id).ok_or(StoreError::NotFound)?;
        // KEEPTTL semantics: the deadline set at create stands.
        entry.payload = payload;
        Ok(())
    }

    async fn delete(&self, id: &RoomId, code: &str) -> StoreResult<()> {
        self.rooms.remove(id);
        self.code_index.remove(code);
        self.active_rooms.remove(id);
        Ok(())
    }

    async fn is_code_taken(&self, code: &str) -> StoreResult<bool> {
        Ok(self.code_index.contains_key(code))
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Periodically evict expired rooms.
pub fn spawn_ttl_sweeper(store: Arc<MemoryStore>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let evicted = store.sweep_expired();
            if evicted > 0 {
                tracing::info!("Evicted {} expired room(s)", evicted);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Player, RoomSettings};

    fn test_room(code: &str) -> Room {
        let creator = Player::new("Alice".to_string(), true);
        Room::new(code.to_string(), creator, RoomSettings::default())
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = MemoryStore::new();
        let room = test_room("ABCD");
        store.create(&room).await.unwrap();

        let by_id = store.get_by_id(&room.id).await.unwrap();
        assert_eq!(by_id.code, "ABCD");
        assert_eq!(by_id.players.len(), 1);

        let by_code = store.get_by_code("ABCD").await.unwrap();
        assert_eq!(by_code.id, room.id);
    }

    #[tokio::test]
    async fn serialized_payload_round_trips_exactly() {
        let store = MemoryStore::new();
        let room = test_room("WXYZ");
        store.create(&room).await.unwrap();

        let loaded = store.get_by_id(&room.id).await.unwrap();
        assert_eq!(
            serde_json::to_value(&room).unwrap(),
            serde_json::to_value(&loaded).unwrap()
        );
    }

    #[tokio::test]
    async fn update_requires_existing_room() {
        let store = MemoryStore::new();
        let room = test_room("ABCD");
        assert!(matches!(
            store.update(&room).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn delete_removes_all_keys() {
        let store = MemoryStore::new();
        let room = test_room("ABCD");
        store.create(&room).await.unwrap();

        store.delete(&room.id, &room.code).await.unwrap();

        assert!(matches!(
            store.get_by_id(&room.id).await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.get_by_code("ABCD").await,
            Err(StoreError::NotFound)
        ));
        assert!(!store.is_code_taken("ABCD").await.unwrap());
    }

    #[tokio::test]
    async fn code_uniqueness_check() {
        let store = MemoryStore::new();
        assert!(!store.is_code_taken("ABCD").await.unwrap());
        store.create(&test_room("ABCD")).await.unwrap();
        assert!(store.is_code_taken("ABCD").await.unwrap());
    }

    #[tokio::test]
    async fn expired_rooms_are_gone_on_read() {
        let store = MemoryStore::with_ttl(Duration::from_millis(10));
        let room = test_room("ABCD");
        store.create(&room).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(matches!(
            store.get_by_id(&room.id).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn sweep_evicts_expired_rooms() {
        let store = MemoryStore::with_ttl(Duration::from_millis(10));
        store.create(&test_room("ABCD")).await.unwrap();
        store.create(&test_room("EFGH")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(store.sweep_expired(), 2);
        assert!(!store.is_code_taken("ABCD").await.unwrap());
    }
}
