use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Duration;

use super::room::{Room, RoomSettings};
use crate::config::{Config, ProtocolConfig};
use crate::protocol::{
    room_codes, validation, DebugOptions, ErrorCode, PlayerId, RoomCode, RoomConfig, RoomSnapshot,
    RoomStatus,
};
use crate::reconnection::ReconnectionManager;

/// Attempts at generating a fresh unique join code before giving up.
const CODE_RETRY_BOUND: usize = 32;

#[derive(Debug, Error)]
pub enum CreateRoomError {
    #[error("server room limit reached ({0})")]
    DirectoryFull(usize),
    #[error("could not allocate a unique room code")]
    CodeSpaceExhausted,
    #[error("invalid room config: {0}")]
    InvalidConfig(String),
}

impl CreateRoomError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CreateRoomError::DirectoryFull(_) | CreateRoomError::CodeSpaceExhausted => {
                ErrorCode::RoomLimitReached
            }
            CreateRoomError::InvalidConfig(_) => ErrorCode::InvalidConfig,
        }
    }
}

/// Owns every room: creation with unique short codes, directory lookup,
/// and the periodic reaper. The directory is the only cross-room shared
/// structure in the process.
pub struct RoomManager {
    rooms: DashMap<RoomCode, Arc<Room>>,
    protocol: ProtocolConfig,
    settings: RoomSettings,
    max_rooms: usize,
    room_timeout: Duration,
    reaper_interval: Duration,
    pub reconnect: Arc<ReconnectionManager>,
}

impl RoomManager {
    pub fn new(config: &Config) -> Arc<Self> {
        let reconnect = ReconnectionManager::new(
            Duration::from_millis(config.server.grace_period_ms),
            config.server.grace_cap_per_room,
            config.server.allow_reconnect_after_takeover,
        );
        Arc::new(Self {
            rooms: DashMap::new(),
            protocol: config.protocol.clone(),
            settings: RoomSettings {
                max_statement_length: config.protocol.max_statement_length,
            },
            max_rooms: config.server.max_rooms,
            room_timeout: Duration::from_millis(config.server.room_timeout_ms),
            reaper_interval: Duration::from_millis(config.server.reaper_interval_ms),
            reconnect,
        })
    }

    /// Create a room with a fresh unique join code.
    pub fn create_room(
        &self,
        config: RoomConfig,
        debug: Option<DebugOptions>,
    ) -> Result<Arc<Room>, CreateRoomError> {
        if self.rooms.len() >= self.max_rooms {
            return Err(CreateRoomError::DirectoryFull(self.max_rooms));
        }
        validation::validate_room_config(&config).map_err(CreateRoomError::InvalidConfig)?;

        use dashmap::mapref::entry::Entry;

        for _ in 0..CODE_RETRY_BOUND {
            let code = room_codes::generate_room_code_with_config(&self.protocol);
            match self.rooms.entry(code.clone()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => {
                    let room = Room::new(
                        code.clone(),
                        config.clone(),
                        debug.clone(),
                        self.settings.clone(),
                        self.reconnect.clone(),
                    );
                    slot.insert(room.clone());
                    tracing::info!(room_code = %code, rooms = self.rooms.len(), "room created");
                    return Ok(room);
                }
            }
        }
        Err(CreateRoomError::CodeSpaceExhausted)
    }

    pub fn get_room(&self, code: &str) -> Option<Arc<Room>> {
        self.rooms.get(&code.to_ascii_uppercase()).map(|r| r.clone())
    }

    /// Directory scan for the room a player currently belongs to.
    pub async fn find_player_room(&self, player_id: &PlayerId) -> Option<Arc<Room>> {
        let rooms: Vec<Arc<Room>> = self.rooms.iter().map(|r| r.clone()).collect();
        for room in rooms {
            if room.is_member(player_id).await {
                return Some(room);
            }
        }
        None
    }

    /// Public rooms still gathering players.
    pub async fn list_public_waiting(&self) -> Vec<RoomSnapshot> {
        let rooms: Vec<Arc<Room>> = self.rooms.iter().map(|r| r.clone()).collect();
        let mut snapshots = Vec::new();
        for room in rooms {
            let snapshot = room.snapshot().await;
            if snapshot.status == RoomStatus::Waiting && !snapshot.config.is_private {
                snapshots.push(snapshot);
            }
        }
        snapshots
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Close and remove one room.
    pub async fn destroy_room(&self, code: &RoomCode, reason: &str) {
        if let Some((_, room)) = self.rooms.remove(code) {
            room.close(reason).await;
            self.reconnect.purge_room(code);
            tracing::info!(room_code = %code, "room destroyed");
        }
    }

    /// Close every room (server shutdown).
    pub async fn close_all(&self, reason: &str) {
        let codes: Vec<RoomCode> = self.rooms.iter().map(|r| r.key().clone()).collect();
        for code in codes {
            self.destroy_room(&code, reason).await;
        }
    }

    /// Periodic sweep: ENDED and CLOSED rooms go at once; WAITING rooms
    /// with no connected humans go after the idle window. PLAYING rooms
    /// are never reaped; the engine drives their termination.
    pub async fn reap_once(&self) -> usize {
        let rooms: Vec<(RoomCode, Arc<Room>)> = self
            .rooms
            .iter()
            .map(|r| (r.key().clone(), r.clone()))
            .collect();

        let mut reaped = 0;
        for (code, room) in rooms {
            let destroy = match room.status().await {
                RoomStatus::Ended | RoomStatus::Closed => true,
                RoomStatus::Waiting => {
                    let idle_ms = chrono::Utc::now()
                        .signed_duration_since(room.last_activity().await)
                        .num_milliseconds()
                        .max(0) as u128;
                    room.connected_human_count().await == 0
                        && idle_ms > self.room_timeout.as_millis()
                }
                RoomStatus::Starting | RoomStatus::Playing => false,
            };
            if destroy {
                self.destroy_room(&code, "Room expired").await;
                reaped += 1;
            }
        }
        if reaped > 0 {
            tracing::info!(count = reaped, "reaped rooms");
        }
        reaped
    }

    /// Spawn the background reaper loop.
    pub fn spawn_reaper(self: &Arc<Self>) {
        let manager = Arc::downgrade(self);
        let interval = self.reaper_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    return;
                };
                manager.reap_once().await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn test_manager() -> Arc<RoomManager> {
        let mut config = Config::default();
        config.server.room_timeout_ms = 50;
        RoomManager::new(&config)
    }

    fn channel() -> mpsc::Sender<crate::protocol::ServerMessage> {
        mpsc::channel(16).0
    }

    #[tokio::test]
    async fn create_and_lookup_room() {
        let manager = test_manager();
        let room = manager.create_room(RoomConfig::default(), None).unwrap();

        assert!(room.code.len() >= 4 && room.code.len() <= 6);
        assert!(manager.get_room(&room.code).is_some());
        // Lookup is case-insensitive on the code.
        assert!(manager.get_room(&room.code.to_lowercase()).is_some());
        assert_eq!(manager.room_count(), 1);
    }

    #[tokio::test]
    async fn directory_cap_is_enforced() {
        let mut config = Config::default();
        config.server.max_rooms = 2;
        let manager = RoomManager::new(&config);

        manager.create_room(RoomConfig::default(), None).unwrap();
        manager.create_room(RoomConfig::default(), None).unwrap();
        let err = manager
            .create_room(RoomConfig::default(), None)
            .unwrap_err();
        assert!(matches!(err, CreateRoomError::DirectoryFull(2)));
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_at_creation() {
        let manager = test_manager();
        let mut config = RoomConfig::default();
        config.roles.pop();
        let err = manager.create_room(config, None).unwrap_err();
        assert!(matches!(err, CreateRoomError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn find_player_room_scans_the_directory() {
        let manager = test_manager();
        let room = manager.create_room(RoomConfig::default(), None).unwrap();
        room.add_player("alice".to_string(), "Alice".to_string(), channel())
            .await
            .unwrap();

        let found = manager.find_player_room(&"alice".to_string()).await;
        assert_eq!(found.unwrap().code, room.code);
        assert!(manager
            .find_player_room(&"nobody".to_string())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn public_waiting_listing_filters_private_rooms() {
        let manager = test_manager();
        manager.create_room(RoomConfig::default(), None).unwrap();
        let private = RoomConfig {
            is_private: true,
            ..RoomConfig::default()
        };
        manager.create_room(private, None).unwrap();

        let listed = manager.list_public_waiting().await;
        assert_eq!(listed.len(), 1);
        assert!(!listed[0].config.is_private);
    }

    #[tokio::test]
    async fn reaper_removes_idle_empty_waiting_rooms() {
        let manager = test_manager();
        let room = manager.create_room(RoomConfig::default(), None).unwrap();
        let code = room.code.clone();
        drop(room);

        // Fresh room is not reaped yet.
        assert_eq!(manager.reap_once().await, 0);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(manager.reap_once().await, 1);
        assert!(manager.get_room(&code).is_none());
    }

    #[tokio::test]
    async fn reaper_spares_rooms_with_connected_humans() {
        let manager = test_manager();
        let room = manager.create_room(RoomConfig::default(), None).unwrap();
        let (tx, _rx) = mpsc::channel(16);
        room.add_player("alice".to_string(), "Alice".to_string(), tx)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(manager.reap_once().await, 0);
        assert!(manager.get_room(&room.code).is_some());
    }
}
