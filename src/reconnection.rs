/// Reconnection support module
///
/// Tracks humans who lost their channel during a running game:
/// - grace-period timers before the seat falls to the AI
/// - a per-room cap on concurrent grace periods
/// - whether a seat may still be reclaimed after takeover
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::game::SeatId;
use crate::protocol::{PlayerId, RoomCode};
use crate::room::Room;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectStatus {
    /// Waiting for the human to come back.
    Grace,
    /// Grace expired (or the cap was hit); the AI drives the seat.
    AiTakenOver,
    /// The human returned and the record is finished.
    Reconnected,
    /// The room went away before anything resolved.
    Expired,
}

/// What the room should do right now about a fresh disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectOutcome {
    GracePeriod,
    ImmediateTakeover,
}

#[derive(Debug, Clone)]
pub struct DisconnectRecord {
    pub player_id: PlayerId,
    pub room_code: RoomCode,
    pub seat: SeatId,
    pub name: String,
    pub disconnected_at: DateTime<Utc>,
    pub status: DisconnectStatus,
}

/// Tracks disconnected players across all rooms. Holds identifiers
/// only; rooms are reached through weak references from timer tasks.
pub struct ReconnectionManager {
    records: DashMap<PlayerId, DisconnectRecord>,
    grace_period: Duration,
    grace_cap_per_room: usize,
    allow_reconnect_after_takeover: bool,
}

impl ReconnectionManager {
    pub fn new(
        grace_period: Duration,
        grace_cap_per_room: usize,
        allow_reconnect_after_takeover: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            records: DashMap::new(),
            grace_period,
            grace_cap_per_room,
            allow_reconnect_after_takeover,
        })
    }

    /// Register a disconnect during PLAYING. Returns whether the room
    /// should hand the seat to the AI immediately (grace cap exceeded)
    /// or wait out the grace period.
    pub async fn register_disconnect(
        self: &Arc<Self>,
        room: &Arc<Room>,
        room_code: &RoomCode,
        player_id: &PlayerId,
        seat: SeatId,
        name: &str,
    ) -> ReconnectOutcome {
        let in_grace = self
            .records
            .iter()
            .filter(|r| r.room_code == *room_code && r.status == DisconnectStatus::Grace)
            .count();
        let over_cap = in_grace >= self.grace_cap_per_room;

        let status = if over_cap {
            DisconnectStatus::AiTakenOver
        } else {
            DisconnectStatus::Grace
        };
        self.records.insert(
            player_id.clone(),
            DisconnectRecord {
                player_id: player_id.clone(),
                room_code: room_code.clone(),
                seat,
                name: name.to_string(),
                disconnected_at: Utc::now(),
                status,
            },
        );

        if over_cap {
            tracing::info!(
                %room_code,
                %player_id,
                cap = self.grace_cap_per_room,
                "grace cap exceeded, immediate AI takeover"
            );
            return ReconnectOutcome::ImmediateTakeover;
        }

        tracing::info!(
            %room_code,
            %player_id,
            grace_secs = self.grace_period.as_secs(),
            "disconnect registered, grace period started"
        );
        self.spawn_grace_timer(Arc::downgrade(room), player_id.clone());
        ReconnectOutcome::GracePeriod
    }

    fn spawn_grace_timer(self: &Arc<Self>, room: Weak<Room>, player_id: PlayerId) {
        let manager = Arc::downgrade(self);
        let grace = self.grace_period;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let Some(manager) = manager.upgrade() else {
                return;
            };
            // Only fire if the player is still in their grace period.
            let fire = match manager.records.get_mut(&player_id) {
                Some(mut record) if record.status == DisconnectStatus::Grace => {
                    record.status = DisconnectStatus::AiTakenOver;
                    true
                }
                _ => false,
            };
            if !fire {
                return;
            }
            match room.upgrade() {
                Some(room) => {
                    tracing::info!(%player_id, "grace period expired, AI takes the seat");
                    room.ai_takeover(&player_id).await;
                }
                None => {
                    if let Some(mut record) = manager.records.get_mut(&player_id) {
                        record.status = DisconnectStatus::Expired;
                    }
                }
            }
        });
    }

    /// Current record for a player, if any.
    pub fn record_for(&self, player_id: &PlayerId) -> Option<DisconnectRecord> {
        self.records.get(player_id).map(|r| r.clone())
    }

    /// Whether the player is currently allowed to reclaim their seat.
    pub fn may_reconnect(&self, player_id: &PlayerId) -> bool {
        match self.record_for(player_id) {
            Some(record) => match record.status {
                DisconnectStatus::Grace => true,
                DisconnectStatus::AiTakenOver => self.allow_reconnect_after_takeover,
                DisconnectStatus::Reconnected | DisconnectStatus::Expired => false,
            },
            None => false,
        }
    }

    /// Finish a record on successful reconnection.
    pub fn mark_reconnected(&self, player_id: &PlayerId) -> Option<DisconnectRecord> {
        let (_, mut record) = self.records.remove(player_id)?;
        record.status = DisconnectStatus::Reconnected;
        tracing::info!(player_id = %record.player_id, room_code = %record.room_code, "reconnection completed");
        Some(record)
    }

    /// Drop every record belonging to a destroyed room.
    pub fn purge_room(&self, room_code: &RoomCode) {
        self.records.retain(|_, record| record.room_code != *room_code);
    }

    /// Players of a room currently in their grace window.
    pub fn in_grace_for_room(&self, room_code: &RoomCode) -> Vec<PlayerId> {
        self.records
            .iter()
            .filter(|r| r.room_code == *room_code && r.status == DisconnectStatus::Grace)
            .map(|r| r.player_id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RoomConfig;
    use crate::room::{RoomSettings, Room};

    fn test_manager(cap: usize) -> Arc<ReconnectionManager> {
        ReconnectionManager::new(Duration::from_millis(50), cap, true)
    }

    fn test_room(manager: &Arc<ReconnectionManager>) -> Arc<Room> {
        Room::new(
            "TEST1".to_string(),
            RoomConfig::default(),
            None,
            RoomSettings::default(),
            manager.clone(),
        )
    }

    #[tokio::test]
    async fn grace_then_reconnect_clears_the_record() {
        let manager = ReconnectionManager::new(Duration::from_secs(60), 3, true);
        let room = test_room(&manager);
        let player = "alice".to_string();

        let outcome = manager
            .register_disconnect(&room, &room.code, &player, SeatId::from_index(0), "Alice")
            .await;
        assert_eq!(outcome, ReconnectOutcome::GracePeriod);
        assert!(manager.may_reconnect(&player));
        assert_eq!(manager.in_grace_for_room(&room.code), vec![player.clone()]);

        let record = manager.mark_reconnected(&player).unwrap();
        assert_eq!(record.status, DisconnectStatus::Reconnected);
        assert!(manager.record_for(&player).is_none());
        assert!(!manager.may_reconnect(&player));
    }

    #[tokio::test]
    async fn grace_cap_forces_immediate_takeover() {
        let manager = test_manager(1);
        let room = test_room(&manager);

        let outcome = manager
            .register_disconnect(&room, &room.code, &"p1".to_string(), SeatId::from_index(0), "P1")
            .await;
        assert_eq!(outcome, ReconnectOutcome::GracePeriod);

        let outcome = manager
            .register_disconnect(&room, &room.code, &"p2".to_string(), SeatId::from_index(1), "P2")
            .await;
        assert_eq!(outcome, ReconnectOutcome::ImmediateTakeover);

        let record = manager.record_for(&"p2".to_string()).unwrap();
        assert_eq!(record.status, DisconnectStatus::AiTakenOver);
        // Takeover reconnection remains possible while the flag allows it.
        assert!(manager.may_reconnect(&"p2".to_string()));
    }

    #[tokio::test]
    async fn takeover_reconnect_can_be_disabled() {
        let manager = ReconnectionManager::new(Duration::from_millis(50), 0, false);
        let room = test_room(&manager);
        let player = "p1".to_string();

        let outcome = manager
            .register_disconnect(&room, &room.code, &player, SeatId::from_index(0), "P1")
            .await;
        assert_eq!(outcome, ReconnectOutcome::ImmediateTakeover);
        assert!(!manager.may_reconnect(&player));
    }

    #[tokio::test]
    async fn grace_timer_flips_status() {
        let manager = test_manager(3);
        let room = test_room(&manager);
        let player = "p1".to_string();

        manager
            .register_disconnect(&room, &room.code, &player, SeatId::from_index(0), "P1")
            .await;
        tokio::time::sleep(Duration::from_millis(120)).await;

        let record = manager.record_for(&player).unwrap();
        assert_eq!(record.status, DisconnectStatus::AiTakenOver);
    }

    #[tokio::test]
    async fn purge_room_drops_records() {
        let manager = ReconnectionManager::new(Duration::from_secs(60), 3, true);
        let room = test_room(&manager);
        manager
            .register_disconnect(&room, &room.code, &"p1".to_string(), SeatId::from_index(0), "P1")
            .await;
        manager.purge_room(&room.code);
        assert!(manager.record_for(&"p1".to_string()).is_none());
    }
}
