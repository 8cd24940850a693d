use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::role::Role;

/// Stable external identity of a player, supplied at authentication.
/// The gateway keys sessions by it; rooms key members by it.
pub type PlayerId = String;

/// Correlation id for a pending server-to-player prompt.
pub type RequestId = Uuid;

/// Short uppercase alphanumeric join code, unique over live rooms.
pub type RoomCode = String;

/// Number of cards dealt to the center of the table.
pub const CENTER_CARD_COUNT: usize = 3;

/// Smallest playable table.
pub const MIN_TABLE_PLAYERS: usize = 3;

/// Largest playable table.
pub const MAX_TABLE_PLAYERS: usize = 10;

pub const DEFAULT_ROOM_CODE_LENGTH: usize = 5;
pub const DEFAULT_MAX_PLAYER_NAME_LENGTH: usize = 32;

/// Per-phase deadline preset selected in the room config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutProfile {
    #[default]
    Casual,
    Competitive,
    Tournament,
}

/// Room configuration as carried in the protocol and held by the room.
///
/// Invariant: `roles.len() == max_players + CENTER_CARD_COUNT`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomConfig {
    pub min_players: usize,
    pub max_players: usize,
    pub roles: Vec<Role>,
    #[serde(default)]
    pub timeout_profile: TimeoutProfile,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub allow_spectators: bool,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            min_players: MIN_TABLE_PLAYERS,
            max_players: 5,
            roles: vec![
                Role::Werewolf,
                Role::Werewolf,
                Role::Seer,
                Role::Robber,
                Role::Troublemaker,
                Role::Villager,
                Role::Villager,
                Role::Drunk,
            ],
            timeout_profile: TimeoutProfile::Casual,
            is_private: false,
            allow_spectators: false,
        }
    }
}

impl RoomConfig {
    /// Role-list length the config must carry for its table size.
    pub fn expected_role_count(&self) -> usize {
        self.max_players + CENTER_CARD_COUNT
    }
}

/// Partial config update sent by the host while the room is waiting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_players: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_players: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<Role>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_profile: Option<TimeoutProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_private: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_spectators: Option<bool>,
}

/// Debug knobs honored only for rooms created with `debug`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugOptions {
    /// Force specific seats (by join order, 0-based) to specific roles
    /// before the remaining cards are shuffled.
    #[serde(default)]
    pub forced_roles: Vec<ForcedRole>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForcedRole {
    pub seat_index: usize,
    pub role: Role,
}

/// Public roster entry inside room snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberInfo {
    pub id: PlayerId,
    pub name: String,
    pub is_host: bool,
    pub is_ai: bool,
    pub is_ready: bool,
    pub is_connected: bool,
    pub joined_at: DateTime<Utc>,
}

/// Room lifecycle state carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Waiting,
    Starting,
    Playing,
    Ended,
    Closed,
}

/// Full public room state, broadcast after every membership or config change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub code: RoomCode,
    pub status: RoomStatus,
    pub host: Option<PlayerId>,
    pub config: RoomConfig,
    pub members: Vec<MemberInfo>,
}
