//! Protocol-level limits: join code shape and field lengths.

use serde::{Deserialize, Serialize};

use super::defaults::{
    default_max_player_name_length, default_max_room_code_length, default_max_statement_length,
    default_min_room_code_length, default_room_code_length,
};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProtocolConfig {
    /// Length of generated join codes.
    #[serde(default = "default_room_code_length")]
    pub room_code_length: usize,
    /// Accepted join code length range (generated codes always sit
    /// inside it).
    #[serde(default = "default_min_room_code_length")]
    pub min_room_code_length: usize,
    #[serde(default = "default_max_room_code_length")]
    pub max_room_code_length: usize,
    #[serde(default = "default_max_player_name_length")]
    pub max_player_name_length: usize,
    /// Day-phase statements longer than this are rejected.
    #[serde(default = "default_max_statement_length")]
    pub max_statement_length: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            room_code_length: default_room_code_length(),
            min_room_code_length: default_min_room_code_length(),
            max_room_code_length: default_max_room_code_length(),
            max_player_name_length: default_max_player_name_length(),
            max_statement_length: default_max_statement_length(),
        }
    }
}
