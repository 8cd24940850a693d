//! Default value functions shared by the serde derives.

pub fn default_port() -> u16 {
    3636
}

pub fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub fn default_max_rooms() -> usize {
    500
}

pub fn default_room_timeout_ms() -> u64 {
    300_000
}

pub fn default_reaper_interval_ms() -> u64 {
    60_000
}

pub fn default_grace_period_ms() -> u64 {
    30_000
}

pub fn default_grace_cap_per_room() -> usize {
    3
}

pub fn default_allow_reconnect_after_takeover() -> bool {
    true
}

pub fn default_ping_interval_ms() -> u64 {
    15_000
}

pub fn default_pong_timeout_ms() -> u64 {
    10_000
}

pub fn default_max_message_bytes() -> usize {
    16_384
}

pub fn default_auth_timeout_ms() -> u64 {
    10_000
}

pub fn default_outbound_queue_size() -> usize {
    64
}

pub fn default_max_messages_per_window() -> u32 {
    30
}

pub fn default_rate_window_ms() -> u64 {
    10_000
}

pub fn default_max_room_creations() -> u32 {
    5
}

pub fn default_max_join_attempts() -> u32 {
    20
}

pub fn default_room_code_length() -> usize {
    crate::protocol::DEFAULT_ROOM_CODE_LENGTH
}

pub fn default_min_room_code_length() -> usize {
    4
}

pub fn default_max_room_code_length() -> usize {
    6
}

pub fn default_max_player_name_length() -> usize {
    crate::protocol::DEFAULT_MAX_PLAYER_NAME_LENGTH
}

pub fn default_max_statement_length() -> usize {
    500
}

pub fn default_log_dir() -> String {
    "logs".to_string()
}

pub fn default_log_filename() -> String {
    "server.log".to_string()
}

pub fn default_log_rotation() -> String {
    "daily".to_string()
}

pub fn default_cors_origins() -> String {
    "*".to_string()
}
