//! Server behavior configuration: room directory limits, reconnection
//! grace, liveness, and transport bounds. All durations are plain
//! millisecond integers so they read naturally from JSON and env vars.

use serde::{Deserialize, Serialize};

use super::defaults::{
    default_allow_reconnect_after_takeover, default_auth_timeout_ms, default_grace_cap_per_room,
    default_grace_period_ms, default_max_join_attempts, default_max_message_bytes,
    default_max_messages_per_window, default_max_room_creations, default_max_rooms,
    default_outbound_queue_size, default_ping_interval_ms, default_pong_timeout_ms,
    default_rate_window_ms, default_reaper_interval_ms, default_room_timeout_ms,
};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// Directory cap; room creation aborts beyond it.
    #[serde(default = "default_max_rooms")]
    pub max_rooms: usize,
    /// A waiting room with zero connected humans is reaped after this.
    #[serde(default = "default_room_timeout_ms")]
    pub room_timeout_ms: u64,
    /// How often the reaper sweeps the directory.
    #[serde(default = "default_reaper_interval_ms")]
    pub reaper_interval_ms: u64,
    /// How long a disconnected human may return before AI takeover.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    /// Concurrent grace-period disconnects allowed per room; beyond the
    /// cap takeover is immediate.
    #[serde(default = "default_grace_cap_per_room")]
    pub grace_cap_per_room: usize,
    /// Whether a human may rebind their seat after AI takeover.
    #[serde(default = "default_allow_reconnect_after_takeover")]
    pub allow_reconnect_after_takeover: bool,
    /// Application-level ping cadence.
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    /// How long after a ping the peer may stay silent before the
    /// channel is considered dead.
    #[serde(default = "default_pong_timeout_ms")]
    pub pong_timeout_ms: u64,
    /// Maximum inbound frame size.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
    /// How long a fresh channel may stay unauthenticated.
    #[serde(default = "default_auth_timeout_ms")]
    pub auth_timeout_ms: u64,
    /// Per-connection outbound queue bound; overflow counts as a
    /// disconnect.
    #[serde(default = "default_outbound_queue_size")]
    pub outbound_queue_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_rooms: default_max_rooms(),
            room_timeout_ms: default_room_timeout_ms(),
            reaper_interval_ms: default_reaper_interval_ms(),
            grace_period_ms: default_grace_period_ms(),
            grace_cap_per_room: default_grace_cap_per_room(),
            allow_reconnect_after_takeover: default_allow_reconnect_after_takeover(),
            ping_interval_ms: default_ping_interval_ms(),
            pong_timeout_ms: default_pong_timeout_ms(),
            max_message_bytes: default_max_message_bytes(),
            auth_timeout_ms: default_auth_timeout_ms(),
            outbound_queue_size: default_outbound_queue_size(),
        }
    }
}

/// Inbound rate limits, per connection and per player.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RateLimitConfig {
    /// Messages accepted per connection per window.
    #[serde(default = "default_max_messages_per_window")]
    pub max_messages_per_window: u32,
    #[serde(default = "default_rate_window_ms")]
    pub window_ms: u64,
    /// Room creations per player per window.
    #[serde(default = "default_max_room_creations")]
    pub max_room_creations: u32,
    /// Join attempts per player per window.
    #[serde(default = "default_max_join_attempts")]
    pub max_join_attempts: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_messages_per_window: default_max_messages_per_window(),
            window_ms: default_rate_window_ms(),
            max_room_creations: default_max_room_creations(),
            max_join_attempts: default_max_join_attempts(),
        }
    }
}
