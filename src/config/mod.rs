//! Configuration module for the Nightfall server.
//!
//! Supports JSON configuration files, environment variable overrides,
//! and sensible defaults.
//!
//! # Module Structure
//!
//! - [`types`]: Root `Config` struct
//! - [`server`]: Server behavior (rooms, grace periods, liveness, bounds)
//! - [`protocol`]: Protocol limits (join codes, field lengths)
//! - [`timeouts`]: Per-phase deadlines for the timeout profiles
//! - [`logging`]: Logging configuration
//! - [`loader`]: Configuration loading functions
//! - [`validation`]: Configuration validation functions
//! - [`defaults`]: Default value functions

pub mod defaults;
pub mod loader;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod timeouts;
pub mod types;
pub mod validation;

pub use loader::load;

pub use logging::{LogFormat, LogLevel, LoggingConfig};

pub use protocol::ProtocolConfig;

pub use server::{RateLimitConfig, ServerConfig};

pub use timeouts::PhaseDeadlines;

pub use types::Config;

pub use validation::validate_config;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();

        assert_eq!(config.port, 3636);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.server.max_rooms, 500);
        assert_eq!(config.server.grace_period_ms, 30_000);
        assert_eq!(config.server.ping_interval_ms, 15_000);
        assert_eq!(config.server.pong_timeout_ms, 10_000);
        assert_eq!(config.server.max_message_bytes, 16_384);

        assert_eq!(config.rate_limit.max_room_creations, 5);
        assert_eq!(config.rate_limit.max_join_attempts, 20);

        assert_eq!(config.protocol.room_code_length, 5);
        assert_eq!(config.protocol.min_room_code_length, 4);
        assert_eq!(config.protocol.max_room_code_length, 6);
        assert_eq!(config.protocol.max_player_name_length, 32);

        assert_eq!(config.logging.dir, "logs");
        assert_eq!(config.logging.filename, "server.log");
        assert_eq!(config.logging.rotation, "daily");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let deserialized: Config = serde_json::from_str(&json).unwrap();

        assert_eq!(config.port, deserialized.port);
        assert_eq!(config.server.max_rooms, deserialized.server.max_rooms);
        assert_eq!(
            config.rate_limit.max_room_creations,
            deserialized.rate_limit.max_room_creations
        );
        assert_eq!(
            config.protocol.room_code_length,
            deserialized.protocol.room_code_length
        );
    }

    #[test]
    fn test_log_level_display() {
        assert_eq!(LogLevel::Trace.to_string(), "trace");
        assert_eq!(LogLevel::Debug.to_string(), "debug");
        assert_eq!(LogLevel::Info.to_string(), "info");
        assert_eq!(LogLevel::Warn.to_string(), "warn");
        assert_eq!(LogLevel::Error.to_string(), "error");
    }
}
