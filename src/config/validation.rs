//! Configuration validation.

use super::Config;

/// Sanity-check a loaded configuration. Returns a newline-separated list
/// of every problem found.
pub fn validate_config(config: &Config) -> Result<(), String> {
    let mut problems = Vec::new();

    if config.server.max_rooms == 0 {
        problems.push("server.max_rooms must be at least 1".to_string());
    }
    if config.server.grace_period_ms == 0 {
        problems.push("server.grace_period_ms must be positive".to_string());
    }
    if config.server.ping_interval_ms == 0 {
        problems.push("server.ping_interval_ms must be positive".to_string());
    }
    if config.server.pong_timeout_ms == 0 {
        problems.push("server.pong_timeout_ms must be positive".to_string());
    }
    if config.server.max_message_bytes < 256 {
        problems.push("server.max_message_bytes must be at least 256".to_string());
    }
    if config.server.outbound_queue_size == 0 {
        problems.push("server.outbound_queue_size must be at least 1".to_string());
    }

    if config.rate_limit.max_messages_per_window == 0 {
        problems.push("rate_limit.max_messages_per_window must be positive".to_string());
    }
    if config.rate_limit.window_ms == 0 {
        problems.push("rate_limit.window_ms must be positive".to_string());
    }

    if config.protocol.min_room_code_length < 4 {
        problems.push("protocol.min_room_code_length must be at least 4".to_string());
    }
    if config.protocol.max_room_code_length > 6 {
        problems.push("protocol.max_room_code_length cannot exceed 6".to_string());
    }
    if config.protocol.min_room_code_length > config.protocol.max_room_code_length {
        problems.push(
            "protocol.min_room_code_length cannot exceed protocol.max_room_code_length".to_string(),
        );
    }
    if config.protocol.room_code_length < config.protocol.min_room_code_length
        || config.protocol.room_code_length > config.protocol.max_room_code_length
    {
        problems.push(
            "protocol.room_code_length must sit inside the accepted length range".to_string(),
        );
    }
    if config.protocol.max_player_name_length == 0 {
        problems.push("protocol.max_player_name_length must be positive".to_string());
    }
    if config.protocol.max_statement_length == 0 {
        problems.push("protocol.max_statement_length must be positive".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems.join("\n"))
    }
}
