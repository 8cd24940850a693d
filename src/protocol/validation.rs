use crate::config::ProtocolConfig;

use super::types::{
    MemberInfo, RoomConfig, CENTER_CARD_COUNT, MAX_TABLE_PLAYERS, MIN_TABLE_PLAYERS,
};

pub fn validate_room_code_with_config(code: &str, config: &ProtocolConfig) -> Result<(), String> {
    if code.is_empty() {
        return Err("Room code cannot be empty".to_string());
    }
    if code.len() < config.min_room_code_length || code.len() > config.max_room_code_length {
        return Err(format!(
            "Room code must be {}-{} characters",
            config.min_room_code_length, config.max_room_code_length
        ));
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        return Err("Room code must be uppercase alphanumeric".to_string());
    }
    Ok(())
}

pub fn validate_player_name_with_config(name: &str, config: &ProtocolConfig) -> Result<(), String> {
    if name.is_empty() {
        return Err("Player name cannot be empty".to_string());
    }
    if name.len() > config.max_player_name_length {
        return Err(format!(
            "Player name too long (max {} characters)",
            config.max_player_name_length
        ));
    }

    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("Player name cannot be blank".to_string());
    }
    if trimmed.len() != name.len() {
        return Err("Player name cannot have leading or trailing whitespace".to_string());
    }

    for ch in name.chars() {
        if ch == ' ' {
            continue;
        }
        if ch.is_whitespace() {
            return Err("Player name cannot contain whitespace characters".to_string());
        }
        if ch.is_alphanumeric() || ch == '-' || ch == '_' {
            continue;
        }
        return Err("Player name contains invalid characters".to_string());
    }

    Ok(())
}

pub fn validate_player_name_uniqueness(
    name: &str,
    existing_members: &[MemberInfo],
) -> Result<(), String> {
    let normalized_name = name.to_lowercase();
    for member in existing_members {
        if member.name.to_lowercase() == normalized_name {
            return Err("Player name already exists in this room".to_string());
        }
    }
    Ok(())
}

/// Structural validation of a room config: table bounds plus the
/// role-list-length invariant (`roles.len() == max_players + 3`).
pub fn validate_room_config(config: &RoomConfig) -> Result<(), String> {
    if config.min_players < MIN_TABLE_PLAYERS {
        return Err(format!("Minimum players must be at least {MIN_TABLE_PLAYERS}"));
    }
    if config.max_players > MAX_TABLE_PLAYERS {
        return Err(format!("Maximum players cannot exceed {MAX_TABLE_PLAYERS}"));
    }
    if config.min_players > config.max_players {
        return Err("Minimum players cannot exceed maximum players".to_string());
    }
    if config.roles.len() != config.expected_role_count() {
        return Err(format!(
            "Role list must contain exactly {} roles (max players + {}), got {}",
            config.expected_role_count(),
            CENTER_CARD_COUNT,
            config.roles.len()
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::role::Role;
    use proptest::prelude::*;

    #[test]
    fn test_room_code_validation() {
        let config = ProtocolConfig::default();

        assert!(validate_room_code_with_config("ABC23", &config).is_ok());
        assert!(validate_room_code_with_config("WXYZ", &config).is_ok());
        assert!(validate_room_code_with_config("", &config).is_err());
        assert!(validate_room_code_with_config("abc23", &config).is_err());
        assert!(validate_room_code_with_config("AB", &config).is_err());
        assert!(validate_room_code_with_config("ABCDEFG", &config).is_err());
        assert!(validate_room_code_with_config("AB!23", &config).is_err());
    }

    #[test]
    fn test_player_name_validation() {
        let config = ProtocolConfig::default();

        assert!(validate_player_name_with_config("ValidPlayer", &config).is_ok());
        assert!(validate_player_name_with_config("Player One", &config).is_ok());
        assert!(validate_player_name_with_config("Player-One", &config).is_ok());
        assert!(validate_player_name_with_config("玩家One", &config).is_ok());
        assert!(validate_player_name_with_config("", &config).is_err());
        assert!(validate_player_name_with_config("  ", &config).is_err());
        assert!(validate_player_name_with_config(" spaced ", &config).is_err());
        assert!(validate_player_name_with_config("Player\tOne", &config).is_err());
        assert!(validate_player_name_with_config("User@123", &config).is_err());
    }

    #[test]
    fn test_room_config_validation() {
        let config = RoomConfig::default();
        assert!(validate_room_config(&config).is_ok());

        let mut short_roles = RoomConfig::default();
        short_roles.roles.pop();
        assert!(validate_room_config(&short_roles).is_err());

        let too_small = RoomConfig {
            min_players: 2,
            ..RoomConfig::default()
        };
        assert!(validate_room_config(&too_small).is_err());

        let inverted = RoomConfig {
            min_players: 6,
            max_players: 5,
            ..RoomConfig::default()
        };
        assert!(validate_room_config(&inverted).is_err());

        let too_big = RoomConfig {
            max_players: 11,
            roles: vec![Role::Villager; 14],
            ..RoomConfig::default()
        };
        assert!(validate_room_config(&too_big).is_err());
    }

    fn expected_player_name_ok(name: &str, config: &ProtocolConfig) -> bool {
        if name.is_empty() || name.len() > config.max_player_name_length {
            return false;
        }
        let trimmed = name.trim();
        if trimmed.is_empty() || trimmed.len() != name.len() {
            return false;
        }
        name.chars()
            .all(|c| c == ' ' || c.is_alphanumeric() || c == '-' || c == '_')
            && !name
                .chars()
                .any(|c| c != ' ' && c.is_whitespace())
    }

    fn expected_room_code_ok(code: &str, config: &ProtocolConfig) -> bool {
        code.len() >= config.min_room_code_length
            && code.len() <= config.max_room_code_length
            && code
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    }

    proptest! {
        #[test]
        fn room_code_validation_matches_predicate(raw in proptest::collection::vec(any::<char>(), 0..=10)) {
            let candidate: String = raw.into_iter().collect();
            let config = ProtocolConfig::default();
            prop_assert_eq!(
                validate_room_code_with_config(&candidate, &config).is_ok(),
                expected_room_code_ok(&candidate, &config)
            );
        }

        #[test]
        fn player_name_validation_matches_predicate(raw in proptest::collection::vec(any::<char>(), 0..=40)) {
            let candidate: String = raw.into_iter().collect();
            let config = ProtocolConfig::default();
            prop_assert_eq!(
                validate_player_name_with_config(&candidate, &config).is_ok(),
                expected_player_name_ok(&candidate, &config)
            );
        }
    }
}
