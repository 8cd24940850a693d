use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for structured error handling
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Session errors
    AuthRequired,
    AlreadyAuthenticated,

    // Room errors
    NotInRoom,
    AlreadyInRoom,
    NotHost,
    RoomNotFound,
    RoomFull,
    RoomLimitReached,
    InvalidConfig,
    InvalidName,

    // Game errors
    InvalidPhase,
    InvalidTarget,
    ActionTimeout,
    UnknownRequest,

    // Transport errors
    RateLimited,
    MessageTooLarge,
    InvalidMessage,

    // Server errors
    InternalError,
}

impl ErrorCode {
    /// Returns a human-readable description of this error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::AuthRequired => {
                "This operation requires authentication. Send an authenticate message first."
            }
            Self::AlreadyAuthenticated => {
                "The session is already authenticated and cannot authenticate again."
            }
            Self::NotInRoom => {
                "You are not currently in any room. Join a room before performing this action."
            }
            Self::AlreadyInRoom => {
                "You are already in a room. Leave the current room before joining another."
            }
            Self::NotHost => "Only the room host may perform this action.",
            Self::RoomNotFound => {
                "The requested room could not be found. It may have been closed or the code is incorrect."
            }
            Self::RoomFull => {
                "The room has reached its maximum player capacity. Try joining a different room."
            }
            Self::RoomLimitReached => {
                "The server has reached its room limit. Please try again later."
            }
            Self::InvalidConfig => {
                "The room configuration is invalid. Check player limits and the role list length."
            }
            Self::InvalidName => {
                "The player name is invalid. Names must be non-empty and meet length requirements."
            }
            Self::InvalidPhase => {
                "The game is not in a phase where this action is allowed."
            }
            Self::InvalidTarget => {
                "The selected target is not among the offered options."
            }
            Self::ActionTimeout => {
                "The prompt deadline elapsed and a default action was applied."
            }
            Self::UnknownRequest => {
                "No pending prompt matches that request id. It may already be resolved."
            }
            Self::RateLimited => {
                "Too many requests in a short time. Please slow down and try again later."
            }
            Self::MessageTooLarge => {
                "The message size exceeds the maximum allowed limit. Please send a smaller message."
            }
            Self::InvalidMessage => {
                "The message could not be parsed or is not valid in this context."
            }
            Self::InternalError => {
                "An internal server error occurred. Please try again or contact support if the issue persists."
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_error_codes_have_descriptions() {
        let error_codes = [
            ErrorCode::AuthRequired,
            ErrorCode::AlreadyAuthenticated,
            ErrorCode::NotInRoom,
            ErrorCode::AlreadyInRoom,
            ErrorCode::NotHost,
            ErrorCode::RoomNotFound,
            ErrorCode::RoomFull,
            ErrorCode::RoomLimitReached,
            ErrorCode::InvalidConfig,
            ErrorCode::InvalidName,
            ErrorCode::InvalidPhase,
            ErrorCode::InvalidTarget,
            ErrorCode::ActionTimeout,
            ErrorCode::UnknownRequest,
            ErrorCode::RateLimited,
            ErrorCode::MessageTooLarge,
            ErrorCode::InvalidMessage,
            ErrorCode::InternalError,
        ];

        for error_code in &error_codes {
            let description = error_code.description();
            assert!(
                description.len() > 10,
                "ErrorCode::{:?} has suspiciously short description: '{}'",
                error_code,
                description
            );
        }
    }

    #[test]
    fn test_serialization_matches_reserved_codes() {
        // The wire representation is part of the protocol contract.
        for (code, expected) in [
            (ErrorCode::AuthRequired, "\"AUTH_REQUIRED\""),
            (ErrorCode::NotInRoom, "\"NOT_IN_ROOM\""),
            (ErrorCode::NotHost, "\"NOT_HOST\""),
            (ErrorCode::RoomNotFound, "\"ROOM_NOT_FOUND\""),
            (ErrorCode::RoomFull, "\"ROOM_FULL\""),
            (ErrorCode::InvalidPhase, "\"INVALID_PHASE\""),
            (ErrorCode::InvalidTarget, "\"INVALID_TARGET\""),
            (ErrorCode::ActionTimeout, "\"ACTION_TIMEOUT\""),
            (ErrorCode::RateLimited, "\"RATE_LIMITED\""),
            (ErrorCode::InternalError, "\"INTERNAL_ERROR\""),
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, expected);
        }
    }

    #[test]
    fn test_display_uses_description() {
        let error = ErrorCode::RoomNotFound;
        assert_eq!(format!("{}", error), error.description());
    }
}
