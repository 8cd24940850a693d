// Protocol module: message types, error codes, join codes, field validation

pub mod error_codes;
pub mod messages;
pub mod room_codes;
pub mod types;
pub mod validation;

pub use error_codes::ErrorCode;

pub use types::{
    DebugOptions, ForcedRole, MemberInfo, PlayerId, RequestId, RoomCode, RoomConfig,
    RoomConfigPatch, RoomSnapshot, RoomStatus, TimeoutProfile, CENTER_CARD_COUNT,
    DEFAULT_MAX_PLAYER_NAME_LENGTH, DEFAULT_ROOM_CODE_LENGTH, MAX_TABLE_PLAYERS,
    MIN_TABLE_PLAYERS,
};

pub use messages::{ActionAnswer, ActionPrompt, ClientMessage, ServerMessage};
