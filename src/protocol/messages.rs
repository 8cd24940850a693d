use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::error_codes::ErrorCode;
use super::types::{
    DebugOptions, PlayerId, RequestId, RoomCode, RoomConfig, RoomConfigPatch, RoomSnapshot,
    CENTER_CARD_COUNT,
};
use crate::game::decision::SeerMode;
use crate::game::engine::Phase;
use crate::game::night::NightResult;
use crate::game::view::{GameSummary, PlayerView};

/// Message types sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Open a session (MUST be first message). The caller arrives already
    /// identified; the optional token is opaque to the core.
    #[serde(rename_all = "camelCase")]
    Authenticate {
        player_id: PlayerId,
        player_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },
    /// Create a room; the caller becomes host
    #[serde(rename_all = "camelCase")]
    CreateRoom {
        #[serde(default)]
        config: RoomConfig,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        debug: Option<DebugOptions>,
    },
    /// Join an existing room by code
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        room_code: RoomCode,
        player_name: String,
    },
    /// Leave the current room
    LeaveRoom,
    /// Toggle readiness in the lobby
    #[serde(rename_all = "camelCase")]
    SetReady { ready: bool },
    /// Add an AI seat (host only, lobby only)
    #[serde(rename = "addAI")]
    AddAi,
    /// Kick a member (host only)
    #[serde(rename_all = "camelCase")]
    RemovePlayer { player_id: PlayerId },
    /// Patch the room config (host only, lobby only)
    #[serde(rename_all = "camelCase")]
    UpdateRoomConfig { config: RoomConfigPatch },
    /// Start the game (host only)
    StartGame,
    /// Say something during the day phase
    #[serde(rename_all = "camelCase")]
    SubmitStatement {
        statement: String,
        /// Client-side submission time, used for at-most-once delivery.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },
    /// Signal willingness to move to the vote
    ReadyToVote,
    /// Answer a pending prompt
    #[serde(rename_all = "camelCase")]
    ActionResponse {
        request_id: RequestId,
        response: ActionAnswer,
    },
    /// Heartbeat to maintain connection
    Ping,
    /// Reply to a server-initiated ping
    Pong,
}

/// Prompt pushed to a player when the engine needs a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "actionType", rename_all = "camelCase")]
pub enum ActionPrompt {
    /// Pick one player from the offered list
    #[serde(rename_all = "camelCase")]
    SelectPlayer { options: Vec<PlayerId> },
    /// Pick two distinct players from the offered list
    #[serde(rename_all = "camelCase")]
    SelectTwoPlayers { options: Vec<PlayerId> },
    /// Pick `count` distinct center card indices out of {0,1,2}
    #[serde(rename_all = "camelCase")]
    SelectCenter { count: usize },
    /// Choose between viewing a player or two center cards
    SeerChoice,
    /// Produce a day-phase statement
    MakeStatement,
    /// Cast the end-of-day vote
    #[serde(rename_all = "camelCase")]
    Vote { options: Vec<PlayerId> },
}

/// Answer shape for each prompt kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ActionAnswer {
    #[serde(rename_all = "camelCase")]
    Player { player_id: PlayerId },
    #[serde(rename_all = "camelCase")]
    Players { player_ids: Vec<PlayerId> },
    #[serde(rename_all = "camelCase")]
    Center { indices: Vec<usize> },
    #[serde(rename_all = "camelCase")]
    SeerMode { mode: SeerMode },
    #[serde(rename_all = "camelCase")]
    Statement { text: String },
    #[serde(rename_all = "camelCase")]
    Vote { target: PlayerId },
}

impl ActionPrompt {
    /// The documented deterministic fallback applied when a prompt's
    /// deadline elapses: selections take the first option(s), center
    /// picks take the lowest indices, the seer falls back to the center,
    /// and the vote goes to a uniformly chosen eligible target.
    pub fn default_answer(&self) -> ActionAnswer {
        use rand::RngExt;

        match self {
            ActionPrompt::SelectPlayer { options } => ActionAnswer::Player {
                player_id: options.first().cloned().unwrap_or_default(),
            },
            ActionPrompt::SelectTwoPlayers { options } => ActionAnswer::Players {
                player_ids: options.iter().take(2).cloned().collect(),
            },
            ActionPrompt::SelectCenter { count } => ActionAnswer::Center {
                indices: (0..*count.min(&CENTER_CARD_COUNT)).collect(),
            },
            ActionPrompt::SeerChoice => ActionAnswer::SeerMode {
                mode: SeerMode::Center,
            },
            ActionPrompt::MakeStatement => ActionAnswer::Statement {
                text: String::new(),
            },
            ActionPrompt::Vote { options } => {
                let target = if options.is_empty() {
                    String::new()
                } else {
                    let mut rng = rand::rng();
                    options[rng.random_range(0..options.len())].clone()
                };
                ActionAnswer::Vote { target }
            }
        }
    }
}

/// Message types sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Session established
    #[serde(rename_all = "camelCase")]
    Authenticated {
        player_id: PlayerId,
        player_name: String,
    },
    /// Room created by this client (unicast to the host)
    #[serde(rename_all = "camelCase")]
    RoomCreated { room: RoomSnapshot },
    /// This client joined a room
    #[serde(rename_all = "camelCase")]
    RoomJoined { room: RoomSnapshot },
    /// Membership, readiness, or config changed
    #[serde(rename_all = "camelCase")]
    RoomUpdate { room: RoomSnapshot },
    /// The room is gone
    #[serde(rename_all = "camelCase")]
    RoomClosed { room_code: RoomCode, reason: String },
    /// The game launched; carries this player's initial view and the
    /// seat-to-player mapping so clients can resolve engine ids.
    #[serde(rename_all = "camelCase")]
    GameStarted {
        view: Box<PlayerView<PlayerId>>,
        seat_map: BTreeMap<String, PlayerId>,
    },
    /// The engine moved to a new phase
    #[serde(rename_all = "camelCase")]
    PhaseChange {
        phase: Phase,
        #[serde(skip_serializing_if = "Option::is_none")]
        time_remaining_ms: Option<u64>,
    },
    /// Full sanitized view, used for reconnection catch-up
    #[serde(rename_all = "camelCase")]
    GameState { view: Box<PlayerView<PlayerId>> },
    /// The engine needs a decision from this player
    #[serde(rename_all = "camelCase")]
    ActionRequired {
        request_id: RequestId,
        action: ActionPrompt,
        timeout_ms: u64,
    },
    /// The player's answer was accepted
    #[serde(rename_all = "camelCase")]
    ActionAcknowledged { request_id: RequestId },
    /// The prompt deadline elapsed; `applied` is the default the server used
    #[serde(rename_all = "camelCase")]
    ActionTimeout {
        request_id: RequestId,
        applied: ActionAnswer,
    },
    /// Private night observation (unicast to the acting player)
    #[serde(rename_all = "camelCase")]
    NightResult { result: NightResult<PlayerId> },
    /// A day-phase statement (fanned out in arrival order)
    #[serde(rename_all = "camelCase")]
    StatementMade {
        player_id: PlayerId,
        text: String,
        timestamp: DateTime<Utc>,
    },
    /// The complete vote map, revealed atomically at vote close
    #[serde(rename_all = "camelCase")]
    VotesRevealed { votes: BTreeMap<PlayerId, PlayerId> },
    /// Players eliminated by the tally (and Hunter chain)
    #[serde(rename_all = "camelCase")]
    Elimination { player_ids: Vec<PlayerId> },
    /// Final result: winners, final roles, center cards
    #[serde(rename_all = "camelCase")]
    GameEnd { result: GameSummary<PlayerId> },
    /// A member lost their channel
    #[serde(rename_all = "camelCase")]
    PlayerDisconnected {
        player_id: PlayerId,
        ai_takeover: bool,
    },
    /// A member returned
    #[serde(rename_all = "camelCase")]
    PlayerReconnected {
        player_id: PlayerId,
        ai_takeover: bool,
    },
    /// Server-initiated liveness probe
    Ping,
    /// Reply to a client ping
    Pong,
    /// Typed error; the session stays open unless transport-level
    #[serde(rename_all = "camelCase")]
    Error {
        code: ErrorCode,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
    },
}

impl ServerMessage {
    /// Shorthand for the common error reply.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
            details: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_message_type_tags_match_protocol() {
        let msg = ClientMessage::Authenticate {
            player_id: "p1".into(),
            player_name: "Alice".into(),
            token: None,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "authenticate");
        assert_eq!(json["playerId"], "p1");

        let msg = ClientMessage::AddAi;
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "addAI");

        let msg = ClientMessage::ReadyToVote;
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "readyToVote");
    }

    #[test]
    fn error_message_shape_is_flat() {
        let msg = ServerMessage::error(ErrorCode::NotHost, "nope");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "NOT_HOST");
        assert_eq!(json["message"], "nope");
        assert!(json.get("details").is_none());
    }

    #[test]
    fn action_answer_round_trips() {
        let answer = ActionAnswer::Center {
            indices: vec![0, 2],
        };
        let json = serde_json::to_string(&answer).unwrap();
        let back: ActionAnswer = serde_json::from_str(&json).unwrap();
        assert_eq!(answer, back);

        let answer = ActionAnswer::SeerMode {
            mode: SeerMode::Center,
        };
        let json = serde_json::to_value(&answer).unwrap();
        assert_eq!(json["kind"], "seerMode");
        assert_eq!(json["mode"], "center");
    }

    #[test]
    fn action_response_parses_from_wire_form() {
        let raw = r#"{
            "type": "actionResponse",
            "requestId": "6f2b1d4e-94a7-4f7b-9b3a-0e8a24f6d7c1",
            "response": {"kind": "vote", "target": "p3"}
        }"#;
        let msg: ClientMessage = serde_json::from_str(raw).unwrap();
        match msg {
            ClientMessage::ActionResponse { response, .. } => {
                assert_eq!(
                    response,
                    ActionAnswer::Vote {
                        target: "p3".into()
                    }
                );
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
