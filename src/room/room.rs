use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex, Notify};

use super::provider::HumanSeatProvider;
use super::seat_map::SeatMap;
use crate::config::PhaseDeadlines;
use crate::game::decision::{
    AiProvider, Cancelled, PendingDecisions, ProviderCell, ResolveError, SeatProviders,
};
use crate::game::engine::{Engine, EngineEvent, GameState, Phase, SeatInit, Statement};
use crate::game::view::{self, PlayerView};
use crate::game::SeatId;
use crate::protocol::{
    validation, ActionAnswer, ActionPrompt, DebugOptions, ErrorCode, MemberInfo, PlayerId,
    RequestId, RoomCode, RoomConfig, RoomConfigPatch, RoomSnapshot, RoomStatus, ServerMessage,
};
use crate::reconnection::{ReconnectOutcome, ReconnectionManager};

/// Typed room-level failures; each maps onto a wire error code.
#[derive(Debug, Error)]
pub enum RoomError {
    #[error("only the host may perform this action")]
    NotHost,
    #[error("player is not a member of this room")]
    NotInRoom,
    #[error("player is already a member of this room")]
    AlreadyInRoom,
    #[error("room is full")]
    RoomFull,
    #[error("action not allowed while the room is {0:?}")]
    WrongStatus(RoomStatus),
    #[error("invalid room config: {0}")]
    InvalidConfig(String),
    #[error("action not allowed in the current game phase")]
    InvalidPhase,
    #[error("not every player is ready")]
    NotReady,
    #[error("no pending prompt matches that request id")]
    UnknownRequest,
    #[error("the selected target is not among the offered options")]
    InvalidTarget,
    #[error("statement rejected: {0}")]
    InvalidStatement(String),
    #[error("internal room error: {0}")]
    Internal(String),
}

impl RoomError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RoomError::NotHost => ErrorCode::NotHost,
            RoomError::NotInRoom => ErrorCode::NotInRoom,
            RoomError::AlreadyInRoom => ErrorCode::AlreadyInRoom,
            RoomError::RoomFull => ErrorCode::RoomFull,
            RoomError::WrongStatus(_) | RoomError::InvalidPhase | RoomError::NotReady => {
                ErrorCode::InvalidPhase
            }
            RoomError::InvalidConfig(_) => ErrorCode::InvalidConfig,
            RoomError::UnknownRequest => ErrorCode::UnknownRequest,
            RoomError::InvalidTarget => ErrorCode::InvalidTarget,
            RoomError::InvalidStatement(_) => ErrorCode::InvalidMessage,
            RoomError::Internal(_) => ErrorCode::InternalError,
        }
    }
}

/// One room member. Channels are owned by the gateway; the room only
/// holds a sender and drops it the moment the member disconnects.
#[derive(Debug)]
pub struct Member {
    pub id: PlayerId,
    pub name: String,
    pub is_ai: bool,
    pub is_ready: bool,
    pub is_connected: bool,
    pub joined_at: DateTime<Utc>,
    pub channel: Option<mpsc::Sender<ServerMessage>>,
}

impl Member {
    fn info(&self, host: Option<&PlayerId>) -> MemberInfo {
        MemberInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            is_host: host == Some(&self.id),
            is_ai: self.is_ai,
            is_ready: self.is_ready,
            is_connected: self.is_connected,
            joined_at: self.joined_at,
        }
    }
}

/// Everything a running game adds to the room.
pub struct GameHandle {
    pub state: Arc<Mutex<GameState>>,
    pub providers: Arc<SeatProviders>,
    pub pending: Arc<PendingDecisions>,
    pub day_wake: Arc<Notify>,
    pub deadlines: PhaseDeadlines,
    engine_task: tokio::task::JoinHandle<()>,
    pump_task: tokio::task::JoinHandle<()>,
}

pub struct RoomState {
    pub status: RoomStatus,
    pub host: Option<PlayerId>,
    pub config: RoomConfig,
    pub debug: Option<DebugOptions>,
    pub members: Vec<Member>,
    pub seat_map: SeatMap,
    pub game: Option<GameHandle>,
    /// At-most-once guard for re-delivered statements.
    seen_statements: HashSet<(PlayerId, String, i64)>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    ai_counter: usize,
}

/// Room-scoped tunables copied out of the server config at creation.
#[derive(Debug, Clone)]
pub struct RoomSettings {
    pub max_statement_length: usize,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            max_statement_length: 500,
        }
    }
}

/// One game session: lobby membership, the running engine, and the
/// single serialization point for everything the room emits. All state
/// lives behind one async mutex, which is what makes the broadcast
/// ordering guarantee automatic.
pub struct Room {
    pub code: RoomCode,
    state: Mutex<RoomState>,
    settings: RoomSettings,
    reconnect: Arc<ReconnectionManager>,
    /// Self-reference for work spawned from under the room lock.
    weak: Weak<Room>,
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("code", &self.code)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Room {
    pub fn new(
        code: RoomCode,
        config: RoomConfig,
        debug: Option<DebugOptions>,
        settings: RoomSettings,
        reconnect: Arc<ReconnectionManager>,
    ) -> Arc<Self> {
        let now = Utc::now();
        Arc::new_cyclic(|weak| Self {
            code,
            state: Mutex::new(RoomState {
                status: RoomStatus::Waiting,
                host: None,
                config,
                debug,
                members: Vec::new(),
                seat_map: SeatMap::default(),
                game: None,
                seen_statements: HashSet::new(),
                created_at: now,
                last_activity: now,
                ai_counter: 0,
            }),
            settings,
            reconnect,
            weak: weak.clone(),
        })
    }

    // ------------------------------------------------------------------
    // Lobby operations
    // ------------------------------------------------------------------

    /// Join in WAITING, or rebind the channel of a member who dropped
    /// out of the lobby. Reconnection during PLAYING goes through
    /// [`Room::reconnect_player`].
    pub async fn add_player(
        self: &Arc<Self>,
        id: PlayerId,
        name: String,
        channel: mpsc::Sender<ServerMessage>,
    ) -> Result<RoomSnapshot, RoomError> {
        let mut state = self.state.lock().await;
        if state.status != RoomStatus::Waiting {
            return Err(RoomError::WrongStatus(state.status));
        }

        match state.members.iter().position(|m| m.id == id) {
            Some(position) => {
                let member = &mut state.members[position];
                if member.is_connected {
                    return Err(RoomError::AlreadyInRoom);
                }
                member.is_connected = true;
                member.channel = Some(channel);
            }
            None => {
                if state.members.len() >= state.config.max_players {
                    return Err(RoomError::RoomFull);
                }
                let first_human = !state.members.iter().any(|m| !m.is_ai);
                state.members.push(Member {
                    id: id.clone(),
                    name,
                    is_ai: false,
                    is_ready: false,
                    is_connected: true,
                    joined_at: Utc::now(),
                    channel: Some(channel),
                });
                if first_human {
                    state.host = Some(id.clone());
                }
            }
        }

        state.last_activity = Utc::now();
        tracing::info!(room_code = %self.code, player_id = %id, "player joined room");
        let snapshot = self.snapshot_locked(&state);
        self.broadcast_locked(&mut state, ServerMessage::RoomUpdate {
            room: snapshot.clone(),
        });
        Ok(snapshot)
    }

    /// Host-only: add an AI seat in WAITING.
    pub async fn add_ai(self: &Arc<Self>, host_id: &PlayerId) -> Result<(), RoomError> {
        let mut state = self.state.lock().await;
        self.require_waiting(&state)?;
        self.require_host(&state, host_id)?;
        if state.members.len() >= state.config.max_players {
            return Err(RoomError::RoomFull);
        }

        state.ai_counter += 1;
        let id = format!("{}-bot-{}", self.code.to_lowercase(), state.ai_counter);
        let name = format!("Bot {}", state.ai_counter);
        state.members.push(Member {
            id,
            name,
            is_ai: true,
            is_ready: true,
            is_connected: false,
            joined_at: Utc::now(),
            channel: None,
        });
        state.last_activity = Utc::now();
        self.broadcast_room_update(&mut state);
        Ok(())
    }

    /// Voluntary leave. In WAITING the member is removed outright; in
    /// PLAYING this is the disconnect path.
    pub async fn leave(self: &Arc<Self>, id: &PlayerId) -> Result<(), RoomError> {
        let status = {
            let state = self.state.lock().await;
            if !state.members.iter().any(|m| m.id == *id) {
                return Err(RoomError::NotInRoom);
            }
            state.status
        };
        match status {
            RoomStatus::Waiting => {
                let mut state = self.state.lock().await;
                self.remove_member_locked(&mut state, id);
                Ok(())
            }
            RoomStatus::Playing => {
                self.handle_disconnect(id).await;
                Ok(())
            }
            // Ended or closed rooms have nothing left to leave.
            _ => Ok(()),
        }
    }

    /// Host-only kick. In WAITING the member (human or AI) is removed
    /// outright; in PLAYING the seat goes down the disconnect path and
    /// the reconnection manager takes it from there.
    pub async fn kick(
        self: &Arc<Self>,
        host_id: &PlayerId,
        target: &PlayerId,
    ) -> Result<(), RoomError> {
        let status = {
            let state = self.state.lock().await;
            self.require_host(&state, host_id)?;
            if !state.members.iter().any(|m| m.id == *target) {
                return Err(RoomError::NotInRoom);
            }
            state.status
        };

        match status {
            RoomStatus::Waiting => {
                let mut state = self.state.lock().await;
                if let Some(member) = state.members.iter_mut().find(|m| m.id == *target) {
                    if let Some(channel) = member.channel.take() {
                        let _ = channel.try_send(ServerMessage::RoomClosed {
                            room_code: self.code.clone(),
                            reason: "Removed by the host".to_string(),
                        });
                    }
                }
                self.remove_member_locked(&mut state, &target.clone());
                Ok(())
            }
            RoomStatus::Playing => {
                self.handle_disconnect(target).await;
                Ok(())
            }
            other => Err(RoomError::WrongStatus(other)),
        }
    }

    pub async fn set_ready(self: &Arc<Self>, id: &PlayerId, ready: bool) -> Result<(), RoomError> {
        let mut state = self.state.lock().await;
        self.require_waiting(&state)?;
        let member = state
            .members
            .iter_mut()
            .find(|m| m.id == *id)
            .ok_or(RoomError::NotInRoom)?;
        member.is_ready = ready;
        state.last_activity = Utc::now();
        self.broadcast_room_update(&mut state);
        Ok(())
    }

    /// Host-only config patch; re-validates the role-count invariant.
    pub async fn update_config(
        self: &Arc<Self>,
        host_id: &PlayerId,
        patch: RoomConfigPatch,
    ) -> Result<(), RoomError> {
        let mut state = self.state.lock().await;
        self.require_waiting(&state)?;
        self.require_host(&state, host_id)?;

        let mut candidate = state.config.clone();
        if let Some(min_players) = patch.min_players {
            candidate.min_players = min_players;
        }
        if let Some(max_players) = patch.max_players {
            candidate.max_players = max_players;
        }
        if let Some(roles) = patch.roles {
            candidate.roles = roles;
        }
        if let Some(profile) = patch.timeout_profile {
            candidate.timeout_profile = profile;
        }
        if let Some(is_private) = patch.is_private {
            candidate.is_private = is_private;
        }
        if let Some(allow_spectators) = patch.allow_spectators {
            candidate.allow_spectators = allow_spectators;
        }

        validation::validate_room_config(&candidate).map_err(RoomError::InvalidConfig)?;
        if state.members.len() > candidate.max_players {
            return Err(RoomError::InvalidConfig(
                "room already has more members than the new maximum".to_string(),
            ));
        }

        state.config = candidate;
        state.last_activity = Utc::now();
        self.broadcast_room_update(&mut state);
        Ok(())
    }

    /// Host-only start: tops the table up with AI seats, checks
    /// readiness, deals, and launches the engine bound to this room.
    pub async fn start(self: &Arc<Self>, host_id: &PlayerId) -> Result<(), RoomError> {
        let mut state = self.state.lock().await;
        self.require_waiting(&state)?;
        self.require_host(&state, host_id)?;

        validation::validate_room_config(&state.config).map_err(RoomError::InvalidConfig)?;
        if state.members.len() < state.config.min_players {
            return Err(RoomError::InvalidConfig(format!(
                "need at least {} players, have {}",
                state.config.min_players,
                state.members.len()
            )));
        }
        let all_ready = state
            .members
            .iter()
            .filter(|m| !m.is_ai && Some(&m.id) != state.host.as_ref())
            .all(|m| m.is_ready);
        if !all_ready {
            return Err(RoomError::NotReady);
        }

        // Quietly fill the remaining seats with AI so the dealt deck
        // always matches roles.len() == max_players + 3.
        while state.members.len() < state.config.max_players {
            state.ai_counter += 1;
            let id = format!("{}-bot-{}", self.code.to_lowercase(), state.ai_counter);
            let name = format!("Bot {}", state.ai_counter);
            state.members.push(Member {
                id,
                name,
                is_ai: true,
                is_ready: true,
                is_connected: false,
                joined_at: Utc::now(),
                channel: None,
            });
        }

        state.status = RoomStatus::Starting;
        tracing::info!(room_code = %self.code, members = state.members.len(), "starting game");

        // Bind seats in join order.
        let member_ids: Vec<PlayerId> = state.members.iter().map(|m| m.id.clone()).collect();
        state.seat_map = SeatMap::assign(&member_ids);

        let seats: Vec<SeatInit> = state
            .members
            .iter()
            .enumerate()
            .map(|(index, m)| SeatInit {
                seat: SeatId::from_index(index),
                name: m.name.clone(),
                is_ai: m.is_ai,
                is_connected: m.is_connected,
            })
            .collect();

        let forced: BTreeMap<SeatId, crate::game::role::Role> = state
            .debug
            .as_ref()
            .map(|debug| {
                debug
                    .forced_roles
                    .iter()
                    .filter(|f| f.seat_index < seats.len())
                    .map(|f| (SeatId::from_index(f.seat_index), f.role))
                    .collect()
            })
            .unwrap_or_default();

        let game_state = GameState::deal(&seats, &state.config.roles, &forced)
            .map_err(|e| RoomError::InvalidConfig(e.to_string()))?;
        let game_state = Arc::new(Mutex::new(game_state));

        let cells: BTreeMap<SeatId, ProviderCell> = state
            .members
            .iter()
            .enumerate()
            .map(|(index, m)| {
                let seat = SeatId::from_index(index);
                let cell = if m.is_ai {
                    ProviderCell::new(AiProvider::new())
                } else {
                    ProviderCell::new(HumanSeatProvider::new(
                        Arc::downgrade(self),
                        m.id.clone(),
                    ))
                };
                (seat, cell)
            })
            .collect();
        let providers = Arc::new(SeatProviders::new(cells));
        let pending = Arc::new(PendingDecisions::new());
        let day_wake = Arc::new(Notify::new());
        let deadlines = PhaseDeadlines::for_profile(state.config.timeout_profile);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let engine = Engine {
            state: game_state.clone(),
            providers: providers.clone(),
            events: event_tx,
            deadlines,
            day_wake: day_wake.clone(),
        };
        let engine_task = tokio::spawn(engine.run());
        let pump_task = tokio::spawn(Self::pump_events(Arc::downgrade(self), event_rx));

        state.game = Some(GameHandle {
            state: game_state,
            providers,
            pending,
            day_wake,
            deadlines,
            engine_task,
            pump_task,
        });
        state.status = RoomStatus::Playing;
        state.last_activity = Utc::now();
        // The roster may have grown AI seats; everyone sees the final
        // table before the engine's gameStarted arrives.
        self.broadcast_room_update(&mut state);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Day-phase sinks
    // ------------------------------------------------------------------

    /// Accept a day-phase statement, dedup re-deliveries, and fan it out
    /// in arrival order.
    pub async fn submit_statement(
        self: &Arc<Self>,
        id: &PlayerId,
        text: String,
        client_timestamp: Option<DateTime<Utc>>,
    ) -> Result<(), RoomError> {
        if text.trim().is_empty() {
            return Err(RoomError::InvalidStatement("statement is empty".to_string()));
        }
        if text.len() > self.settings.max_statement_length {
            return Err(RoomError::InvalidStatement(format!(
                "statement exceeds {} characters",
                self.settings.max_statement_length
            )));
        }

        let mut state = self.state.lock().await;
        if state.status != RoomStatus::Playing {
            return Err(RoomError::WrongStatus(state.status));
        }
        let seat = state.seat_map.seat_for(id).ok_or(RoomError::NotInRoom)?;
        let Some(game) = &state.game else {
            return Err(RoomError::Internal("game handle missing".to_string()));
        };

        let timestamp = client_timestamp.unwrap_or_else(Utc::now);
        let dedup_key = (id.clone(), text.clone(), timestamp.timestamp_millis());
        if state.seen_statements.contains(&dedup_key) {
            // Re-delivered statement: accept silently, fan out nothing.
            return Ok(());
        }

        {
            let mut game_state = game.state.lock().await;
            if game_state.phase != Phase::Day {
                return Err(RoomError::InvalidPhase);
            }
            game_state.statements.push(Statement {
                seat,
                text: text.clone(),
                timestamp,
            });
            if let Some(player) = game_state.players.get_mut(&seat) {
                player.has_spoken = true;
            }
        }

        state.seen_statements.insert(dedup_key);
        state.last_activity = Utc::now();
        let message = ServerMessage::StatementMade {
            player_id: id.clone(),
            text,
            timestamp,
        };
        self.broadcast_locked(&mut state, message);
        Ok(())
    }

    pub async fn ready_to_vote(self: &Arc<Self>, id: &PlayerId) -> Result<(), RoomError> {
        let state = self.state.lock().await;
        if state.status != RoomStatus::Playing {
            return Err(RoomError::WrongStatus(state.status));
        }
        let seat = state.seat_map.seat_for(id).ok_or(RoomError::NotInRoom)?;
        let Some(game) = &state.game else {
            return Err(RoomError::Internal("game handle missing".to_string()));
        };

        {
            let mut game_state = game.state.lock().await;
            if game_state.phase != Phase::Day {
                return Err(RoomError::InvalidPhase);
            }
            if let Some(player) = game_state.players.get_mut(&seat) {
                player.ready_to_vote = true;
            }
        }
        game.day_wake.notify_one();
        Ok(())
    }

    /// Resolve a pending prompt with the member's answer.
    pub async fn action_response(
        self: &Arc<Self>,
        id: &PlayerId,
        request_id: RequestId,
        answer: ActionAnswer,
    ) -> Result<(), RoomError> {
        let pending = {
            let state = self.state.lock().await;
            if state.status != RoomStatus::Playing {
                return Err(RoomError::WrongStatus(state.status));
            }
            let Some(game) = &state.game else {
                return Err(RoomError::Internal("game handle missing".to_string()));
            };
            game.pending.clone()
        };

        match pending.resolve(request_id, id, answer) {
            Ok(()) => {
                let mut state = self.state.lock().await;
                self.send_to_locked(
                    &mut state,
                    id,
                    ServerMessage::ActionAcknowledged { request_id },
                );
                Ok(())
            }
            Err(ResolveError::UnknownRequest) => Err(RoomError::UnknownRequest),
            Err(ResolveError::InvalidAnswer) => Err(RoomError::InvalidTarget),
        }
    }

    // ------------------------------------------------------------------
    // Prompt plumbing used by HumanSeatProvider
    // ------------------------------------------------------------------

    /// Register a prompt and push `actionRequired` at the member.
    pub async fn issue_prompt(
        self: &Arc<Self>,
        member: &PlayerId,
        prompt: ActionPrompt,
        deadline: std::time::Duration,
    ) -> Result<(RequestId, oneshot::Receiver<ActionAnswer>), Cancelled> {
        let mut state = self.state.lock().await;
        let Some(game) = &state.game else {
            return Err(Cancelled);
        };
        let request_id = uuid::Uuid::new_v4();
        let rx = game
            .pending
            .register(request_id, member.clone(), prompt.clone());
        tracing::debug!(room_code = %self.code, player_id = %member, %request_id, "prompt issued");
        self.send_to_locked(
            &mut state,
            member,
            ServerMessage::ActionRequired {
                request_id,
                action: prompt,
                timeout_ms: deadline.as_millis() as u64,
            },
        );
        Ok((request_id, rx))
    }

    /// Expire a prompt: remove it, apply the documented default, and
    /// tell the member. Returns the applied default, or None if the
    /// prompt was already resolved.
    pub async fn expire_prompt(
        self: &Arc<Self>,
        member: &PlayerId,
        request_id: RequestId,
        prompt: &ActionPrompt,
    ) -> Option<ActionAnswer> {
        let mut state = self.state.lock().await;
        let game = state.game.as_ref()?;
        if !game.pending.take(request_id) {
            return None;
        }
        let applied = prompt.default_answer();
        tracing::debug!(room_code = %self.code, player_id = %member, %request_id, "prompt timed out");
        self.send_to_locked(
            &mut state,
            member,
            ServerMessage::ActionTimeout {
                request_id,
                applied: applied.clone(),
            },
        );
        Some(applied)
    }

    pub async fn seat_of(&self, member: &PlayerId) -> Option<SeatId> {
        self.state.lock().await.seat_map.seat_for(member)
    }

    pub async fn members_of(&self, seats: &[SeatId]) -> Vec<PlayerId> {
        let state = self.state.lock().await;
        seats
            .iter()
            .map(|seat| state.seat_map.member_or_seat_string(*seat))
            .collect()
    }

    // ------------------------------------------------------------------
    // Disconnection, takeover, reconnection
    // ------------------------------------------------------------------

    /// Channel-loss hook: called by the gateway on socket close and by
    /// the room itself on outbound-queue overflow.
    pub async fn handle_disconnect(self: &Arc<Self>, id: &PlayerId) {
        let mut state = self.state.lock().await;
        let Some(member) = state.members.iter_mut().find(|m| m.id == *id) else {
            return;
        };
        if member.is_ai || !member.is_connected {
            return;
        }
        member.is_connected = false;
        member.channel = None;
        let name = member.name.clone();

        match state.status {
            RoomStatus::Waiting => {
                self.remove_member_locked(&mut state, id);
            }
            RoomStatus::Playing => {
                let Some(seat) = state.seat_map.seat_for(id) else {
                    return;
                };
                if let Some(game) = &state.game {
                    let mut game_state = game.state.lock().await;
                    if let Some(player) = game_state.players.get_mut(&seat) {
                        player.is_connected = false;
                    }
                }
                self.broadcast_locked(
                    &mut state,
                    ServerMessage::PlayerDisconnected {
                        player_id: id.clone(),
                        ai_takeover: false,
                    },
                );
                state.last_activity = Utc::now();
                drop(state);

                let outcome = self
                    .reconnect
                    .register_disconnect(self, &self.code, id, seat, &name)
                    .await;
                if outcome == ReconnectOutcome::ImmediateTakeover {
                    self.ai_takeover(id).await;
                }
            }
            _ => {}
        }
    }

    /// Swap the seat's provider to AI and answer whatever prompt is in
    /// flight. Invoked on grace expiry or immediately when the per-room
    /// grace cap is exceeded.
    pub async fn ai_takeover(self: &Arc<Self>, id: &PlayerId) {
        let mut state = self.state.lock().await;
        if state.status != RoomStatus::Playing {
            return;
        }
        let Some(seat) = state.seat_map.seat_for(id) else {
            return;
        };
        let Some(game) = &state.game else {
            return;
        };

        game.providers.swap(seat, AiProvider::new());
        {
            let mut game_state = game.state.lock().await;
            if let Some(player) = game_state.players.get_mut(&seat) {
                player.ai_controlled = true;
            }
        }
        // Any in-flight prompt gets the default answer right away.
        let resolved = game.pending.resolve_defaults_for_member(id);
        let day_wake = game.day_wake.clone();
        for (request_id, applied) in resolved {
            self.send_to_locked(
                &mut state,
                id,
                ServerMessage::ActionTimeout {
                    request_id,
                    applied,
                },
            );
        }
        tracing::info!(room_code = %self.code, player_id = %id, %seat, "AI takeover");
        self.broadcast_locked(
            &mut state,
            ServerMessage::PlayerDisconnected {
                player_id: id.clone(),
                ai_takeover: true,
            },
        );
        day_wake.notify_one();
    }

    /// Rebind a returning human: new channel, provider restored, state
    /// re-delivered.
    pub async fn reconnect_player(
        self: &Arc<Self>,
        id: &PlayerId,
        channel: mpsc::Sender<ServerMessage>,
    ) -> Result<(), RoomError> {
        let mut state = self.state.lock().await;
        if state.status != RoomStatus::Playing {
            return Err(RoomError::WrongStatus(state.status));
        }
        let seat = state.seat_map.seat_for(id).ok_or(RoomError::NotInRoom)?;
        {
            let member = state
                .members
                .iter_mut()
                .find(|m| m.id == *id)
                .ok_or(RoomError::NotInRoom)?;
            member.is_connected = true;
            member.channel = Some(channel);
        }

        let Some(game) = &state.game else {
            return Err(RoomError::Internal("game handle missing".to_string()));
        };

        let was_ai_controlled = {
            let mut game_state = game.state.lock().await;
            let Some(player) = game_state.players.get_mut(&seat) else {
                return Err(RoomError::Internal("seat missing from game".to_string()));
            };
            player.is_connected = true;
            let was = player.ai_controlled;
            player.ai_controlled = false;
            was
        };
        if was_ai_controlled {
            // Future prompts go back to the human.
            game.providers
                .swap(seat, HumanSeatProvider::new(Arc::downgrade(self), id.clone()));
        }

        self.reconnect.mark_reconnected(id);

        // Catch-up delivery: the full sanitized view plus the preserved
        // private night log.
        let (view, night_results) = {
            let game_state = game.state.lock().await;
            let view = view::project(&game_state, seat);
            let night_results = game_state
                .players
                .get(&seat)
                .map(|p| p.night_log.clone())
                .unwrap_or_default();
            (view, night_results)
        };
        if let Some(view) = view {
            let message = ServerMessage::GameState {
                view: Box::new(self.translate_view(&state, view)),
            };
            self.send_to_locked(&mut state, id, message);
        }
        for result in night_results {
            let seat_map = &state.seat_map;
            let translated = result.map_ids(&|s: &SeatId| seat_map.member_or_seat_string(*s));
            self.send_to_locked(&mut state, id, ServerMessage::NightResult { result: translated });
        }

        tracing::info!(room_code = %self.code, player_id = %id, was_ai_controlled, "player reconnected");
        self.broadcast_locked(
            &mut state,
            ServerMessage::PlayerReconnected {
                player_id: id.clone(),
                ai_takeover: was_ai_controlled,
            },
        );
        state.last_activity = Utc::now();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Introspection for the gateway, manager, and reaper
    // ------------------------------------------------------------------

    pub async fn snapshot(&self) -> RoomSnapshot {
        let state = self.state.lock().await;
        self.snapshot_locked(&state)
    }

    pub async fn status(&self) -> RoomStatus {
        self.state.lock().await.status
    }

    pub async fn is_member(&self, id: &PlayerId) -> bool {
        self.state
            .lock()
            .await
            .members
            .iter()
            .any(|m| m.id == *id)
    }

    pub async fn connected_human_count(&self) -> usize {
        self.state
            .lock()
            .await
            .members
            .iter()
            .filter(|m| !m.is_ai && m.is_connected)
            .count()
    }

    pub async fn last_activity(&self) -> DateTime<Utc> {
        self.state.lock().await.last_activity
    }

    /// Full catch-up view for a member, used by the gateway on demand.
    pub async fn game_state_for(&self, id: &PlayerId) -> Option<ServerMessage> {
        let state = self.state.lock().await;
        let seat = state.seat_map.seat_for(id)?;
        let game = state.game.as_ref()?;
        let view = {
            let game_state = game.state.lock().await;
            view::project(&game_state, seat)?
        };
        Some(ServerMessage::GameState {
            view: Box::new(self.translate_view(&state, view)),
        })
    }

    /// Close the room: everyone is told, all pending prompts resolve as
    /// cancelled, and the engine is stopped.
    pub async fn close(self: &Arc<Self>, reason: &str) {
        let mut state = self.state.lock().await;
        if state.status == RoomStatus::Closed {
            return;
        }
        tracing::info!(room_code = %self.code, reason, "closing room");
        self.broadcast_locked(
            &mut state,
            ServerMessage::RoomClosed {
                room_code: self.code.clone(),
                reason: reason.to_string(),
            },
        );
        if let Some(game) = state.game.take() {
            game.pending.cancel_all();
            game.engine_task.abort();
            game.pump_task.abort();
        }
        state.status = RoomStatus::Closed;
        for member in &mut state.members {
            member.channel = None;
            member.is_connected = false;
        }
    }

    // ------------------------------------------------------------------
    // Engine event pump
    // ------------------------------------------------------------------

    /// Translate engine events into the member-id domain and fan them
    /// out. Runs until the engine drops its sender or the room is gone.
    async fn pump_events(
        room: Weak<Room>,
        mut events: mpsc::UnboundedReceiver<EngineEvent>,
    ) {
        while let Some(event) = events.recv().await {
            let Some(room) = room.upgrade() else {
                return;
            };
            room.dispatch_event(event).await;
        }
    }

    async fn dispatch_event(self: &Arc<Self>, event: EngineEvent) {
        let mut state = self.state.lock().await;
        match event {
            EngineEvent::Started => {
                let Some(game) = &state.game else {
                    return;
                };
                let game_state_arc = game.state.clone();
                let seat_map = state.seat_map.clone();
                let seat_map_wire = seat_map.as_wire_map();

                let game_state = game_state_arc.lock().await;
                let mut deliveries = Vec::new();
                for member in &state.members {
                    let Some(seat) = seat_map.seat_for(&member.id) else {
                        continue;
                    };
                    if let Some(view) = view::project(&game_state, seat) {
                        let view =
                            view.map_ids(&|s: &SeatId| seat_map.member_or_seat_string(*s));
                        deliveries.push((
                            member.id.clone(),
                            ServerMessage::GameStarted {
                                view: Box::new(view),
                                seat_map: seat_map_wire.clone(),
                            },
                        ));
                    }
                }
                drop(game_state);
                for (member, message) in deliveries {
                    self.send_to_locked(&mut state, &member, message);
                }
            }
            EngineEvent::PhaseChanged {
                phase,
                time_remaining_ms,
            } => {
                self.broadcast_locked(
                    &mut state,
                    ServerMessage::PhaseChange {
                        phase,
                        time_remaining_ms,
                    },
                );
            }
            EngineEvent::NightResult { seat, result } => {
                let member = state.seat_map.member_or_seat_string(seat);
                let seat_map = state.seat_map.clone();
                let translated =
                    result.map_ids(&|s: &SeatId| seat_map.member_or_seat_string(*s));
                self.send_to_locked(
                    &mut state,
                    &member,
                    ServerMessage::NightResult { result: translated },
                );
            }
            EngineEvent::StatementMade {
                seat,
                text,
                timestamp,
            } => {
                let member = state.seat_map.member_or_seat_string(seat);
                self.broadcast_locked(
                    &mut state,
                    ServerMessage::StatementMade {
                        player_id: member,
                        text,
                        timestamp,
                    },
                );
            }
            EngineEvent::VotesRevealed { votes } => {
                let seat_map = state.seat_map.clone();
                let votes = votes
                    .iter()
                    .map(|(a, b)| {
                        (
                            seat_map.member_or_seat_string(*a),
                            seat_map.member_or_seat_string(*b),
                        )
                    })
                    .collect();
                self.broadcast_locked(&mut state, ServerMessage::VotesRevealed { votes });
            }
            EngineEvent::Eliminated { seats } => {
                let seat_map = state.seat_map.clone();
                let player_ids = seats
                    .iter()
                    .map(|s| seat_map.member_or_seat_string(*s))
                    .collect();
                self.broadcast_locked(&mut state, ServerMessage::Elimination { player_ids });
            }
            EngineEvent::GameEnded { summary } => {
                let seat_map = state.seat_map.clone();
                let result = summary.map_ids(&|s: &SeatId| seat_map.member_or_seat_string(*s));
                self.broadcast_locked(&mut state, ServerMessage::GameEnd { result });
                state.status = RoomStatus::Ended;
                state.last_activity = Utc::now();
                tracing::info!(room_code = %self.code, "game ended");
            }
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn require_host(&self, state: &RoomState, id: &PlayerId) -> Result<(), RoomError> {
        if state.host.as_ref() == Some(id) {
            Ok(())
        } else {
            Err(RoomError::NotHost)
        }
    }

    fn require_waiting(&self, state: &RoomState) -> Result<(), RoomError> {
        if state.status == RoomStatus::Waiting {
            Ok(())
        } else {
            Err(RoomError::WrongStatus(state.status))
        }
    }

    fn snapshot_locked(&self, state: &RoomState) -> RoomSnapshot {
        RoomSnapshot {
            code: self.code.clone(),
            status: state.status,
            host: state.host.clone(),
            config: state.config.clone(),
            members: state
                .members
                .iter()
                .map(|m| m.info(state.host.as_ref()))
                .collect(),
        }
    }

    fn translate_view(&self, state: &RoomState, view: PlayerView<SeatId>) -> PlayerView<PlayerId> {
        let seat_map = &state.seat_map;
        view.map_ids(&|seat: &SeatId| seat_map.member_or_seat_string(*seat))
    }

    fn broadcast_room_update(&self, state: &mut RoomState) {
        let snapshot = self.snapshot_locked(state);
        self.broadcast_locked(state, ServerMessage::RoomUpdate { room: snapshot });
    }

    /// Fan a message out to every connected human member, in member
    /// order, under the room lock. Members whose outbound queue is full
    /// are treated as disconnected (back-pressure policy).
    fn broadcast_locked(&self, state: &mut RoomState, message: ServerMessage) {
        let mut overflowed: Vec<PlayerId> = Vec::new();
        for member in &state.members {
            let Some(channel) = &member.channel else {
                continue;
            };
            match channel.try_send(message.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        room_code = %self.code,
                        player_id = %member.id,
                        "outbound queue overflow, dropping channel"
                    );
                    overflowed.push(member.id.clone());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    overflowed.push(member.id.clone());
                }
            }
        }
        for id in overflowed {
            self.drop_channel_locked(state, &id);
        }
    }

    fn send_to_locked(&self, state: &mut RoomState, id: &PlayerId, message: ServerMessage) {
        let Some(member) = state.members.iter().find(|m| m.id == *id) else {
            return;
        };
        let Some(channel) = &member.channel else {
            return;
        };
        if channel.try_send(message).is_err() {
            self.drop_channel_locked(state, &id.clone());
        }
    }

    /// Remove a dead channel and, during PLAYING, broadcast the
    /// disconnect and hand the member to the reconnection manager. Runs
    /// under the room lock, so the grace registration happens on a
    /// spawned task.
    fn drop_channel_locked(&self, state: &mut RoomState, id: &PlayerId) {
        let Some(member) = state.members.iter_mut().find(|m| m.id == *id) else {
            return;
        };
        if member.channel.is_none() && !member.is_connected {
            return;
        }
        member.channel = None;
        member.is_connected = false;

        if state.status == RoomStatus::Playing {
            let seat = state.seat_map.seat_for(id);
            let name = state
                .members
                .iter()
                .find(|m| m.id == *id)
                .map(|m| m.name.clone())
                .unwrap_or_default();
            // Best-effort notification; a second overflow here just
            // drops more channels on the next broadcast.
            let message = ServerMessage::PlayerDisconnected {
                player_id: id.clone(),
                ai_takeover: false,
            };
            for member in &state.members {
                if let Some(channel) = &member.channel {
                    let _ = channel.try_send(message.clone());
                }
            }
            if let (Some(seat), Some(room)) = (seat, self.weak.upgrade()) {
                let reconnect = self.reconnect.clone();
                let code = self.code.clone();
                let id = id.clone();
                tokio::spawn(async move {
                    let outcome = reconnect
                        .register_disconnect(&room, &code, &id, seat, &name)
                        .await;
                    if outcome == ReconnectOutcome::ImmediateTakeover {
                        room.ai_takeover(&id).await;
                    }
                });
            }
        }
    }

    fn remove_member_locked(self: &Arc<Self>, state: &mut RoomState, id: &PlayerId) {
        let Some(position) = state.members.iter().position(|m| m.id == *id) else {
            return;
        };
        let removed = state.members.remove(position);
        tracing::info!(room_code = %self.code, player_id = %removed.id, "member removed");

        // Host promotion: oldest remaining human takes over.
        if state.host.as_ref() == Some(id) {
            state.host = state
                .members
                .iter()
                .filter(|m| !m.is_ai)
                .min_by_key(|m| m.joined_at)
                .map(|m| m.id.clone());
        }
        state.last_activity = Utc::now();
        self.broadcast_room_update(state);
    }
}
