// Session gateway: authenticates channels, keys sessions by stable
// player id, and routes typed messages into rooms and the engine.

mod router;

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::protocol::{
    validation, ErrorCode, PlayerId, RoomCode, ServerMessage,
};
use crate::rate_limit::{RateLimitConfig, SessionRateLimiter};
use crate::room::RoomManager;

/// One authenticated session. The gateway owns the channel sender;
/// rooms get clones and drop them on disconnect.
pub struct Session {
    pub player_id: PlayerId,
    pub name: String,
    pub sender: mpsc::Sender<ServerMessage>,
    room_code: std::sync::Mutex<Option<RoomCode>>,
}

impl Session {
    pub fn room_code(&self) -> Option<RoomCode> {
        self.lock_room().clone()
    }

    pub fn set_room_code(&self, code: Option<RoomCode>) {
        *self.lock_room() = code;
    }

    fn lock_room(&self) -> std::sync::MutexGuard<'_, Option<RoomCode>> {
        self.room_code
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// The session gateway. Single reader per channel lives in the
/// websocket module; this registry is the single place a player id
/// resolves to a live channel.
pub struct Gateway {
    config: Config,
    pub rooms: Arc<RoomManager>,
    pub rate_limiter: Arc<SessionRateLimiter>,
    sessions: DashMap<PlayerId, Arc<Session>>,
}

impl Gateway {
    pub fn new(config: Config) -> Arc<Self> {
        let rooms = RoomManager::new(&config);
        rooms.spawn_reaper();
        let rate_limiter = Arc::new(SessionRateLimiter::new(RateLimitConfig::from(
            &config.rate_limit,
        )));
        rate_limiter.start_cleanup_task();
        Arc::new(Self {
            config,
            rooms,
            rate_limiter,
            sessions: DashMap::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self, player_id: &PlayerId) -> Option<Arc<Session>> {
        self.sessions.get(player_id).map(|s| s.clone())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Establish a session for an already-identified player. A second
    /// channel for the same identity displaces the first.
    pub async fn authenticate(
        self: &Arc<Self>,
        player_id: PlayerId,
        player_name: String,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<Arc<Session>, ServerMessage> {
        if player_id.trim().is_empty() {
            return Err(ServerMessage::error(
                ErrorCode::InvalidMessage,
                "playerId must not be empty",
            ));
        }
        validation::validate_player_name_with_config(&player_name, &self.config.protocol)
            .map_err(|reason| ServerMessage::error(ErrorCode::InvalidName, reason))?;

        let session = Arc::new(Session {
            player_id: player_id.clone(),
            name: player_name.clone(),
            sender: sender.clone(),
            room_code: std::sync::Mutex::new(None),
        });

        if let Some(previous) = self.sessions.insert(player_id.clone(), session.clone()) {
            tracing::info!(%player_id, "displacing previous session for identity");
            let _ = previous.sender.try_send(ServerMessage::RoomClosed {
                room_code: previous.room_code().unwrap_or_default(),
                reason: "Session opened elsewhere".to_string(),
            });
        }

        let _ = sender.try_send(ServerMessage::Authenticated {
            player_id: player_id.clone(),
            player_name,
        });
        tracing::info!(%player_id, sessions = self.sessions.len(), "session authenticated");

        // Seamless return path: a player with a live disconnect record
        // gets their seat back without an explicit joinRoom.
        self.try_resume(&session).await;

        Ok(session)
    }

    /// Rebind the player to their in-flight game, if one is waiting on
    /// them and reconnection is still allowed.
    async fn try_resume(self: &Arc<Self>, session: &Arc<Session>) {
        let Some(record) = self.rooms.reconnect.record_for(&session.player_id) else {
            return;
        };
        if !self.rooms.reconnect.may_reconnect(&session.player_id) {
            return;
        }
        let Some(room) = self.rooms.get_room(&record.room_code) else {
            return;
        };
        match room
            .reconnect_player(&session.player_id, session.sender.clone())
            .await
        {
            Ok(()) => session.set_room_code(Some(room.code.clone())),
            Err(err) => {
                tracing::warn!(
                    player_id = %session.player_id,
                    room_code = %record.room_code,
                    error = %err,
                    "automatic resume failed"
                );
            }
        }
    }

    /// Channel-loss hook from the websocket layer. Ignores closes from
    /// a displaced channel so a fresh session survives its predecessor.
    pub async fn connection_closed(
        &self,
        player_id: &PlayerId,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let Some(session) = self.session(player_id) else {
            return;
        };
        if !session.sender.same_channel(sender) {
            return;
        }
        self.sessions.remove(player_id);
        self.rate_limiter.forget(player_id);

        if let Some(code) = session.room_code() {
            if let Some(room) = self.rooms.get_room(&code) {
                room.handle_disconnect(player_id).await;
            }
        }
        tracing::info!(%player_id, sessions = self.sessions.len(), "session closed");
    }
}
