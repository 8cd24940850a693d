use std::sync::Arc;

use super::{Gateway, Session};
use crate::protocol::{
    validation, ClientMessage, ErrorCode, PlayerId, ServerMessage,
};
use crate::room::RoomError;

impl Gateway {
    /// Route one authenticated client message. Every failure path
    /// becomes a typed error on the caller's channel; the session stays
    /// open.
    pub async fn handle_message(self: &Arc<Self>, player_id: &PlayerId, message: ClientMessage) {
        let Some(session) = self.session(player_id) else {
            return;
        };

        if let Err(err) = self.rate_limiter.check_message(player_id) {
            tracing::warn!(%player_id, error = %err, "inbound message rate limited");
            self.reply(
                &session,
                ServerMessage::error(ErrorCode::RateLimited, err.to_string()),
            );
            return;
        }

        let result = self.dispatch(&session, message).await;
        if let Err(reply) = result {
            self.reply(&session, reply);
        }
    }

    async fn dispatch(
        self: &Arc<Self>,
        session: &Arc<Session>,
        message: ClientMessage,
    ) -> Result<(), ServerMessage> {
        match message {
            ClientMessage::Authenticate { .. } => Err(ServerMessage::error(
                ErrorCode::AlreadyAuthenticated,
                "session is already authenticated",
            )),

            ClientMessage::CreateRoom { config, debug } => {
                if session.room_code().is_some() {
                    return Err(ServerMessage::error(
                        ErrorCode::AlreadyInRoom,
                        "leave the current room first",
                    ));
                }
                self.rate_limiter
                    .check_room_creation(&session.player_id)
                    .map_err(|e| ServerMessage::error(ErrorCode::RateLimited, e.to_string()))?;

                let room = self
                    .rooms
                    .create_room(config, debug)
                    .map_err(|e| ServerMessage::error(e.code(), e.to_string()))?;
                let snapshot = room
                    .add_player(
                        session.player_id.clone(),
                        session.name.clone(),
                        session.sender.clone(),
                    )
                    .await
                    .map_err(|e| ServerMessage::error(e.code(), e.to_string()))?;
                session.set_room_code(Some(room.code.clone()));
                self.reply(session, ServerMessage::RoomCreated { room: snapshot });
                Ok(())
            }

            ClientMessage::JoinRoom {
                room_code,
                player_name,
            } => {
                if session.room_code().is_some() {
                    return Err(ServerMessage::error(
                        ErrorCode::AlreadyInRoom,
                        "leave the current room first",
                    ));
                }
                validation::validate_player_name_with_config(
                    &player_name,
                    &self.config().protocol,
                )
                .map_err(|reason| ServerMessage::error(ErrorCode::InvalidName, reason))?;
                self.rate_limiter
                    .check_join_attempt(&session.player_id)
                    .map_err(|e| ServerMessage::error(ErrorCode::RateLimited, e.to_string()))?;

                let room = self.rooms.get_room(&room_code).ok_or_else(|| {
                    ServerMessage::error(ErrorCode::RoomNotFound, "no room with that code")
                })?;

                // A player with a live disconnect record for this room
                // resumes their seat instead of joining fresh.
                let record = self.rooms.reconnect.record_for(&session.player_id);
                let resuming = record
                    .as_ref()
                    .is_some_and(|r| r.room_code == room.code)
                    && self.rooms.reconnect.may_reconnect(&session.player_id);
                if resuming {
                    room.reconnect_player(&session.player_id, session.sender.clone())
                        .await
                        .map_err(|e| ServerMessage::error(e.code(), e.to_string()))?;
                    session.set_room_code(Some(room.code.clone()));
                    return Ok(());
                }

                let snapshot = room
                    .add_player(
                        session.player_id.clone(),
                        player_name,
                        session.sender.clone(),
                    )
                    .await
                    .map_err(|e| ServerMessage::error(e.code(), e.to_string()))?;
                session.set_room_code(Some(room.code.clone()));
                self.reply(session, ServerMessage::RoomJoined { room: snapshot });
                Ok(())
            }

            ClientMessage::LeaveRoom => {
                let room = self.current_room(session)?;
                room.leave(&session.player_id)
                    .await
                    .map_err(|e| ServerMessage::error(e.code(), e.to_string()))?;
                session.set_room_code(None);
                Ok(())
            }

            ClientMessage::SetReady { ready } => {
                let room = self.current_room(session)?;
                self.room_result(room.set_ready(&session.player_id, ready).await)
            }

            ClientMessage::AddAi => {
                let room = self.current_room(session)?;
                self.room_result(room.add_ai(&session.player_id).await)
            }

            ClientMessage::RemovePlayer { player_id: target } => {
                let room = self.current_room(session)?;
                self.room_result(room.kick(&session.player_id, &target).await)
            }

            ClientMessage::UpdateRoomConfig { config } => {
                let room = self.current_room(session)?;
                self.room_result(room.update_config(&session.player_id, config).await)
            }

            ClientMessage::StartGame => {
                let room = self.current_room(session)?;
                self.room_result(room.start(&session.player_id).await)
            }

            ClientMessage::SubmitStatement {
                statement,
                timestamp,
            } => {
                let room = self.current_room(session)?;
                self.room_result(
                    room.submit_statement(&session.player_id, statement, timestamp)
                        .await,
                )
            }

            ClientMessage::ReadyToVote => {
                let room = self.current_room(session)?;
                self.room_result(room.ready_to_vote(&session.player_id).await)
            }

            ClientMessage::ActionResponse {
                request_id,
                response,
            } => {
                let room = self.current_room(session)?;
                self.room_result(
                    room.action_response(&session.player_id, request_id, response)
                        .await,
                )
            }

            ClientMessage::Ping => {
                self.reply(session, ServerMessage::Pong);
                Ok(())
            }

            // Liveness accounting happens at the socket layer.
            ClientMessage::Pong => Ok(()),
        }
    }

    fn current_room(
        &self,
        session: &Arc<Session>,
    ) -> Result<Arc<crate::room::Room>, ServerMessage> {
        let code = session.room_code().ok_or_else(|| {
            ServerMessage::error(ErrorCode::NotInRoom, "join a room first")
        })?;
        self.rooms.get_room(&code).ok_or_else(|| {
            session.set_room_code(None);
            ServerMessage::error(ErrorCode::RoomNotFound, "the room no longer exists")
        })
    }

    fn room_result(&self, result: Result<(), RoomError>) -> Result<(), ServerMessage> {
        result.map_err(|e| ServerMessage::error(e.code(), e.to_string()))
    }

    fn reply(&self, session: &Arc<Session>, message: ServerMessage) {
        let _ = session.sender.try_send(message);
    }
}
