use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::protocol::{ClientMessage, ErrorCode, PlayerId, ServerMessage};
use crate::server::Gateway;

/// Pump one WebSocket for its whole life: single reader (this task),
/// single writer (the spawned send task fed by the outbound queue).
pub(super) async fn handle_socket(socket: WebSocket, gateway: Arc<Gateway>, addr: SocketAddr) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let queue_size = gateway.config().server.outbound_queue_size.max(1);
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(queue_size);

    // Outbound half: serialize and write until the queue closes.
    let send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(err) => {
                    tracing::error!(error = %err, "failed to serialize server message");
                    continue;
                }
            };
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    let server_cfg = gateway.config().server.clone();
    let max_message_bytes = server_cfg.max_message_bytes;
    let auth_timeout = Duration::from_millis(server_cfg.auth_timeout_ms);
    let ping_interval = Duration::from_millis(server_cfg.ping_interval_ms);
    let liveness_window =
        ping_interval + Duration::from_millis(server_cfg.pong_timeout_ms);

    let mut authenticated: Option<PlayerId> = None;
    let mut last_inbound = Instant::now();

    let auth_deadline = tokio::time::sleep(auth_timeout);
    tokio::pin!(auth_deadline);
    let mut ping_ticker = tokio::time::interval(ping_interval);
    ping_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    tracing::info!(client_addr = %addr, "WebSocket connection established");

    loop {
        tokio::select! {
            () = &mut auth_deadline, if authenticated.is_none() => {
                tracing::warn!(client_addr = %addr, "authentication timeout, closing connection");
                let _ = tx.try_send(ServerMessage::error(
                    ErrorCode::AuthRequired,
                    "authenticate within the handshake deadline",
                ));
                break;
            }

            _ = ping_ticker.tick() => {
                if last_inbound.elapsed() > liveness_window {
                    tracing::warn!(
                        client_addr = %addr,
                        silent_for_ms = last_inbound.elapsed().as_millis() as u64,
                        "liveness deadline missed, closing channel"
                    );
                    break;
                }
                let _ = tx.try_send(ServerMessage::Ping);
            }

            frame = ws_receiver.next() => {
                let Some(frame) = frame else {
                    break;
                };
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(err) => {
                        tracing::debug!(client_addr = %addr, error = %err, "WebSocket error");
                        break;
                    }
                };
                last_inbound = Instant::now();

                match frame {
                    Message::Text(text) => {
                        if text.len() > max_message_bytes {
                            let _ = tx.try_send(ServerMessage::error(
                                ErrorCode::MessageTooLarge,
                                format!(
                                    "message of {} bytes exceeds the {} byte limit",
                                    text.len(),
                                    max_message_bytes
                                ),
                            ));
                            continue;
                        }

                        let message: ClientMessage = match serde_json::from_str(&text) {
                            Ok(message) => message,
                            Err(err) => {
                                tracing::debug!(client_addr = %addr, error = %err, "rejected client frame");
                                let _ = tx.try_send(ServerMessage::error(
                                    ErrorCode::InvalidMessage,
                                    "message could not be parsed",
                                ));
                                continue;
                            }
                        };

                        match authenticated.clone() {
                            Some(player_id) => {
                                gateway.handle_message(&player_id, message).await;
                            }
                            None => match message {
                                ClientMessage::Authenticate {
                                    player_id,
                                    player_name,
                                    token: _,
                                } => {
                                    match gateway
                                        .authenticate(player_id.clone(), player_name, tx.clone())
                                        .await
                                    {
                                        Ok(_session) => {
                                            authenticated = Some(player_id);
                                        }
                                        Err(error) => {
                                            let _ = tx.try_send(error);
                                        }
                                    }
                                }
                                _ => {
                                    let _ = tx.try_send(ServerMessage::error(
                                        ErrorCode::AuthRequired,
                                        "authenticate before sending anything else",
                                    ));
                                }
                            },
                        }
                    }
                    Message::Binary(_) => {
                        let _ = tx.try_send(ServerMessage::error(
                            ErrorCode::InvalidMessage,
                            "binary frames are not part of this protocol",
                        ));
                    }
                    Message::Close(_) => {
                        tracing::info!(client_addr = %addr, "WebSocket connection closed");
                        break;
                    }
                    // Protocol-level ping/pong frames are answered by the
                    // stack; they only count as liveness above.
                    Message::Ping(_) | Message::Pong(_) => {}
                }
            }
        }
    }

    if let Some(player_id) = authenticated {
        gateway.connection_closed(&player_id, &tx).await;
    }
    drop(tx);
    let _ = send_task.await;
}
