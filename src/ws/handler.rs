//! WebSocket upgrade handler and per-connection session loop

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{JoinError, RoomCmd, RoomHandle, RoomRegistry};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// WebSocket upgrade handler. Connections are anonymous; each one gets a
/// fresh logical player id for its lifetime.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Session bookkeeping for the room the connection is currently in
struct RoomMembership {
    handle: RoomHandle,
    /// Forwards the room's broadcast events onto this connection
    forward_task: JoinHandle<()>,
}

impl RoomMembership {
    fn attach(handle: RoomHandle, out_tx: mpsc::Sender<ServerMsg>) -> Self {
        let mut events_rx = handle.subscribe();
        let code = handle.code.clone();
        let forward_task = tokio::spawn(async move {
            loop {
                match events_rx.recv().await {
                    Ok(msg) => {
                        if out_tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(room = %code, lagged = n, "Client lagged, skipping snapshots");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Self {
            handle,
            forward_task,
        }
    }

    async fn detach(self, player_id: Uuid) {
        self.handle.send(RoomCmd::Leave { player_id }).await;
        self.forward_task.abort();
    }
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let player_id = Uuid::new_v4();
    info!(player_id = %player_id, "New WebSocket connection");

    let (mut ws_sink, mut ws_stream) = socket.split();

    // Single writer: unicast replies and forwarded room broadcasts both go
    // through this channel so the sink has one owner.
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMsg>(64);

    let writer_player_id = player_id;
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(player_id = %writer_player_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    let _ = out_tx.send(ServerMsg::Welcome { player_id }).await;

    let rate_limiter = ConnectionRateLimiter::new();
    let mut membership: Option<RoomMembership> = None;

    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(player_id = %player_id, "Rate limited input message");
                    continue;
                }

                let msg = match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!(player_id = %player_id, error = %e, "Failed to parse client message");
                        continue;
                    }
                };

                membership =
                    handle_client_msg(msg, player_id, membership, &state, &out_tx).await;
            }
            Ok(Message::Binary(_)) => {
                warn!(player_id = %player_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(player_id = %player_id, "Client initiated close");
                break;
            }
            Err(e) => {
                debug!(player_id = %player_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Disconnect: the room treats this exactly like an explicit leave.
    if let Some(membership) = membership.take() {
        membership.detach(player_id).await;
    }
    writer_handle.abort();

    info!(player_id = %player_id, "WebSocket connection closed");
}

/// Route one parsed client message. Returns the (possibly changed) room
/// membership.
async fn handle_client_msg(
    msg: ClientMsg,
    player_id: Uuid,
    membership: Option<RoomMembership>,
    state: &AppState,
    out_tx: &mpsc::Sender<ServerMsg>,
) -> Option<RoomMembership> {
    match msg {
        ClientMsg::HostGame { username } => {
            if let Some(old) = membership {
                old.detach(player_id).await;
            }
            let handle = RoomRegistry::create_room(
                &state.rooms,
                player_id,
                &username,
                state.config.collection_secs,
            );
            info!(player_id = %player_id, room = %handle.code, "Room hosted");

            let _ = out_tx
                .send(ServerMsg::RoomCreated {
                    code: handle.code.clone(),
                })
                .await;
            let _ = out_tx
                .send(ServerMsg::LobbyUpdate {
                    players: vec![username],
                })
                .await;

            Some(RoomMembership::attach(handle, out_tx.clone()))
        }

        ClientMsg::JoinGame { code, username } => {
            if let Some(old) = membership {
                old.detach(player_id).await;
            }
            match state.rooms.join_room(&code) {
                Ok(handle) => {
                    // Subscribe before the Join command so the resulting
                    // roster broadcast cannot be missed, but confirm the
                    // join only once the actor has accepted it.
                    let membership = RoomMembership::attach(handle, out_tx.clone());
                    let (reply_tx, reply_rx) = oneshot::channel();
                    membership
                        .handle
                        .send(RoomCmd::Join {
                            player_id,
                            username,
                            reply: reply_tx,
                        })
                        .await;
                    match reply_rx.await {
                        Ok(Ok(())) => {
                            let _ = out_tx
                                .send(ServerMsg::JoinSuccess { code: code.clone() })
                                .await;
                            info!(player_id = %player_id, room = %code, "Room joined");
                            Some(membership)
                        }
                        // Rejected, or the room task went away mid-join.
                        // Detach from the snapshot stream without a Leave;
                        // the player was never in the room.
                        outcome => {
                            membership.forward_task.abort();
                            let reason = match outcome {
                                Ok(Err(e)) => e.to_string(),
                                _ => JoinError::RoomNotFound.to_string(),
                            };
                            let _ = out_tx.send(ServerMsg::JoinFailed { reason }).await;
                            None
                        }
                    }
                }
                Err(e) => {
                    let _ = out_tx
                        .send(ServerMsg::JoinFailed {
                            reason: e.to_string(),
                        })
                        .await;
                    None
                }
            }
        }

        ClientMsg::StartGame => {
            if let Some(m) = &membership {
                m.handle.send(RoomCmd::Start { player_id }).await;
            }
            membership
        }

        ClientMsg::PlayerAction { action } => {
            if let Some(m) = &membership {
                m.handle.send(RoomCmd::Action { player_id, action }).await;
            }
            membership
        }

        ClientMsg::LeaveRoom => {
            if let Some(m) = membership {
                m.detach(player_id).await;
            }
            None
        }
    }
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
