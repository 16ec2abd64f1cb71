//! WebSocket upgrade handler and per-connection event loop.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use notify_common::id::{prefix, prefixed_ulid};
use notify_common::protocol::{
    GroupPayload, HeartbeatPayload, Method, ReadyPayload, OP_HEARTBEAT, OP_INVOKE,
};
use notify_common::{ClientMessage, NotificationContent, ServerMessage};
use tokio::sync::broadcast;
use tokio::time;

use crate::auth::middleware::AuthUser;
use crate::AppState;

use super::fanout::{BroadcastPayload, Target};
use super::session::GatewaySession;

/// Close codes (4000-range for application-level).
const CLOSE_INVALID_JSON: u16 = 4000;
const CLOSE_UNKNOWN_OPCODE: u16 = 4001;
const CLOSE_SESSION_TIMEOUT: u16 = 4009;

/// Longest group name accepted by JoinGroup/LeaveGroup.
const MAX_GROUP_LEN: usize = 128;

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

pub fn router() -> Router<AppState> {
    Router::new().route("/notificationHub", get(ws_upgrade))
}

/// Authentication runs as an extractor, so a bad token is a plain HTTP 401
/// and the upgrade never happens.
async fn ws_upgrade(
    user: AuthUser,
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state, user))
}

async fn handle_connection(socket: WebSocket, state: AppState, user: AuthUser) {
    let (mut ws_tx, ws_rx) = socket.split();

    let session = Arc::new(GatewaySession::new(
        prefixed_ulid(prefix::CONNECTION),
        user.user_id,
    ));

    // Subscribe before READY so nothing dispatched after it is missed.
    let broadcast_rx = state.broadcast.subscribe();
    state.connections.register(session.clone());

    let ready = ServerMessage::ready(
        session.next_seq(),
        &ReadyPayload {
            connection_id: session.connection_id.clone(),
            heartbeat_interval: state.config.heartbeat_interval_ms,
        },
    );

    tracing::info!(
        connection_id = %session.connection_id,
        user_id = %session.user_id,
        connections = state.connections.len(),
        "notification connection established"
    );

    if send_message(&mut ws_tx, &ready).await {
        run_session(&state, &session, ws_tx, ws_rx, broadcast_rx).await;
    }

    state.connections.unregister(&session.connection_id);
    tracing::info!(
        connection_id = %session.connection_id,
        user_id = %session.user_id,
        "notification connection ended"
    );
}

/// Main session event loop: read client messages, forward broadcasts, enforce heartbeat.
async fn run_session(
    state: &AppState,
    session: &GatewaySession,
    mut ws_tx: WsSink,
    mut ws_rx: WsStream,
    mut broadcast_rx: broadcast::Receiver<Arc<BroadcastPayload>>,
) {
    // Client must heartbeat within 1.5× the interval.
    let heartbeat_deadline = Duration::from_millis(state.config.heartbeat_interval_ms * 3 / 2);
    let mut heartbeat_timer = time::interval(heartbeat_deadline);
    heartbeat_timer.tick().await; // First tick fires immediately; skip it.
    let mut got_heartbeat = true;

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let client_msg: ClientMessage = match serde_json::from_str(&text) {
                            Ok(m) => m,
                            Err(_) => {
                                let _ = send_close(&mut ws_tx, CLOSE_INVALID_JSON, "Invalid JSON").await;
                                break;
                            }
                        };

                        match client_msg.op {
                            OP_HEARTBEAT => {
                                got_heartbeat = true;
                                let payload: HeartbeatPayload = serde_json::from_value(client_msg.d)
                                    .unwrap_or(HeartbeatPayload { seq: 0 });
                                if !send_message(&mut ws_tx, &ServerMessage::heartbeat_ack(payload.seq)).await {
                                    break;
                                }
                            }
                            OP_INVOKE => {
                                // Any traffic proves liveness.
                                got_heartbeat = true;
                                let id = client_msg.id.unwrap_or_default();
                                let error = handle_invoke(state, session, client_msg).err();
                                if !send_message(&mut ws_tx, &ServerMessage::completion(id, error)).await {
                                    break;
                                }
                            }
                            _ => {
                                let _ = send_close(&mut ws_tx, CLOSE_UNKNOWN_OPCODE, "Unknown opcode").await;
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, connection_id = %session.connection_id, "ws read error");
                        break;
                    }
                    _ => continue,
                }
            }

            result = broadcast_rx.recv() => {
                match result {
                    Ok(payload) => {
                        if !session.matches(&payload.target) {
                            continue;
                        }
                        let msg = ServerMessage::notification(session.next_seq(), &payload.content);
                        if !send_message(&mut ws_tx, &msg).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // At-most-once: missed notifications are not redelivered.
                        tracing::warn!(
                            connection_id = %session.connection_id,
                            skipped = n,
                            "notification session lagged behind broadcast"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }

            _ = heartbeat_timer.tick() => {
                if !got_heartbeat {
                    tracing::debug!(
                        connection_id = %session.connection_id,
                        "heartbeat timeout, closing connection"
                    );
                    let _ = send_close(&mut ws_tx, CLOSE_SESSION_TIMEOUT, "Heartbeat timeout").await;
                    break;
                }
                got_heartbeat = false;
            }
        }
    }
}

/// Run a client invocation. The error string becomes the completion's error.
fn handle_invoke(
    state: &AppState,
    session: &GatewaySession,
    msg: ClientMessage,
) -> Result<(), String> {
    let method = msg.t.unwrap_or_default();
    match method.as_str() {
        Method::SEND_NOTIFICATION => {
            let content: NotificationContent = serde_json::from_value(msg.d)
                .map_err(|e| format!("invalid notification: {e}"))?;
            tracing::info!(
                connection_id = %session.connection_id,
                kind = %content.kind,
                "client broadcast notification"
            );
            state.broadcast.dispatch(Target::All, content);
            Ok(())
        }
        Method::JOIN_GROUP => {
            let group = group_name(msg.d)?;
            if session.join(&group) {
                tracing::debug!(connection_id = %session.connection_id, %group, "joined group");
            }
            Ok(())
        }
        Method::LEAVE_GROUP => {
            let group = group_name(msg.d)?;
            if session.leave(&group) {
                tracing::debug!(connection_id = %session.connection_id, %group, "left group");
            }
            Ok(())
        }
        other => Err(format!("unknown method: {other}")),
    }
}

fn group_name(d: serde_json::Value) -> Result<String, String> {
    let payload: GroupPayload =
        serde_json::from_value(d).map_err(|e| format!("invalid group payload: {e}"))?;
    let group = payload.group.trim();
    if group.is_empty() {
        return Err("group name must not be empty".to_string());
    }
    if group.len() > MAX_GROUP_LEN {
        return Err(format!("group name exceeds {MAX_GROUP_LEN} characters"));
    }
    Ok(group.to_string())
}

/// Serialize and send; false once the socket is gone.
async fn send_message(ws_tx: &mut WsSink, msg: &ServerMessage) -> bool {
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(?e, "failed to serialize server message");
            return true;
        }
    };
    ws_tx.send(Message::Text(json.into())).await.is_ok()
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(ws_tx: &mut WsSink, code: u16, reason: &str) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
