use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use njvox_core::config::{HANDSHAKE_TIMEOUT_MS, HEARTBEAT_PING_SECS, MAX_PAYLOAD_BYTES};
use njvox_protocol::events::{RecoverMessageParams, SendMessageParams, SessionModelUpdatedEvent, UpdateSessionModelParams};
use njvox_protocol::frames::{EventFrame, InboundFrame, ResFrame};
use njvox_protocol::handshake::ConnectParams;
use njvox_protocol::methods::{CONNECT, PING, RECOVER_MESSAGE, SEND_MESSAGE, TYPING_START, TYPING_STOP, UPDATE_SESSION_MODEL};
use tracing::{info, warn};

use crate::app::AppState;
use crate::ws::handshake::{self, ClientAuth};
use crate::ws::sink::WsSink;

/// Axum handler — upgrades HTTP to WebSocket at GET /ws.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_connection(socket, state))
}

/// Per-connection task. a connection is accepted before auth is
/// resolved — only `send_message` requires `authenticated`.
async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, "new WS connection");

    let (tx, mut rx) = socket.split();
    let sink = Arc::new(WsSink::new(tx));

    let mut auth: Option<ClientAuth> = None;
    let handshake_deadline = tokio::time::Instant::now() + Duration::from_millis(HANDSHAKE_TIMEOUT_MS);
    let mut handshake_timer = Box::pin(tokio::time::sleep_until(handshake_deadline));
    let mut ping_interval = tokio::time::interval(Duration::from_secs(HEARTBEAT_PING_SECS));
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let text_ref: &str = &text;
                        if text_ref.len() > MAX_PAYLOAD_BYTES {
                            warn!(conn_id, size = text_ref.len(), "payload too large, dropping connection");
                            break;
                        }
                        if auth.is_none() {
                            match try_handshake(text_ref, &state, &sink).await {
                                Some(resolved) => auth = Some(resolved),
                                None => continue,
                            }
                        } else if let Some(resolved) = auth.clone() {
                            dispatch(&conn_id, text_ref, &resolved, &state, &sink).await;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(conn_id, error = %e, "WS read error");
                        break;
                    }
                    _ => {}
                }
            }
            _ = ping_interval.tick() => {
                if sink.send_ping().await.is_err() {
                    break;
                }
            }
            _ = &mut handshake_timer => {
                if auth.is_none() {
                    warn!(conn_id, "handshake timeout, closing connection");
                    break;
                }
            }
        }
    }

    info!(conn_id, "WS connection closed");
}

/// Processes the mandatory `connect` frame. Any other frame before auth
/// is resolved is rejected with a protocol error and the connection stays
/// in the pre-auth state.
async fn try_handshake(text: &str, state: &Arc<AppState>, sink: &Arc<WsSink>) -> Option<ClientAuth> {
    let frame: InboundFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            warn!(error = %e, "malformed frame before handshake, ignoring");
            return None;
        }
    };
    let Some(req) = frame.as_req() else {
        return None;
    };
    if req.method != CONNECT {
        let _ = sink.send_res(&ResFrame::err(&req.id, "PROTOCOL_ERROR", "must send connect first")).await;
        return None;
    }
    let params: ConnectParams = match req.params.and_then(|p| serde_json::from_value(p).ok()) {
        Some(p) => p,
        None => {
            let _ = sink.send_res(&ResFrame::err(&req.id, "PROTOCOL_ERROR", "invalid connect params")).await;
            return None;
        }
    };

    let resolved = handshake::resolve_auth(&params, &state.config);
    let hello = handshake::hello_ok_payload(resolved.authenticated);
    let _ = sink.send_res(&ResFrame::ok(&req.id, hello)).await;
    info!(authenticated = resolved.authenticated, user_id = %resolved.user_id, "WS handshake complete");
    Some(resolved)
}

async fn dispatch(conn_id: &str, text: &str, auth: &ClientAuth, state: &Arc<AppState>, sink: &Arc<WsSink>) {
    let frame: InboundFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            warn!(conn_id, error = %e, "malformed frame, ignoring");
            return;
        }
    };
    let Some(req) = frame.as_req() else {
        return;
    };

    match req.method.as_str() {
        PING => {
            let _ = sink.send_res(&ResFrame::ok(&req.id, serde_json::json!({ "pong": true }))).await;
        }
        SEND_MESSAGE => {
            if !auth.authenticated {
                let _ = sink
                    .send_res(&ResFrame::err(&req.id, "AUTHZ_DENIED", "unauthenticated connections may not send messages"))
                    .await;
                return;
            }
            let Some(params) = req.params.clone().and_then(|p| serde_json::from_value::<SendMessageParams>(p).ok()) else {
                let _ = sink.send_res(&ResFrame::err(&req.id, "PROTOCOL_ERROR", "invalid send_message params")).await;
                return;
            };
            let _ = sink.send_res(&ResFrame::ok(&req.id, serde_json::json!({ "accepted": true }))).await;
            state
                .chat
                .handle_turn(
                    sink.as_ref(),
                    conn_id,
                    &auth.user_id,
                    params.session_id.as_deref(),
                    params.model_id.as_deref(),
                    &params.message,
                )
                .await;
        }
        RECOVER_MESSAGE => {
            let Some(params) = req.params.clone().and_then(|p| serde_json::from_value::<RecoverMessageParams>(p).ok()) else {
                let _ = sink.send_res(&ResFrame::err(&req.id, "PROTOCOL_ERROR", "invalid recover_message params")).await;
                return;
            };
            let _ = sink.send_res(&ResFrame::ok(&req.id, serde_json::json!({ "accepted": true }))).await;
            state.chat.recover(sink.as_ref(), &params.session_id).await;
        }
        UPDATE_SESSION_MODEL => {
            if !auth.authenticated {
                let _ = sink.send_res(&ResFrame::err(&req.id, "AUTHZ_DENIED", "unauthenticated")).await;
                return;
            }
            let Some(params) = req.params.clone().and_then(|p| serde_json::from_value::<UpdateSessionModelParams>(p).ok()) else {
                let _ = sink
                    .send_res(&ResFrame::err(&req.id, "PROTOCOL_ERROR", "invalid update_session_model params"))
                    .await;
                return;
            };
            match state.sessions.update_model(&params.session_id, &auth.user_id, &params.model_id) {
                Ok(()) => {
                    let _ = sink.send_res(&ResFrame::ok(&req.id, serde_json::json!({ "ok": true }))).await;
                    let _ = sink
                        .emit_event(EventFrame::new(
                            "session_model_updated",
                            SessionModelUpdatedEvent { session_id: params.session_id, model_id: params.model_id },
                        ))
                        .await;
                }
                Err(e) => {
                    let _ = sink.send_res(&ResFrame::err(&req.id, e.code(), &e.to_string())).await;
                }
            }
        }
        TYPING_START | TYPING_STOP => {
            let _ = sink.send_res(&ResFrame::ok(&req.id, serde_json::json!({ "ok": true }))).await;
        }
        other => {
            let _ = sink
                .send_res(&ResFrame::err(&req.id, "METHOD_NOT_FOUND", &format!("unknown method '{other}'")))
                .await;
        }
    }
}
