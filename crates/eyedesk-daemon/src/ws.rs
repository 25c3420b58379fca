//! WebSocket handlers for the scene channels and the projector

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use eyedesk_core::{decode_drawable_size, ChannelKind, ChannelMessage};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::state::{AppState, ProjectorOut};

/// `/jointsWs`
pub async fn kinematic_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_channel(socket, state, ChannelKind::Kinematic))
}

/// `/primitiveWs`
pub async fn objects_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_channel(socket, state, ChannelKind::Object))
}

/// `/controlsWs`
pub async fn controls_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_channel(socket, state, ChannelKind::Control))
}

/// `/DrawWs`
pub async fn draw_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_projector(socket, state))
}

/// Frame a channel message the way viewers expect it on the wire
pub fn to_ws_message(message: &ChannelMessage) -> Option<Message> {
    match message {
        ChannelMessage::Kinematic(frame) => Some(Message::Binary(frame.encode().into())),
        ChannelMessage::Object(records) => serde_json::to_string(records)
            .ok()
            .map(|json| Message::Text(json.into())),
        ChannelMessage::Control(delta) => serde_json::to_string(delta)
            .ok()
            .map(|json| Message::Text(json.into())),
    }
}

async fn handle_channel(socket: WebSocket, state: Arc<AppState>, kind: ChannelKind) {
    let (mut sender, mut receiver) = socket.split();
    let (replay, mut updates) = state.hub(kind).connect().await;

    info!(channel = %kind, "Viewer connected");

    // Late viewers start from the last good state
    if let Some(latest) = replay {
        if let Some(msg) = to_ws_message(&latest) {
            if sender.send(msg).await.is_err() {
                return;
            }
        }
    }

    loop {
        tokio::select! {
            update = updates.recv() => {
                match update {
                    Ok(message) => {
                        if let Some(msg) = to_ws_message(&message) {
                            if sender.send(msg).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        debug!(channel = %kind, skipped = n, "Viewer lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(channel = %kind, error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!(channel = %kind, "Viewer disconnected");
}

async fn handle_projector(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut outbound = state.projector.subscribe();
    let replies = state.projector.size_replies();

    info!("Projector connected");

    loop {
        tokio::select! {
            out = outbound.recv() => {
                let text = match out {
                    Ok(ProjectorOut::Draw(objects)) => match serde_json::to_string(&objects) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!(error = %e, "Failed to encode draw batch");
                            continue;
                        }
                    },
                    Ok(ProjectorOut::Command(command)) => command.to_string(),
                    Err(RecvError::Lagged(n)) => {
                        debug!(skipped = n, "Projector lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Binary(bytes))) => match decode_drawable_size(&bytes) {
                        Ok(size) => {
                            let _ = replies.try_send(size);
                        }
                        Err(e) => debug!(error = %e, "Ignoring projector reply"),
                    },
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(error = %e, "Projector WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("Projector disconnected");
}
