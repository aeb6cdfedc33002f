// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket hub: fans registry/session/driver events out to subscribers
//! and routes inbound control messages into the other components.

#[path = "ws_msg.rs"]
mod msg;
pub use msg::*;

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;

use crate::event::LabEvent;
use crate::mirror::{FrameSink, MirrorEvent};
use crate::model::CommandStatus;
use crate::state::App;

/// Direct (per-subscriber) channel depth. Frames are dropped, not queued,
/// when a slow client falls this far behind.
const DIRECT_CHANNEL_DEPTH: usize = 64;

/// `GET /ws` — WebSocket upgrade for realtime subscribers.
pub async fn ws_handler(
    State(app): State<Arc<App>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        let client_id = format!("ws-{}", uuid::Uuid::new_v4());
        handle_connection(app, socket, client_id)
    })
}

/// Per-connection event loop.
async fn handle_connection(app: Arc<App>, socket: WebSocket, client_id: String) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut bus_rx = app.bus.subscribe();
    let (direct_tx, mut direct_rx) = mpsc::channel::<ServerMessage>(DIRECT_CHANNEL_DEPTH);

    // The device a subscriber currently mirrors; at most one.
    let mut mirrored: Option<String> = None;

    // On connect, push the current device list snapshot.
    let snapshot = ServerMessage::DeviceList {
        devices: app.registry.snapshot().await,
        timestamp: Utc::now(),
    };
    if send_json(&mut ws_tx, &snapshot).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            _ = app.shutdown.cancelled() => break,

            event = bus_rx.recv() => {
                let event = match event {
                    Ok(e) => e,
                    Err(_) => continue, // lagged or closed; resubscription not worth it
                };
                if send_json(&mut ws_tx, &event_to_msg(event)).await.is_err() {
                    break;
                }
            }

            msg = direct_rx.recv() => {
                let msg = match msg {
                    Some(m) => m,
                    None => break,
                };
                if send_json(&mut ws_tx, &msg).await.is_err() {
                    break;
                }
            }

            inbound = ws_rx.next() => {
                let inbound = match inbound {
                    Some(Ok(m)) => m,
                    Some(Err(_)) | None => break,
                };
                match inbound {
                    Message::Text(text) => {
                        let client_msg: ClientMessage = match serde_json::from_str(&text) {
                            Ok(m) => m,
                            Err(e) => {
                                let err = ServerMessage::error(format!("invalid message: {e}"));
                                if send_json(&mut ws_tx, &err).await.is_err() {
                                    break;
                                }
                                continue;
                            }
                        };
                        if let Some(reply) = handle_client_message(
                            &app,
                            client_msg,
                            &client_id,
                            &direct_tx,
                            &mut mirrored,
                        )
                        .await
                        {
                            if send_json(&mut ws_tx, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    // Cleanup: a disconnect stops any mirror this subscriber owned.
    if let Some(device_id) = mirrored {
        app.mirrors.stop(&device_id, &client_id).await;
    }
    debug!(client = %client_id, "subscriber disconnected");
}

/// Route one inbound message; the reply (if any) goes only to this client.
async fn handle_client_message(
    app: &Arc<App>,
    msg: ClientMessage,
    client_id: &str,
    direct_tx: &mpsc::Sender<ServerMessage>,
    mirrored: &mut Option<String>,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::Reserve { device_id, user_id, duration, purpose } => {
            match app
                .sessions
                .reserve(&device_id, &user_id, duration, purpose.as_deref().unwrap_or(""))
                .await
            {
                Ok(reservation) => {
                    Some(ServerMessage::Reserved { reservation, timestamp: Utc::now() })
                }
                Err(e) => Some(ServerMessage::error(e.to_string())),
            }
        }

        ClientMessage::Release { device_id } => match app.sessions.release(&device_id).await {
            // The registry broadcast already carries the device; ack quietly.
            Ok(_) => None,
            Err(e) => Some(ServerMessage::error(e.to_string())),
        },

        ClientMessage::StartSession { device_id, user_id } => {
            match app.sessions.create_session(&device_id, &user_id).await {
                Ok(session) => {
                    Some(ServerMessage::SessionStarted { session, timestamp: Utc::now() })
                }
                Err(e) => Some(ServerMessage::error(e.to_string())),
            }
        }

        ClientMessage::EndSession { session_id } => {
            match app.sessions.end_session(&session_id).await {
                Ok(session) => {
                    Some(ServerMessage::SessionEnded { session, timestamp: Utc::now() })
                }
                Err(e) => Some(ServerMessage::error(e.to_string())),
            }
        }

        ClientMessage::Command { device_id, payload } => {
            match app.execute_command(&device_id, payload).await {
                Ok(command) => Some(ServerMessage::CommandResult {
                    command_id: command.id,
                    success: command.status == CommandStatus::Completed,
                    result: command.result,
                    error: command.error,
                    timestamp: Utc::now(),
                }),
                Err(e) => Some(ServerMessage::error(e.to_string())),
            }
        }

        ClientMessage::RefreshDevices {} => {
            // The cycle itself ends with a device-list broadcast.
            app.registry.discover().await;
            None
        }

        ClientMessage::StartMirror { device_id, fps } => {
            let device = match app.registry.get(&device_id).await {
                Ok(d) => d,
                Err(e) => return Some(ServerMessage::error(e.to_string())),
            };

            // Same device again: confirm and reuse (start() replaces the
            // sink, and revives the pump if it shed earlier). A different
            // device first stops the previous mirror for this subscriber.
            if let Some(previous) = mirrored.as_ref() {
                if previous != &device_id {
                    app.mirrors.stop(previous, client_id).await;
                }
            }

            let sink = frame_sink(direct_tx.clone());
            app.mirrors
                .start(&device.id, &device.serial, device.platform, client_id, fps, sink)
                .await;
            *mirrored = Some(device_id.clone());
            Some(ServerMessage::MirrorStarted {
                device_id,
                fps: crate::mirror::MirrorPool::effective_fps(fps),
                timestamp: Utc::now(),
            })
        }

        ClientMessage::StopMirror { device_id } => {
            app.mirrors.stop(&device_id, client_id).await;
            if mirrored.as_deref() == Some(device_id.as_str()) {
                *mirrored = None;
            }
            Some(ServerMessage::MirrorStopped { device_id, timestamp: Utc::now() })
        }

        ClientMessage::Ping {} => Some(ServerMessage::Pong {}),
    }
}

/// Adapt the mirror pump's event callback onto this subscriber's direct
/// channel. Full channel drops the frame (no queueing behind a slow client).
fn frame_sink(direct_tx: mpsc::Sender<ServerMessage>) -> FrameSink {
    Arc::new(move |event: MirrorEvent| {
        let msg = match event {
            MirrorEvent::Frame(frame) => {
                ServerMessage::ScreenUpdate { frame, timestamp: Utc::now() }
            }
            MirrorEvent::Stopped { device_id, error } => match error {
                Some(error) => ServerMessage::Error {
                    error,
                    command_id: None,
                    timestamp: Utc::now(),
                },
                None => ServerMessage::MirrorStopped { device_id, timestamp: Utc::now() },
            },
        };
        let _ = direct_tx.try_send(msg);
    })
}

fn event_to_msg(event: LabEvent) -> ServerMessage {
    match event {
        LabEvent::DeviceUpdated { device, timestamp } => {
            ServerMessage::DeviceUpdated { device, timestamp }
        }
        LabEvent::DeviceList { devices, timestamp } => {
            ServerMessage::DeviceList { devices, timestamp }
        }
        LabEvent::DeviceLog { entry, timestamp } => {
            ServerMessage::DeviceLog { entry, timestamp }
        }
        LabEvent::SystemHealth { health, timestamp } => {
            ServerMessage::SystemHealth { health, timestamp }
        }
    }
}

/// Send a JSON-serialized message over the WebSocket.
async fn send_json<S>(tx: &mut S, msg: &ServerMessage) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let text = match serde_json::to_string(msg) {
        Ok(t) => t,
        Err(_) => return Err(()),
    };
    tx.send(Message::Text(text.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
