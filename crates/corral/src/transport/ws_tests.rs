// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::state::App;
use crate::test_support::MockBackends;

struct WsFixture {
    backends: MockBackends,
    app: Arc<App>,
    direct_tx: mpsc::Sender<ServerMessage>,
    direct_rx: mpsc::Receiver<ServerMessage>,
    mirrored: Option<String>,
}

async fn fixture() -> (WsFixture, String) {
    let backends = MockBackends::new();
    backends.android.connect("droid-1");
    let app = App::with_adapters(Config::default(), backends.adapters()).expect("app");
    app.registry.discover().await;
    let device_id = app.registry.snapshot().await[0].id.clone();
    let (direct_tx, direct_rx) = mpsc::channel(16);
    (WsFixture { backends, app, direct_tx, direct_rx, mirrored: None }, device_id)
}

async fn send(fx: &mut WsFixture, msg: ClientMessage) -> Option<ServerMessage> {
    handle_client_message(&fx.app, msg, "client-1", &fx.direct_tx, &mut fx.mirrored).await
}

#[tokio::test]
async fn reserve_and_session_round_trip() {
    let (mut fx, device_id) = fixture().await;

    let reply = send(
        &mut fx,
        ClientMessage::Reserve {
            device_id: device_id.clone(),
            user_id: "alice".to_owned(),
            duration: Some(60),
            purpose: None,
        },
    )
    .await;
    assert!(matches!(reply, Some(ServerMessage::Reserved { .. })), "{reply:?}");

    let reply = send(
        &mut fx,
        ClientMessage::StartSession { device_id: device_id.clone(), user_id: "alice".to_owned() },
    )
    .await;
    let session_id = match reply {
        Some(ServerMessage::SessionStarted { session, .. }) => session.id,
        other => panic!("expected SessionStarted, got {other:?}"),
    };

    let reply = send(&mut fx, ClientMessage::EndSession { session_id }).await;
    assert!(matches!(reply, Some(ServerMessage::SessionEnded { .. })));

    let reply = send(&mut fx, ClientMessage::Release { device_id }).await;
    assert!(reply.is_none(), "release acks via the device-updated broadcast");
}

#[tokio::test]
async fn reserve_failure_is_error_message() {
    let (mut fx, device_id) = fixture().await;
    send(
        &mut fx,
        ClientMessage::Reserve {
            device_id: device_id.clone(),
            user_id: "alice".to_owned(),
            duration: None,
            purpose: None,
        },
    )
    .await;

    let reply = send(
        &mut fx,
        ClientMessage::Reserve {
            device_id,
            user_id: "bob".to_owned(),
            duration: None,
            purpose: None,
        },
    )
    .await;
    match reply {
        Some(ServerMessage::Error { error, .. }) => {
            assert!(error.contains("reserved"), "{error}")
        }
        other => panic!("expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn command_reply_carries_command_id() {
    let (mut fx, device_id) = fixture().await;
    let reply = send(
        &mut fx,
        ClientMessage::Command {
            device_id,
            payload: crate::model::CommandPayload::Tap { x: 5.0, y: 6.0 },
        },
    )
    .await;
    match reply {
        Some(ServerMessage::CommandResult { command_id, success, error, .. }) => {
            assert!(!command_id.is_empty());
            assert!(success);
            assert!(error.is_none());
        }
        other => panic!("expected CommandResult, got {other:?}"),
    }
    assert_eq!(fx.backends.android.taps.lock().len(), 1);
}

#[tokio::test]
async fn mirror_binding_is_one_device_per_subscriber() {
    let (mut fx, device_a) = fixture().await;
    fx.backends.android.connect("droid-2");
    fx.app.registry.discover().await;
    let device_b = fx
        .app
        .registry
        .snapshot()
        .await
        .iter()
        .find(|d| d.serial == "droid-2")
        .expect("second device")
        .id
        .clone();

    let reply =
        send(&mut fx, ClientMessage::StartMirror { device_id: device_a.clone(), fps: Some(10.0) })
            .await;
    match reply {
        Some(ServerMessage::MirrorStarted { fps, .. }) => assert_eq!(fps, 1.0),
        other => panic!("expected MirrorStarted, got {other:?}"),
    }
    assert!(fx.app.mirrors.is_mirroring(&device_a).await);

    // Same device again: confirm, still one pump.
    send(&mut fx, ClientMessage::StartMirror { device_id: device_a.clone(), fps: None }).await;
    assert_eq!(fx.app.mirrors.active_count().await, 1);

    // Different device: the previous binding is swapped out.
    send(&mut fx, ClientMessage::StartMirror { device_id: device_b.clone(), fps: None }).await;
    assert!(!fx.app.mirrors.is_mirroring(&device_a).await);
    assert!(fx.app.mirrors.is_mirroring(&device_b).await);
    assert_eq!(fx.mirrored.as_deref(), Some(device_b.as_str()));

    let reply = send(&mut fx, ClientMessage::StopMirror { device_id: device_b.clone() }).await;
    assert!(matches!(reply, Some(ServerMessage::MirrorStopped { .. })));
    assert!(!fx.app.mirrors.is_mirroring(&device_b).await);
    assert!(fx.mirrored.is_none());
}

#[tokio::test]
async fn mirror_frames_arrive_on_direct_channel() {
    let (mut fx, device_id) = fixture().await;
    send(&mut fx, ClientMessage::StartMirror { device_id: device_id.clone(), fps: None }).await;

    let msg = tokio::time::timeout(std::time::Duration::from_secs(2), fx.direct_rx.recv())
        .await
        .expect("frame within one period")
        .expect("channel open");
    match msg {
        ServerMessage::ScreenUpdate { frame, .. } => {
            assert_eq!(frame.device_id, device_id);
            assert_eq!(frame.mime_type, "image/png");
        }
        other => panic!("expected ScreenUpdate, got {other:?}"),
    }
    send(&mut fx, ClientMessage::StopMirror { device_id }).await;
}

#[tokio::test]
async fn unknown_mirror_target_errors() {
    let (mut fx, _) = fixture().await;
    let reply =
        send(&mut fx, ClientMessage::StartMirror { device_id: "ghost".to_owned(), fps: None })
            .await;
    assert!(matches!(reply, Some(ServerMessage::Error { .. })));
}

#[tokio::test]
async fn ping_pong() {
    let (mut fx, _) = fixture().await;
    let reply = send(&mut fx, ClientMessage::Ping {}).await;
    assert!(matches!(reply, Some(ServerMessage::Pong {})));
}

#[test]
fn client_message_wire_format() {
    let msg: ClientMessage = serde_json::from_str(
        r#"{"type":"start-mirror","deviceId":"d1","fps":5}"#,
    )
    .expect("parse");
    assert!(matches!(msg, ClientMessage::StartMirror { .. }));

    let msg: ClientMessage = serde_json::from_str(
        r#"{"type":"command","deviceId":"d1","payload":{"type":"tap","payload":{"x":1,"y":2}}}"#,
    )
    .expect("parse");
    assert!(matches!(msg, ClientMessage::Command { .. }));

    assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"bogus"}"#).is_err());
}

#[test]
fn server_message_wire_format() {
    let json = serde_json::to_value(ServerMessage::error("boom")).expect("serialize");
    assert_eq!(json["type"], "error");
    assert_eq!(json["error"], "boom");
    assert!(json.get("timestamp").is_some());
}
