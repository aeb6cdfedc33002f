// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use axum_test::TestServer;
use serde_json::{json, Value};

use crate::config::Config;
use crate::test_support::MockBackends;

async fn server_with_devices() -> (MockBackends, Arc<App>, TestServer, String, String) {
    let backends = MockBackends::new();
    backends.android.connect("droid-1");
    backends.ios.connect("UDID-1");
    let app = App::with_adapters(Config::default(), backends.adapters()).expect("app");
    app.registry.discover().await;

    let devices = app.registry.snapshot().await;
    let android = devices
        .iter()
        .find(|d| d.platform == crate::model::Platform::Android)
        .expect("android")
        .id
        .clone();
    let ios = devices
        .iter()
        .find(|d| d.platform == crate::model::Platform::Ios)
        .expect("ios")
        .id
        .clone();

    let server = TestServer::new(build_router(Arc::clone(&app))).expect("test server");
    (backends, app, server, android, ios)
}

#[tokio::test]
async fn device_list_envelope() {
    let (_backends, _app, server, ..) = server_with_devices().await;
    let response = server.get("/devices").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn unknown_device_is_404_with_envelope() {
    let (_backends, _app, server, ..) = server_with_devices().await;
    let response = server.get("/devices/ghost").await;
    response.assert_status(axum::http::StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().expect("error").contains("ghost"));
}

#[tokio::test]
async fn reserve_and_release_over_http() {
    let (_backends, app, server, android, _) = server_with_devices().await;

    let response = server
        .post(&format!("/devices/{android}/reserve"))
        .json(&json!({ "userId": "alice", "duration": 120, "purpose": "wdio" }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["userId"], "alice");
    assert_eq!(body["data"]["status"], "active");

    // Reserving again is an invalid-state failure with the observed status.
    let response = server
        .post(&format!("/devices/{android}/reserve"))
        .json(&json!({ "userId": "bob" }))
        .await;
    response.assert_status(axum::http::StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["error"].as_str().expect("error").contains("reserved"));

    let response = server.post(&format!("/devices/{android}/release")).await;
    response.assert_status_ok();
    let device = app.registry.get(&android).await.expect("device");
    assert_eq!(device.status, crate::model::DeviceStatus::Online);
}

#[tokio::test]
async fn tap_shortcut_hits_adapter() {
    let (backends, _app, server, android, _) = server_with_devices().await;
    let response = server
        .post(&format!("/devices/{android}/tap"))
        .json(&json!({ "x": 12.0, "y": 34.0 }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["status"], "completed");
    assert_eq!(backends.android.taps.lock().len(), 1);
}

#[tokio::test]
async fn shell_on_ios_fails_cleanly() {
    let (backends, _app, server, _, ios) = server_with_devices().await;
    let response = server
        .post(&format!("/devices/{ios}/shell"))
        .json(&json!({ "command": "ls /" }))
        .await;
    response.assert_status(axum::http::StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().expect("error").contains("not supported for iOS"));
    assert_eq!(body["data"]["status"], "failed");
    assert!(backends.ios.shells.lock().is_empty());
}

#[tokio::test]
async fn generic_command_endpoint() {
    let (_backends, _app, server, android, _) = server_with_devices().await;
    let response = server
        .post(&format!("/devices/{android}/command"))
        .json(&json!({ "type": "text", "payload": { "text": "hello world" } }))
        .await;
    response.assert_status_ok();

    // Unknown command kinds are rejected at the boundary.
    let response = server
        .post(&format!("/devices/{android}/command"))
        .json(&json!({ "type": "reboot", "payload": {} }))
        .await;
    assert!(response.status_code().is_client_error());
}

#[tokio::test]
async fn session_flow_over_http() {
    let (_backends, _app, server, android, _) = server_with_devices().await;

    server
        .post(&format!("/devices/{android}/reserve"))
        .json(&json!({ "userId": "alice" }))
        .await
        .assert_status_ok();

    let response = server
        .post("/sessions")
        .json(&json!({ "deviceId": android, "userId": "alice" }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    let session_id = body["data"]["id"].as_str().expect("session id").to_owned();

    let response = server.get(&format!("/sessions/{session_id}")).await;
    response.assert_status_ok();

    let response = server.post(&format!("/sessions/{session_id}/end")).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["status"], "completed");

    let response = server.get("/sessions/user/alice").await;
    let body: Value = response.json();
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn driver_start_requires_hold() {
    let (_backends, _app, server, android, _) = server_with_devices().await;
    let response = server.post(&format!("/devices/{android}/appium/start")).await;
    response.assert_status(axum::http::StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["error"].as_str().expect("error").contains("reserved"));
}

#[tokio::test]
async fn driver_status_when_absent() {
    let (_backends, _app, server, android, _) = server_with_devices().await;
    let response = server.get(&format!("/devices/{android}/appium/status")).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["running"], false);
}

#[tokio::test]
async fn system_and_analytics_endpoints() {
    let (_backends, _app, server, ..) = server_with_devices().await;

    let health: Value = server.get("/system/health").await.json();
    assert_eq!(health["success"], true);
    assert_eq!(health["data"]["devicesTotal"], 2);

    let stats: Value = server.get("/system/stats").await.json();
    assert_eq!(stats["data"]["devices"]["total"], 2);
    assert_eq!(stats["data"]["driverServers"], 0);

    let reservations: Value = server.get("/system/reservations").await.json();
    assert_eq!(reservations["data"].as_array().map(Vec::len), Some(0));

    let analytics: Value = server.get("/analytics").await.json();
    assert_eq!(analytics["data"]["totalSessions"], 0);

    let hourly: Value = server.get("/analytics/hourly").await.json();
    assert_eq!(hourly["data"].as_array().map(Vec::len), Some(24));

    let devices: Value = server.get("/analytics/devices").await.json();
    assert_eq!(devices["data"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn refresh_triggers_discovery() {
    let (backends, _app, server, ..) = server_with_devices().await;
    backends.android.connect("droid-2");

    let response = server.post("/devices/refresh").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"].as_array().map(Vec::len), Some(3));
}
