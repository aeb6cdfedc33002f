// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end controller scenarios over the real router and supervisor.

use corral::model::{DeviceStatus, ReservationStatus, SessionStatus};
use corral::supervisor::DriverStatus;
use corral_specs::{lab, sole_device_id};
use serde_json::{json, Value};

#[tokio::test]
async fn reserve_auto_start_session() {
    let lab = lab(44723, true).await.expect("lab");
    let device_id = sole_device_id(&lab).await;

    let device = lab.app.registry.get(&device_id).await.expect("device");
    assert_eq!(device.status, DeviceStatus::Online);
    assert_eq!(device.battery, 85);

    let response = lab
        .server
        .post(&format!("/devices/{device_id}/appium/auto-start"))
        .json(&json!({ "userId": "alice", "duration": 120, "purpose": "wdio" }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], true);

    // One active reservation for alice with a 120-minute deadline.
    let reservations = lab.app.sessions.reservations().await;
    assert_eq!(reservations.len(), 1);
    let reservation = &reservations[0];
    assert_eq!(reservation.user_id, "alice");
    assert_eq!(reservation.status, ReservationStatus::Active);
    assert_eq!((reservation.end_time - reservation.start_time).num_minutes(), 120);
    assert_eq!(reservation.purpose, "wdio");

    // Device is held.
    let device = lab.app.registry.get(&device_id).await.expect("device");
    assert_eq!(device.status, DeviceStatus::Reserved);
    assert_eq!(device.reserved_by, "alice");

    // One driver server with a port in range and a WebDriver URL.
    let port = body["data"]["port"].as_u64().expect("port") as u16;
    assert!((44723..44723 + 8).contains(&port));
    let url = body["data"]["url"].as_str().expect("url");
    assert!(url.ends_with(&format!(":{port}/wd/hub")), "{url}");
    assert_eq!(body["data"]["capabilities"]["appium:udid"], "emulator-5554");

    let server = lab.app.supervisor.server(&device_id).await.expect("server record");
    assert_eq!(server.status, DriverStatus::Running);
    assert_eq!(server.port, port);

    // One active session for alice.
    let sessions = lab.app.sessions.sessions_for_user("alice").await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].status, SessionStatus::Active);
}

#[tokio::test]
async fn release_cascades() {
    let lab = lab(44740, true).await.expect("lab");
    let device_id = sole_device_id(&lab).await;

    lab.server
        .post(&format!("/devices/{device_id}/appium/auto-start"))
        .json(&json!({ "userId": "alice", "duration": 120 }))
        .await
        .assert_status_ok();

    let response = lab.server.post(&format!("/devices/{device_id}/appium/stop")).await;
    response.assert_status_ok();

    // Driver server record absent, port returned to the pool.
    assert!(lab.app.supervisor.server(&device_id).await.is_none());
    assert_eq!(lab.app.supervisor.server_count().await, 0);

    // Session ended, reservation completed, device back online.
    assert_eq!(lab.app.sessions.active_session_count().await, 0);
    let reservations = lab.app.sessions.reservations().await;
    assert_eq!(reservations[0].status, ReservationStatus::Completed);

    let device = lab.app.registry.get(&device_id).await.expect("device");
    assert_eq!(device.status, DeviceStatus::Online);
    assert!(device.reserved_by.is_empty());

    // A second auto-start reuses the freed pool.
    lab.server
        .post(&format!("/devices/{device_id}/appium/auto-start"))
        .json(&json!({ "userId": "bob" }))
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn discovery_churn_over_http() {
    let lab = lab(44760, false).await.expect("lab");
    lab.backends.android.connect("second-device");
    lab.server.post("/devices/refresh").await.assert_status_ok();

    let before = lab.app.registry.snapshot().await;
    assert_eq!(before.len(), 2);

    // One device drops off the bridge.
    lab.backends.android.disconnect("second-device");
    lab.server.post("/devices/refresh").await.assert_status_ok();

    let after = lab.app.registry.snapshot().await;
    assert_eq!(after.len(), 2, "offline devices stay in the registry");
    let dropped = after.iter().find(|d| d.serial == "second-device").expect("dropped");
    assert_eq!(dropped.status, DeviceStatus::Offline);
    let kept = after.iter().find(|d| d.serial == "emulator-5554").expect("kept");
    assert_eq!(kept.status, DeviceStatus::Online);

    // It comes back.
    lab.backends.android.connect("second-device");
    lab.server.post("/devices/refresh").await.assert_status_ok();
    let device = lab.app.registry.find_by_serial("second-device").await.expect("back");
    assert_eq!(device.status, DeviceStatus::Online);
}

#[tokio::test]
async fn reservation_invariants_hold_across_flows() {
    let lab = lab(44780, false).await.expect("lab");
    let device_id = sole_device_id(&lab).await;

    // reserve -> release restores the original state.
    lab.server
        .post(&format!("/devices/{device_id}/reserve"))
        .json(&json!({ "userId": "alice" }))
        .await
        .assert_status_ok();
    lab.server.post(&format!("/devices/{device_id}/release")).await.assert_status_ok();

    let device = lab.app.registry.get(&device_id).await.expect("device");
    assert_eq!(device.status, DeviceStatus::Online);
    assert!(device.reserved_by.is_empty());
    assert!(device.reservation_consistent());

    // Reserving an offline device fails and mutates nothing.
    lab.backends.android.disconnect("emulator-5554");
    lab.server.post("/devices/refresh").await.assert_status_ok();
    let response = lab
        .server
        .post(&format!("/devices/{device_id}/reserve"))
        .json(&json!({ "userId": "alice" }))
        .await;
    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().expect("error").contains("offline"));

    let device = lab.app.registry.get(&device_id).await.expect("device");
    assert_eq!(device.status, DeviceStatus::Offline);
    assert!(device.reservation_consistent());
}
