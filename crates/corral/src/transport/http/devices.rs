// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device listing, refresh, and reservation handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::state::App;
use crate::transport::{ok, ok_with_message};

/// `GET /devices` — list all devices.
pub async fn list_devices(State(app): State<Arc<App>>) -> Response {
    ok(app.registry.snapshot().await)
}

/// `GET /devices/{id}` — one device.
pub async fn get_device(State(app): State<Arc<App>>, Path(id): Path<String>) -> Response {
    match app.registry.get(&id).await {
        Ok(device) => ok(device),
        Err(e) => e.into_response(),
    }
}

/// `POST /devices/refresh` — force a discovery cycle.
pub async fn refresh_devices(State(app): State<Arc<App>>) -> Response {
    app.registry.discover().await;
    ok_with_message(app.registry.snapshot().await, "discovery complete")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveRequest {
    pub user_id: String,
    /// Minutes.
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub purpose: Option<String>,
}

/// `POST /devices/{id}/reserve` — grant an exclusive hold.
pub async fn reserve_device(
    State(app): State<Arc<App>>,
    Path(id): Path<String>,
    Json(req): Json<ReserveRequest>,
) -> Response {
    match app
        .sessions
        .reserve(&id, &req.user_id, req.duration, req.purpose.as_deref().unwrap_or(""))
        .await
    {
        Ok(reservation) => ok(reservation),
        Err(e) => e.into_response(),
    }
}

/// `POST /devices/{id}/release` — release the hold, ending any active
/// session and stopping the device's driver server.
pub async fn release_device(State(app): State<Arc<App>>, Path(id): Path<String>) -> Response {
    app.supervisor.stop(&id).await;
    let _ = app.sessions.end_active_session_for_device(&id).await;
    match app.sessions.release(&id).await {
        Ok(device) => ok(device),
        Err(e) => e.into_response(),
    }
}

/// `GET /devices/{id}/sessions` — all sessions for a device.
pub async fn device_sessions(State(app): State<Arc<App>>, Path(id): Path<String>) -> Response {
    if let Err(e) = app.registry.get(&id).await {
        return e.into_response();
    }
    ok(app.sessions.sessions_for_device(&id).await)
}

/// `GET /devices/{id}/reservations` — active reservations for a device.
pub async fn device_reservations(
    State(app): State<Arc<App>>,
    Path(id): Path<String>,
) -> Response {
    if let Err(e) = app.registry.get(&id).await {
        return e.into_response();
    }
    let active: Vec<_> = app.sessions.active_reservation(&id).await.into_iter().collect();
    ok(active)
}
