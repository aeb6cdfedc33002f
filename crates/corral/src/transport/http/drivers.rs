// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Driver-server (Appium) lifecycle handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::error::LabError;
use crate::model::DeviceStatus;
use crate::state::App;
use crate::supervisor::default_capabilities;
use crate::transport::{ok, ok_with_message};

/// WebDriver endpoint URL for an allocated port.
fn wd_hub_url(app: &App, port: u16) -> String {
    let host = if app.config.host == "0.0.0.0" { "localhost" } else { app.config.host.as_str() };
    format!("http://{host}:{port}/wd/hub")
}

/// `POST /devices/{id}/appium/start` — start the driver server. The device
/// must already be held (reserved or in-use).
pub async fn driver_start(State(app): State<Arc<App>>, Path(id): Path<String>) -> Response {
    let device = match app.registry.get(&id).await {
        Ok(d) => d,
        Err(e) => return e.into_response(),
    };
    if !matches!(device.status, DeviceStatus::Reserved | DeviceStatus::InUse) {
        return LabError::invalid_state(format!(
            "device must be reserved before starting a driver (status: {})",
            device.status.as_str()
        ))
        .into_response();
    }

    match app.supervisor.start(&device).await {
        Ok(port) => ok(json!({
            "port": port,
            "url": wd_hub_url(&app, port),
            "capabilities": default_capabilities(&device),
        })),
        Err(e) => e.into_response(),
    }
}

/// `POST /devices/{id}/appium/stop` — stop the driver and release the
/// device (ends any active session, completes the reservation).
pub async fn driver_stop(State(app): State<Arc<App>>, Path(id): Path<String>) -> Response {
    let existed = app.supervisor.stop(&id).await;
    let _ = app.sessions.end_active_session_for_device(&id).await;
    match app.sessions.release(&id).await {
        Ok(device) => ok_with_message(
            device,
            if existed { "driver stopped and device released" } else { "device released" },
        ),
        Err(e) => e.into_response(),
    }
}

/// `GET /devices/{id}/appium/status` — status + port + URL.
pub async fn driver_status(State(app): State<Arc<App>>, Path(id): Path<String>) -> Response {
    if let Err(e) = app.registry.get(&id).await {
        return e.into_response();
    }
    match app.supervisor.server(&id).await {
        Some(server) => {
            let url = wd_hub_url(&app, server.port);
            ok(json!({ "running": true, "server": server, "url": url }))
        }
        None => ok(json!({ "running": false })),
    }
}

/// `GET /devices/{id}/appium/logs` — snapshot of the filtered log ring.
pub async fn driver_logs(State(app): State<Arc<App>>, Path(id): Path<String>) -> Response {
    match app.supervisor.logs(&id).await {
        Ok(entries) => ok(entries),
        Err(e) => e.into_response(),
    }
}

/// `DELETE /devices/{id}/appium/logs` — empty the ring.
pub async fn driver_clear_logs(State(app): State<Arc<App>>, Path(id): Path<String>) -> Response {
    match app.supervisor.clear_logs(&id).await {
        Ok(()) => ok_with_message(json!({}), "logs cleared"),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoStartRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    /// Minutes.
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub purpose: Option<String>,
}

/// `POST /devices/{id}/appium/auto-start` — reserve + start driver + open a
/// session in one call.
pub async fn driver_auto_start(
    State(app): State<Arc<App>>,
    Path(id): Path<String>,
    body: Option<Json<AutoStartRequest>>,
) -> Response {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let user_id = req.user_id.unwrap_or_else(|| "anonymous".to_owned());
    let purpose = req.purpose.unwrap_or_default();

    let reservation = match app.sessions.reserve(&id, &user_id, req.duration, &purpose).await {
        Ok(r) => r,
        Err(e) => return e.into_response(),
    };

    let device = match app.registry.get(&id).await {
        Ok(d) => d,
        Err(e) => return e.into_response(),
    };

    let port = match app.supervisor.start(&device).await {
        Ok(port) => port,
        Err(e) => {
            // Roll the hold back so the device returns to the pool.
            if let Err(release_err) = app.sessions.release(&id).await {
                warn!(device = %id, err = %release_err, "rollback release failed");
            }
            return e.into_response();
        }
    };

    let session = match app.sessions.attach_session(&id, &user_id).await {
        Ok(s) => s,
        Err(e) => {
            app.supervisor.stop(&id).await;
            if let Err(release_err) = app.sessions.release(&id).await {
                warn!(device = %id, err = %release_err, "rollback release failed");
            }
            return e.into_response();
        }
    };

    ok(json!({
        "reservation": reservation,
        "session": session,
        "port": port,
        "url": wd_hub_url(&app, port),
        "capabilities": default_capabilities(&device),
    }))
}

/// `GET /appium/servers` — every supervised driver server.
pub async fn driver_servers(State(app): State<Arc<App>>) -> Response {
    let servers = app.supervisor.servers().await;
    let enriched: Vec<serde_json::Value> = servers
        .into_iter()
        .map(|s| {
            let url = wd_hub_url(&app, s.port);
            json!({ "server": s, "url": url })
        })
        .collect();
    ok(enriched)
}
