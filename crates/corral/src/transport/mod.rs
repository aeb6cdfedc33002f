// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP and WebSocket transports: router, uniform response envelope, and
//! handler implementations.

pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::LabError;
use crate::state::App;

/// Build the axum `Router` with all HTTP and WebSocket routes.
pub fn build_router(app: Arc<App>) -> Router {
    let cors = match app.config.frontend_url.as_deref() {
        Some(origin) => match origin.parse::<HeaderValue>() {
            Ok(value) => CorsLayer::new()
                .allow_origin(AllowOrigin::exact(value))
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
            Err(_) => CorsLayer::permissive(),
        },
        None => CorsLayer::permissive(),
    };

    Router::new()
        .route("/devices", get(http::list_devices))
        .route("/devices/refresh", post(http::refresh_devices))
        .route("/devices/{id}", get(http::get_device))
        .route("/devices/{id}/reserve", post(http::reserve_device))
        .route("/devices/{id}/release", post(http::release_device))
        .route("/devices/{id}/command", post(http::run_command))
        .route("/devices/{id}/tap", post(http::tap))
        .route("/devices/{id}/swipe", post(http::swipe))
        .route("/devices/{id}/drag", post(http::drag))
        .route("/devices/{id}/key", post(http::key))
        .route("/devices/{id}/text", post(http::text))
        .route("/devices/{id}/shell", post(http::shell))
        .route("/devices/{id}/install-app", post(http::install_app))
        .route("/devices/{id}/sessions", get(http::device_sessions))
        .route("/devices/{id}/reservations", get(http::device_reservations))
        .route("/sessions", get(http::list_sessions).post(http::create_session))
        .route("/sessions/{id}", get(http::get_session))
        .route("/sessions/{id}/end", post(http::end_session))
        .route("/sessions/user/{uid}", get(http::user_sessions))
        .route("/system/health", get(http::system_health))
        .route("/system/stats", get(http::system_stats))
        .route("/system/reservations", get(http::system_reservations))
        .route("/devices/{id}/appium/start", post(http::driver_start))
        .route("/devices/{id}/appium/stop", post(http::driver_stop))
        .route("/devices/{id}/appium/status", get(http::driver_status))
        .route(
            "/devices/{id}/appium/logs",
            get(http::driver_logs).delete(http::driver_clear_logs),
        )
        .route("/devices/{id}/appium/auto-start", post(http::driver_auto_start))
        .route("/appium/servers", get(http::driver_servers))
        .route("/analytics", get(http::analytics))
        .route("/analytics/devices", get(http::analytics_devices))
        .route("/analytics/hourly", get(http::analytics_hourly))
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app)
}

// -- Uniform response envelope ------------------------------------------------

#[derive(Debug, Serialize)]
struct Envelope<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// `200 {success: true, data}`
pub fn ok<T: Serialize>(data: T) -> Response {
    Json(Envelope { success: true, data: Some(data), message: None, error: None }).into_response()
}

/// `200 {success: true, data, message}`
pub fn ok_with_message<T: Serialize>(data: T, message: impl Into<String>) -> Response {
    Json(Envelope { success: true, data: Some(data), message: Some(message.into()), error: None })
        .into_response()
}

/// Failure envelope with an explicit status code and optional data payload.
pub fn fail_with<T: Serialize>(status: StatusCode, error: impl Into<String>, data: T) -> Response {
    (
        status,
        Json(Envelope { success: false, data: Some(data), message: None, error: Some(error.into()) }),
    )
        .into_response()
}

impl IntoResponse for LabError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (
            status,
            Json(Envelope::<()> {
                success: false,
                data: None,
                message: None,
                error: Some(self.message),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
