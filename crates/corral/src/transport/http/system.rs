// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health, stats, and analytics handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::Response;
use serde_json::json;

use crate::model::{ReservationStatus, SessionStatus};
use crate::reservation::ReservationFilter;
use crate::state::App;
use crate::transport::ok;

/// `GET /system/health` — health snapshot.
pub async fn system_health(State(app): State<Arc<App>>) -> Response {
    ok(app.health_snapshot().await)
}

/// `GET /system/stats` — counts.
pub async fn system_stats(State(app): State<Arc<App>>) -> Response {
    let (total, online, in_use) = app.registry.counts().await;
    let sessions = app.sessions.sessions().await;
    let reservations = app.sessions.reservations().await;
    ok(json!({
        "devices": { "total": total, "online": online, "inUse": in_use },
        "sessions": {
            "total": sessions.len(),
            "active": sessions.iter().filter(|s| s.status == SessionStatus::Active).count(),
        },
        "reservations": {
            "total": reservations.len(),
            "active": reservations
                .iter()
                .filter(|r| r.status == ReservationStatus::Active)
                .count(),
        },
        "driverServers": app.supervisor.server_count().await,
        "mirrors": app.mirrors.active_count().await,
    }))
}

/// `GET /system/reservations` — reservations with optional filters
/// (`deviceId`, `userId`, `status`).
pub async fn system_reservations(
    State(app): State<Arc<App>>,
    Query(filter): Query<ReservationFilter>,
) -> Response {
    let reservations: Vec<_> = app
        .sessions
        .reservations()
        .await
        .into_iter()
        .filter(|r| filter.matches(r))
        .collect();
    ok(reservations)
}

/// `GET /analytics` — aggregate usage numbers.
pub async fn analytics(State(app): State<Arc<App>>) -> Response {
    let sessions = app.sessions.sessions().await;
    let reservations = app.sessions.reservations().await;
    ok(json!({
        "totalSessions": sessions.len(),
        "activeSessions": sessions.iter().filter(|s| s.status == SessionStatus::Active).count(),
        "totalReservations": reservations.len(),
        "meanSessionSecs": app.sessions.mean_session_secs().await,
    }))
}

/// `GET /analytics/devices` — per-device session totals.
pub async fn analytics_devices(State(app): State<Arc<App>>) -> Response {
    let counts = app.sessions.sessions_per_device().await;
    let mut rows = Vec::with_capacity(counts.len());
    for (device_id, sessions) in counts {
        let name = app.registry.get(&device_id).await.map(|d| d.name).unwrap_or_default();
        rows.push(json!({ "deviceId": device_id, "name": name, "sessions": sessions }));
    }
    ok(rows)
}

/// `GET /analytics/hourly` — sessions started per hour of day (UTC).
pub async fn analytics_hourly(State(app): State<Arc<App>>) -> Response {
    let buckets = app.sessions.sessions_per_hour().await;
    let rows: Vec<serde_json::Value> = buckets
        .iter()
        .enumerate()
        .map(|(hour, count)| json!({ "hour": hour, "sessions": count }))
        .collect();
    ok(rows)
}
