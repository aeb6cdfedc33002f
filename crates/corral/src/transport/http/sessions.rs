// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session CRUD handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::state::App;
use crate::transport::ok;

/// `GET /sessions` — all sessions.
pub async fn list_sessions(State(app): State<Arc<App>>) -> Response {
    ok(app.sessions.sessions().await)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub device_id: String,
    pub user_id: String,
}

/// `POST /sessions` — open a session on a reserved device.
pub async fn create_session(
    State(app): State<Arc<App>>,
    Json(req): Json<CreateSessionRequest>,
) -> Response {
    match app.sessions.create_session(&req.device_id, &req.user_id).await {
        Ok(session) => ok(session),
        Err(e) => e.into_response(),
    }
}

/// `GET /sessions/{id}` — one session.
pub async fn get_session(State(app): State<Arc<App>>, Path(id): Path<String>) -> Response {
    match app.sessions.session(&id).await {
        Ok(session) => ok(session),
        Err(e) => e.into_response(),
    }
}

/// `POST /sessions/{id}/end` — end a session.
pub async fn end_session(State(app): State<Arc<App>>, Path(id): Path<String>) -> Response {
    match app.sessions.end_session(&id).await {
        Ok(session) => ok(session),
        Err(e) => e.into_response(),
    }
}

/// `GET /sessions/user/{uid}` — sessions for a user.
pub async fn user_sessions(State(app): State<Arc<App>>, Path(uid): Path<String>) -> Response {
    ok(app.sessions.sessions_for_user(&uid).await)
}
