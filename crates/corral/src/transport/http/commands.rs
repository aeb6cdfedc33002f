// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-command handlers: the generic `{type, payload}` endpoint, the
//! typed shortcuts, and app-install upload staging.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::warn;

use crate::adapter::tool;
use crate::error::LabError;
use crate::model::{Command, CommandPayload, CommandStatus};
use crate::state::App;
use crate::transport::{fail_with, ok};

/// Render a completed command record into the uniform envelope. A failed
/// command is a request failure, with the record still attached.
fn command_response(command: Command) -> Response {
    if command.status == CommandStatus::Completed {
        ok(command)
    } else {
        let error = command.error.clone().unwrap_or_else(|| "command failed".to_owned());
        fail_with(StatusCode::BAD_REQUEST, error, command)
    }
}

async fn dispatch(app: &App, device_id: &str, payload: CommandPayload) -> Response {
    match app.execute_command(device_id, payload).await {
        Ok(command) => command_response(command),
        Err(e) => e.into_response(),
    }
}

/// `POST /devices/{id}/command` — generic command, tagged payload.
pub async fn run_command(
    State(app): State<Arc<App>>,
    Path(id): Path<String>,
    Json(payload): Json<CommandPayload>,
) -> Response {
    dispatch(&app, &id, payload).await
}

#[derive(Debug, Deserialize)]
pub struct TapRequest {
    pub x: f64,
    pub y: f64,
}

/// `POST /devices/{id}/tap`
pub async fn tap(
    State(app): State<Arc<App>>,
    Path(id): Path<String>,
    Json(req): Json<TapRequest>,
) -> Response {
    dispatch(&app, &id, CommandPayload::Tap { x: req.x, y: req.y }).await
}

#[derive(Debug, Deserialize)]
pub struct SwipeRequest {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

/// `POST /devices/{id}/swipe`
pub async fn swipe(
    State(app): State<Arc<App>>,
    Path(id): Path<String>,
    Json(req): Json<SwipeRequest>,
) -> Response {
    let payload = CommandPayload::Swipe {
        x1: req.x1,
        y1: req.y1,
        x2: req.x2,
        y2: req.y2,
        duration_ms: req.duration_ms,
    };
    dispatch(&app, &id, payload).await
}

/// `POST /devices/{id}/drag`
pub async fn drag(
    State(app): State<Arc<App>>,
    Path(id): Path<String>,
    Json(req): Json<SwipeRequest>,
) -> Response {
    let payload = CommandPayload::Drag {
        x1: req.x1,
        y1: req.y1,
        x2: req.x2,
        y2: req.y2,
        duration_ms: req.duration_ms,
    };
    dispatch(&app, &id, payload).await
}

#[derive(Debug, Deserialize)]
pub struct KeyRequest {
    pub keycode: u32,
}

/// `POST /devices/{id}/key`
pub async fn key(
    State(app): State<Arc<App>>,
    Path(id): Path<String>,
    Json(req): Json<KeyRequest>,
) -> Response {
    dispatch(&app, &id, CommandPayload::Key { keycode: req.keycode }).await
}

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub text: String,
}

/// `POST /devices/{id}/text`
pub async fn text(
    State(app): State<Arc<App>>,
    Path(id): Path<String>,
    Json(req): Json<TextRequest>,
) -> Response {
    dispatch(&app, &id, CommandPayload::Text { text: req.text }).await
}

#[derive(Debug, Deserialize)]
pub struct ShellRequest {
    pub command: String,
}

/// `POST /devices/{id}/shell`
pub async fn shell(
    State(app): State<Arc<App>>,
    Path(id): Path<String>,
    Json(req): Json<ShellRequest>,
) -> Response {
    dispatch(&app, &id, CommandPayload::Shell { command: req.command }).await
}

/// `POST /devices/{id}/install-app` — multipart upload (`app` field), staged
/// under the upload dir, then installed through the adapter.
pub async fn install_app(
    State(app): State<Arc<App>>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Response {
    let staged = match stage_upload(&app, &mut multipart).await {
        Ok(Some(path)) => path,
        Ok(None) => {
            return LabError::validation("multipart field 'app' is required").into_response()
        }
        Err(e) => return e.into_response(),
    };

    let payload =
        CommandPayload::Install { path: staged.to_string_lossy().into_owned() };
    let response = dispatch(&app, &id, payload).await;

    let removed = if staged.is_dir() {
        tokio::fs::remove_dir_all(&staged).await
    } else {
        tokio::fs::remove_file(&staged).await
    };
    if let Err(e) = removed {
        warn!(path = %staged.display(), err = %e, "failed to remove staged artifact");
    }
    response
}

/// Write the uploaded artifact to the staging dir. Zip archives containing
/// an `.app` bundle are expanded; the adapter receives a ready path.
async fn stage_upload(
    app: &App,
    multipart: &mut Multipart,
) -> crate::error::Result<Option<PathBuf>> {
    let dir = app.config.upload_dir();
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| LabError::internal(format!("upload dir: {e}")))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| LabError::validation(format!("invalid multipart body: {e}")))?
    {
        if field.name() != Some("app") {
            continue;
        }
        let original = field.file_name().unwrap_or("app.bin").to_owned();
        let staged = dir.join(format!("{}-{original}", uuid::Uuid::new_v4()));
        let data = field
            .bytes()
            .await
            .map_err(|e| LabError::validation(format!("upload read failed: {e}")))?;
        if data.is_empty() {
            return Err(LabError::validation("uploaded artifact is empty"));
        }
        tokio::fs::write(&staged, &data)
            .await
            .map_err(|e| LabError::internal(format!("staging write failed: {e}")))?;

        if original.ends_with(".zip") {
            return Ok(Some(unpack_app_bundle(&dir, &staged).await?));
        }
        return Ok(Some(staged));
    }
    Ok(None)
}

/// Expand a zipped `.app` bundle next to the archive and return the bundle
/// path.
async fn unpack_app_bundle(dir: &std::path::Path, archive: &std::path::Path) -> crate::error::Result<PathBuf> {
    let target = dir.join(format!("unpacked-{}", uuid::Uuid::new_v4()));
    let target_str = target.to_string_lossy().into_owned();
    let archive_str = archive.to_string_lossy().into_owned();

    let out = tool::run("unzip", &["-o", &archive_str, "-d", &target_str]).await?;
    tool::expect_success("unzip", out)?;

    let mut entries = tokio::fs::read_dir(&target)
        .await
        .map_err(|e| LabError::internal(format!("read unpack dir: {e}")))?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.path().extension().is_some_and(|ext| ext == "app") {
            return Ok(entry.path());
        }
    }
    Err(LabError::validation("archive does not contain an .app bundle"))
}
