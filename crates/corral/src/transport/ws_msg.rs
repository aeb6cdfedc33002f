// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket message types for the realtime protocol.
//!
//! Internally-tagged JSON enums (`{"type": "reserve", ...}`); two top-level
//! enums cover the client-to-server and server-to-client directions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::HealthSnapshot;
use crate::mirror::ScreenFrame;
use crate::model::{CommandPayload, Device, LogEntry, Reservation, Session};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    Reserve {
        #[serde(rename = "deviceId")]
        device_id: String,
        #[serde(rename = "userId")]
        user_id: String,
        /// Minutes; defaults server-side.
        duration: Option<i64>,
        #[serde(default)]
        purpose: Option<String>,
    },
    Release {
        #[serde(rename = "deviceId")]
        device_id: String,
    },
    StartSession {
        #[serde(rename = "deviceId")]
        device_id: String,
        #[serde(rename = "userId")]
        user_id: String,
    },
    EndSession {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    Command {
        #[serde(rename = "deviceId")]
        device_id: String,
        payload: CommandPayload,
    },
    RefreshDevices {},
    StartMirror {
        #[serde(rename = "deviceId")]
        device_id: String,
        fps: Option<f64>,
    },
    StopMirror {
        #[serde(rename = "deviceId")]
        device_id: String,
    },
    Ping {},
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    DeviceUpdated {
        device: Box<Device>,
        timestamp: DateTime<Utc>,
    },
    DeviceList {
        devices: Vec<Device>,
        timestamp: DateTime<Utc>,
    },
    DeviceLog {
        entry: LogEntry,
        timestamp: DateTime<Utc>,
    },
    SystemHealth {
        health: HealthSnapshot,
        timestamp: DateTime<Utc>,
    },
    ScreenUpdate {
        frame: ScreenFrame,
        timestamp: DateTime<Utc>,
    },
    Reserved {
        reservation: Reservation,
        timestamp: DateTime<Utc>,
    },
    SessionStarted {
        session: Session,
        timestamp: DateTime<Utc>,
    },
    SessionEnded {
        session: Session,
        timestamp: DateTime<Utc>,
    },
    MirrorStarted {
        #[serde(rename = "deviceId")]
        device_id: String,
        fps: f64,
        timestamp: DateTime<Utc>,
    },
    MirrorStopped {
        #[serde(rename = "deviceId")]
        device_id: String,
        timestamp: DateTime<Utc>,
    },
    CommandResult {
        #[serde(rename = "commandId")]
        command_id: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },
    Error {
        error: String,
        #[serde(rename = "commandId", default, skip_serializing_if = "Option::is_none")]
        command_id: Option<String>,
        timestamp: DateTime<Utc>,
    },
    Pong {},
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { error: message.into(), command_id: None, timestamp: Utc::now() }
    }
}
