// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Core data model: devices, reservations, sessions, commands, log entries.
//!
//! Device records are owned by the registry; reservation and session records
//! by the session manager. Cross-component references are by id only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// -- Device -------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Android => "android",
            Self::Ios => "ios",
        }
    }
}

/// Physical handset vs simulator. Only meaningful for iOS; Android emulators
/// are still reported as `Physical` by the debug bridge surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Physical,
    Simulator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceStatus {
    Online,
    Offline,
    Unauthorized,
    Reserved,
    InUse,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Unauthorized => "unauthorized",
            Self::Reserved => "reserved",
            Self::InUse => "in-use",
        }
    }

    /// Whether `self → next` is a legal status transition.
    ///
    /// The registry is the sole authority for status mutation; any edge not
    /// listed here is rejected with `InvalidState`.
    pub fn can_transition(self, next: DeviceStatus) -> bool {
        use DeviceStatus::*;
        match (self, next) {
            // Disappearance from discovery is legal from any state.
            (_, Offline) => true,
            (Offline, Online) => true,
            (Unauthorized, Online) => true,
            (Online, Reserved) => true,
            (Reserved, InUse) => true,
            (InUse, Reserved) => true,
            (InUse, Online) => true,
            (Reserved, Online) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Hardware capability flags reported during enrichment.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub touchscreen: bool,
    pub camera: bool,
    pub wifi: bool,
    pub bluetooth: bool,
    pub gps: bool,
    pub nfc: bool,
    pub fingerprint: bool,
    pub accelerometer: bool,
    pub gyroscope: bool,
}

/// The canonical in-memory device record.
///
/// Created on first observation, never destroyed; offline devices remain
/// visible until process exit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    /// Vendor identifier: debug-bridge serial for Android, UDID for iOS.
    pub serial: String,
    pub platform: Platform,
    pub device_type: DeviceKind,
    pub name: String,
    pub model: String,
    pub manufacturer: String,
    pub os_version: String,
    /// Android API level; zero when unknown or not applicable.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub api_level: u32,
    pub resolution: Resolution,
    pub orientation: Orientation,
    pub capabilities: Capabilities,
    #[serde(default)]
    pub properties: HashMap<String, String>,
    pub status: DeviceStatus,
    /// Battery level 0-100.
    pub battery: u8,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reserved_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved_at: Option<DateTime<Utc>>,
    pub connected_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

impl Device {
    /// Invariant check: `reserved_by` is non-empty iff status is held.
    pub fn reservation_consistent(&self) -> bool {
        let held = matches!(self.status, DeviceStatus::Reserved | DeviceStatus::InUse);
        held == !self.reserved_by.is_empty()
    }
}

// -- Reservation & Session ----------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Active,
    Completed,
    Cancelled,
}

/// A time-bounded exclusive hold on a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: String,
    pub device_id: String,
    pub user_id: String,
    pub start_time: DateTime<Utc>,
    /// Deadline. Enforcement is the reaper's job; the record is authoritative.
    pub end_time: DateTime<Utc>,
    pub status: ReservationStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub purpose: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Failed,
}

/// A period of active device use, nested within (or independent of) a
/// reservation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub device_id: String,
    pub user_id: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub status: SessionStatus,
}

// -- Command ------------------------------------------------------------------

/// Typed payload per command kind, wire shape `{"type": ..., "payload": ...}`.
/// Unknown variants are rejected at the request boundary, never at the
/// adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum CommandPayload {
    Tap { x: f64, y: f64 },
    Swipe { x1: f64, y1: f64, x2: f64, y2: f64, duration_ms: Option<u64> },
    Drag { x1: f64, y1: f64, x2: f64, y2: f64, duration_ms: Option<u64> },
    Key { keycode: u32 },
    Text { text: String },
    Install { path: String },
    Uninstall { bundle_id: String },
    Shell { command: String },
}

impl CommandPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Tap { .. } => "tap",
            Self::Swipe { .. } => "swipe",
            Self::Drag { .. } => "drag",
            Self::Key { .. } => "key",
            Self::Text { .. } => "text",
            Self::Install { .. } => "install",
            Self::Uninstall { .. } => "uninstall",
            Self::Shell { .. } => "shell",
        }
    }

    /// Per-variant payload validation, applied at the request boundary.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Tap { x, y } => {
                if *x < 0.0 || *y < 0.0 {
                    return Err("tap coordinates must be non-negative".to_owned());
                }
            }
            Self::Swipe { x1, y1, x2, y2, .. } | Self::Drag { x1, y1, x2, y2, .. } => {
                if [*x1, *y1, *x2, *y2].iter().any(|v| *v < 0.0) {
                    return Err("swipe coordinates must be non-negative".to_owned());
                }
            }
            Self::Text { text } => {
                if text.is_empty() {
                    return Err("text must not be empty".to_owned());
                }
            }
            Self::Install { path } => {
                if path.is_empty() {
                    return Err("install path must not be empty".to_owned());
                }
            }
            Self::Uninstall { bundle_id } => {
                if bundle_id.is_empty() {
                    return Err("bundle id must not be empty".to_owned());
                }
            }
            Self::Shell { command } => {
                if command.trim().is_empty() {
                    return Err("shell command must not be empty".to_owned());
                }
            }
            Self::Key { .. } => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Pending,
    Executing,
    Completed,
    Failed,
}

/// Transient record for one control request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub id: String,
    pub device_id: String,
    pub payload: CommandPayload,
    pub timestamp: DateTime<Utc>,
    pub status: CommandStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Command {
    pub fn new(device_id: impl Into<String>, payload: CommandPayload) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            device_id: device_id.into(),
            payload,
            timestamp: Utc::now(),
            status: CommandStatus::Pending,
            result: None,
            error: None,
        }
    }
}

// -- Log entries --------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Verbose,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

/// Source id used for log events that are not tied to a real device
/// (driver-server lifecycle notices).
pub const SYSTEM_SOURCE: &str = "system";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: String,
    /// Device id, or [`SYSTEM_SOURCE`].
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tag: String,
    pub message: String,
}

impl LogEntry {
    pub fn new(
        device_id: impl Into<String>,
        level: LogLevel,
        tag: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            device_id: device_id.into(),
            timestamp: Utc::now(),
            level,
            tag: tag.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[path = "model_tests.rs"]
pub(crate) mod tests;
