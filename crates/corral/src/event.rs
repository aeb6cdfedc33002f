// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hub event types and the broadcast bus.
//!
//! The bus is the "broadcast sink" seam between the registry, session
//! manager, and supervisor on one side and the realtime subscribers on the
//! other. Components hold a cheap clone of the bus and publish after their
//! mutation is visible; the WebSocket layer subscribes per connection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::{Device, LogEntry};

/// Events fanned out to every realtime subscriber.
///
/// Every variant carries a wall-clock timestamp. Per-subscriber traffic
/// (screen frames, command replies) does not go through this bus; see the
/// transport layer's direct channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum LabEvent {
    /// A single device record changed (status, battery, name, reservation).
    DeviceUpdated { device: Box<Device>, timestamp: DateTime<Utc> },
    /// Full device list, emitted at the end of every discovery cycle.
    DeviceList { devices: Vec<Device>, timestamp: DateTime<Utc> },
    /// A device (or the synthetic `"system"` source) produced a log line.
    DeviceLog { entry: LogEntry, timestamp: DateTime<Utc> },
    /// Periodic health snapshot.
    SystemHealth { health: HealthSnapshot, timestamp: DateTime<Utc> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub uptime_secs: u64,
    pub devices_total: usize,
    pub devices_online: usize,
    pub devices_in_use: usize,
    pub active_sessions: usize,
    pub active_reservations: usize,
    pub driver_servers: usize,
    pub subscribers: usize,
}

/// Fan-out bus for [`LabEvent`]s.
///
/// Thin wrapper over a tokio broadcast channel; send errors (no subscribers)
/// are ignored by design of the channel, not silently swallowed errors.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LabEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LabEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn device_updated(&self, device: Device) {
        let _ = self
            .tx
            .send(LabEvent::DeviceUpdated { device: Box::new(device), timestamp: Utc::now() });
    }

    pub fn device_list(&self, devices: Vec<Device>) {
        let _ = self.tx.send(LabEvent::DeviceList { devices, timestamp: Utc::now() });
    }

    pub fn device_log(&self, entry: LogEntry) {
        let _ = self.tx.send(LabEvent::DeviceLog { entry, timestamp: Utc::now() });
    }

    pub fn system_health(&self, health: HealthSnapshot) {
        let _ = self.tx.send(LabEvent::SystemHealth { health, timestamp: Utc::now() });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
