// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared application state passed to every handler via axum `State`.
//!
//! Construction order breaks the component cycle without globals: the event
//! bus first (the broadcast sink everything publishes into), then adapters,
//! supervisor, mirror pool, registry, and the session manager — each handed
//! only the pieces built before it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::adapter::Adapters;
use crate::config::Config;
use crate::error::{LabError, Result};
use crate::event::{EventBus, HealthSnapshot};
use crate::mirror::MirrorPool;
use crate::model::{Command, CommandPayload, CommandStatus, Device, Platform};
use crate::registry::DeviceRegistry;
use crate::reservation::SessionManager;
use crate::supervisor::DriverSupervisor;

pub struct App {
    pub config: Config,
    pub bus: EventBus,
    pub adapters: Adapters,
    pub supervisor: Arc<DriverSupervisor>,
    pub mirrors: Arc<MirrorPool>,
    pub registry: Arc<DeviceRegistry>,
    pub sessions: Arc<SessionManager>,
    pub shutdown: CancellationToken,
    pub started_at: Instant,
}

impl App {
    pub fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        Self::with_adapters(config, Adapters::new())
    }

    /// Build the full component graph over the given adapters (tests inject
    /// mock backends here).
    pub fn with_adapters(config: Config, adapters: Adapters) -> anyhow::Result<Arc<Self>> {
        let bus = EventBus::new();
        let supervisor = Arc::new(
            DriverSupervisor::new(config.base_port, config.port_range, bus.clone())?
                .with_binary(&config.driver_binary),
        );
        let mirrors = Arc::new(MirrorPool::new(adapters.clone()));
        let registry = Arc::new(DeviceRegistry::new(
            adapters.clone(),
            bus.clone(),
            Arc::clone(&supervisor),
            Arc::clone(&mirrors),
        ));
        let sessions = Arc::new(SessionManager::new(Arc::clone(&registry)));

        Ok(Arc::new(Self {
            config,
            bus,
            adapters,
            supervisor,
            mirrors,
            registry,
            sessions,
            shutdown: CancellationToken::new(),
            started_at: Instant::now(),
        }))
    }

    pub async fn health_snapshot(&self) -> HealthSnapshot {
        let (total, online, in_use) = self.registry.counts().await;
        HealthSnapshot {
            uptime_secs: self.started_at.elapsed().as_secs(),
            devices_total: total,
            devices_online: online,
            devices_in_use: in_use,
            active_sessions: self.sessions.active_session_count().await,
            active_reservations: self.sessions.active_reservation_count().await,
            driver_servers: self.supervisor.server_count().await,
            subscribers: self.bus.subscriber_count(),
        }
    }

    /// Dispatch a control command to the platform adapter.
    ///
    /// Returns the completed command record; adapter failures are captured
    /// into it rather than propagated, so callers always get the record.
    /// Unknown devices still error (there is nothing to record against).
    pub async fn execute_command(
        &self,
        device_id: &str,
        payload: CommandPayload,
    ) -> Result<Command> {
        let device = self.registry.get(device_id).await?;
        payload.validate().map_err(LabError::validation)?;

        let mut command = Command::new(device_id, payload);
        command.status = CommandStatus::Executing;

        // Unsupported (kind, platform) pairs fail without touching the adapter.
        if let Err(e) = check_support(&device, &command.payload) {
            command.status = CommandStatus::Failed;
            command.error = Some(e.message.clone());
            return Ok(command);
        }

        match self.invoke(&device, &command.payload).await {
            Ok(result) => {
                command.status = CommandStatus::Completed;
                command.result = result;
            }
            Err(e) => {
                debug!(device = %device_id, kind = command.payload.kind(), err = %e, "command failed");
                command.status = CommandStatus::Failed;
                command.error = Some(e.to_string());
            }
        }
        Ok(command)
    }

    async fn invoke(&self, device: &Device, payload: &CommandPayload) -> Result<Option<String>> {
        let adapter = self.adapters.for_platform(device.platform);
        let serial = device.serial.as_str();
        match payload {
            CommandPayload::Tap { x, y } => {
                adapter.tap(serial, *x, *y).await?;
                Ok(None)
            }
            CommandPayload::Swipe { x1, y1, x2, y2, duration_ms } => {
                let duration = Duration::from_millis(duration_ms.unwrap_or(500));
                adapter.swipe(serial, *x1, *y1, *x2, *y2, duration).await?;
                Ok(None)
            }
            CommandPayload::Drag { x1, y1, x2, y2, duration_ms } => {
                let duration = Duration::from_millis(duration_ms.unwrap_or(500));
                adapter.drag(serial, *x1, *y1, *x2, *y2, duration).await?;
                Ok(None)
            }
            CommandPayload::Key { keycode } => {
                adapter.key_event(serial, *keycode).await?;
                Ok(None)
            }
            CommandPayload::Text { text } => {
                adapter.input_text(serial, text).await?;
                Ok(None)
            }
            CommandPayload::Install { path } => {
                adapter.install(serial, std::path::Path::new(path)).await?;
                Ok(None)
            }
            CommandPayload::Uninstall { bundle_id } => {
                adapter.uninstall(serial, bundle_id).await?;
                Ok(None)
            }
            CommandPayload::Shell { command } => {
                let output = adapter.shell(serial, command).await?;
                Ok(Some(output))
            }
        }
    }
}

/// Reject (kind, platform) pairs the platform cannot serve before any
/// adapter invocation happens.
fn check_support(device: &Device, payload: &CommandPayload) -> Result<()> {
    if matches!(payload, CommandPayload::Shell { .. }) && device.platform == Platform::Ios {
        return Err(LabError::unsupported(format!(
            "shell commands are not supported for iOS device {}",
            device.serial
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
